//! Desktop input automation.
//!
//! [`InputProvider`] is the seam the action executor drives; [`EnigoInput`]
//! is the default implementation using the enigo crate.

use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};

use crate::error::InputProviderError;

pub trait InputProvider: Send {
    /// Move the pointer to absolute screen coordinates.
    fn move_cursor_to(&mut self, x: i32, y: i32) -> Result<(), InputProviderError>;
    fn press_primary(&mut self) -> Result<(), InputProviderError>;
    fn release_primary(&mut self) -> Result<(), InputProviderError>;
}

/// Synthetic mouse input through enigo. A connection is opened per call, so
/// the provider itself holds no platform handles and can move between threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnigoInput;

impl EnigoInput {
    pub fn new() -> Self {
        Self
    }

    fn with_enigo(
        action: &'static str,
        f: impl FnOnce(&mut Enigo) -> enigo::InputResult<()>,
    ) -> Result<(), InputProviderError> {
        let mut enigo = Enigo::new(&Settings::default()).map_err(|e| InputProviderError {
            action,
            reason: e.to_string(),
        })?;
        f(&mut enigo).map_err(|e| InputProviderError {
            action,
            reason: e.to_string(),
        })
    }
}

impl InputProvider for EnigoInput {
    fn move_cursor_to(&mut self, x: i32, y: i32) -> Result<(), InputProviderError> {
        Self::with_enigo("move", |enigo| enigo.move_mouse(x, y, Coordinate::Abs))
    }

    fn press_primary(&mut self) -> Result<(), InputProviderError> {
        Self::with_enigo("press", |enigo| enigo.button(Button::Left, Direction::Press))
    }

    fn release_primary(&mut self) -> Result<(), InputProviderError> {
        Self::with_enigo("release", |enigo| enigo.button(Button::Left, Direction::Release))
    }
}

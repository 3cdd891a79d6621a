//! Action execution.
//!
//! Turns a task's declarative [`ActionSpec`] list into input side effects,
//! anchored on the match location inside the captured window.

use std::thread;
use std::time::Duration;

use super::input::InputProvider;
use crate::error::InputProviderError;
use crate::events::Diagnostics;
use crate::task::ActionSpec;
use crate::vision::{MatchResult, Rect};

/// Pushes the pointer from the template's top-left corner into its interior.
pub const ANCHOR_OFFSET: i32 = 10;

/// Time between press and release of a click.
pub const CLICK_HOLD: Duration = Duration::from_millis(50);

pub struct ActionExecutor {
    input: Box<dyn InputProvider>,
    diag: Diagnostics,
    click_hold: Duration,
}

impl ActionExecutor {
    pub fn new(input: Box<dyn InputProvider>, diag: Diagnostics) -> Self {
        Self {
            input,
            diag,
            click_hold: CLICK_HOLD,
        }
    }

    pub fn with_click_hold(mut self, hold: Duration) -> Self {
        self.click_hold = hold;
        self
    }

    /// Run `actions` in order. Stops at the first input failure; nothing is retried.
    pub fn execute(
        &mut self,
        rect: Rect,
        actions: &[ActionSpec],
        result: &MatchResult,
    ) -> Result<(), InputProviderError> {
        for action in actions {
            self.perform(rect, action, result)?;
        }
        Ok(())
    }

    fn perform(
        &mut self,
        rect: Rect,
        action: &ActionSpec,
        result: &MatchResult,
    ) -> Result<(), InputProviderError> {
        match action {
            ActionSpec::Move { offset_x, offset_y } => {
                let (x, y) = target_point(rect, result, *offset_x, *offset_y);
                log::debug!("Move to ({x}, {y})");
                self.input.move_cursor_to(x, y)
            }
            ActionSpec::Click => {
                log::debug!("Click at {}", chrono::Local::now().format("%H:%M:%S%.3f"));
                self.input.press_primary()?;
                thread::sleep(self.click_hold);
                self.input.release_primary()
            }
            ActionSpec::Delay { ms } => {
                thread::sleep(Duration::from_millis((*ms).max(0) as u64));
                Ok(())
            }
            ActionSpec::Unknown { type_name } => {
                self.diag.warn(format!("Unsupported action type: {type_name}"));
                Ok(())
            }
        }
    }
}

/// Absolute screen point for a move action.
pub fn target_point(rect: Rect, result: &MatchResult, offset_x: i32, offset_y: i32) -> (i32, i32) {
    let (mx, my) = result.location;
    (
        rect.left + mx as i32 + ANCHOR_OFFSET + offset_x,
        rect.top + my as i32 + ANCHOR_OFFSET + offset_y,
    )
}

//! In-memory collaborators for loop and controller tests.

use image::{DynamicImage, GrayImage, Luma, RgbaImage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::automation::Scorer;
use super::controller::Platform;
use super::input::InputProvider;
use crate::cancel::CancelToken;
use crate::error::{CaptureError, InputProviderError, InvalidTemplate, TemplateLoadError};
use crate::task::{ActionSpec, FocusPolicy, IconGroup, RunConfig, Task};
use crate::vision::capture::CaptureBackend;
use crate::vision::template_cache::TemplateSource;
use crate::vision::{Frame, MatchResult, Rect, Template, WindowHandle};

pub const WINDOW: Rect = Rect {
    left: 100,
    top: 200,
    right: 740,
    bottom: 680,
};

/// Capture backend with a scripted direct-surface path.
#[derive(Clone, Default)]
pub struct MockBackend {
    pub direct_fails: bool,
    /// Block each direct capture this long, honouring interrupts.
    pub block_for: Option<Duration>,
    /// Frame pixels per window unit; 0 means 1.
    pub pixel_scale: u32,
    pub unfocused: Arc<AtomicBool>,
    pub captures: Arc<AtomicUsize>,
    /// When each successful capture happened.
    pub stamps: Arc<Mutex<Vec<Instant>>>,
}

impl MockBackend {
    fn frame(&self, rect: Rect) -> RgbaImage {
        let scale = self.pixel_scale.max(1);
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.stamps.lock().unwrap().push(Instant::now());
        RgbaImage::new(rect.width() * scale, rect.height() * scale)
    }

    pub fn stamps(&self) -> Vec<Instant> {
        self.stamps.lock().unwrap().clone()
    }
}

impl CaptureBackend for MockBackend {
    fn window_rect(&self, _handle: WindowHandle) -> Result<Rect, CaptureError> {
        Ok(WINDOW)
    }

    fn capture_surface(&self, _handle: WindowHandle, cancel: &CancelToken) -> Result<RgbaImage, CaptureError> {
        if let Some(block) = self.block_for {
            if cancel.wait_interrupt(block) {
                return Err(CaptureError::Interrupted);
            }
        }
        if self.direct_fails {
            return Err(CaptureError::Backend("surface unavailable".into()));
        }
        Ok(self.frame(WINDOW))
    }

    fn capture_composited(&self, _handle: WindowHandle, _cancel: &CancelToken) -> Result<RgbaImage, CaptureError> {
        Ok(self.frame(WINDOW))
    }

    fn capture_desktop_region(&self, rect: Rect, _cancel: &CancelToken) -> Result<RgbaImage, CaptureError> {
        Ok(self.frame(rect))
    }

    fn is_foreground(&self, _handle: WindowHandle) -> Result<bool, CaptureError> {
        Ok(!self.unfocused.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Move(i32, i32),
    Press,
    Release,
}

#[derive(Clone, Default)]
pub struct RecordingInput {
    pub log: Arc<Mutex<Vec<Input>>>,
}

impl RecordingInput {
    pub fn inputs(&self) -> Vec<Input> {
        self.log.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> usize {
        self.inputs().iter().filter(|i| **i == Input::Press).count()
    }
}

impl InputProvider for RecordingInput {
    fn move_cursor_to(&mut self, x: i32, y: i32) -> Result<(), InputProviderError> {
        self.log.lock().unwrap().push(Input::Move(x, y));
        Ok(())
    }

    fn press_primary(&mut self) -> Result<(), InputProviderError> {
        self.log.lock().unwrap().push(Input::Press);
        Ok(())
    }

    fn release_primary(&mut self) -> Result<(), InputProviderError> {
        self.log.lock().unwrap().push(Input::Release);
        Ok(())
    }
}

/// Scores by template file name; records every comparison.
#[derive(Clone, Default)]
pub struct ScriptedScorer {
    pub scores: Arc<Mutex<HashMap<String, (f32, (u32, u32))>>>,
    pub compared: Arc<Mutex<Vec<String>>>,
}

impl ScriptedScorer {
    pub fn with(self, icon: &str, confidence: f32, location: (u32, u32)) -> Self {
        self.scores
            .lock()
            .unwrap()
            .insert(icon.to_string(), (confidence, location));
        self
    }

    pub fn compared(&self) -> Vec<String> {
        self.compared.lock().unwrap().clone()
    }
}

impl Scorer for ScriptedScorer {
    fn score(&mut self, frame: &Frame, template: &Template) -> Result<MatchResult, InvalidTemplate> {
        if frame.run_id() != template.run_id() {
            return Err(InvalidTemplate::ForeignRun(template.path().to_path_buf()));
        }
        let name = template
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.compared.lock().unwrap().push(name.clone());
        let (confidence, location) = self
            .scores
            .lock()
            .unwrap()
            .get(&name)
            .copied()
            .unwrap_or((0.0, (0, 0)));
        Ok(MatchResult {
            confidence,
            location,
            template: template.path().to_path_buf(),
        })
    }
}

/// Serves a small gray square for every path except `missing`.
#[derive(Clone, Default)]
pub struct MemorySource {
    pub missing: Vec<String>,
    pub loads: Arc<AtomicUsize>,
}

impl TemplateSource for MemorySource {
    fn load(&self, path: &Path) -> Result<DynamicImage, TemplateLoadError> {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        if name.is_some_and(|n| self.missing.contains(&n)) {
            return Err(TemplateLoadError {
                path: path.to_path_buf(),
                reason: "file not found".into(),
            });
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([90]))))
    }
}

/// Wires the mocks above into a controller.
#[derive(Clone, Default)]
pub struct TestPlatform {
    pub backend: MockBackend,
    pub input: RecordingInput,
    pub scorer: ScriptedScorer,
    pub source: MemorySource,
}

impl Platform for TestPlatform {
    fn capture_backend(&self) -> Box<dyn CaptureBackend> {
        Box::new(self.backend.clone())
    }

    fn input_provider(&self) -> Box<dyn InputProvider> {
        Box::new(self.input.clone())
    }

    fn template_source(&self) -> Box<dyn TemplateSource> {
        Box::new(self.source.clone())
    }

    fn scorer(&self) -> Box<dyn Scorer> {
        Box::new(self.scorer.clone())
    }

    fn click_hold(&self) -> Duration {
        Duration::ZERO
    }
}

pub fn task(groups: &[&[&str]], target_index: i64, actions: Vec<ActionSpec>) -> Task {
    Task {
        icon_groups: groups.iter().map(|g| IconGroup::new(g.iter().copied())).collect(),
        target_index,
        actions,
        delay: Duration::ZERO,
    }
}

pub fn run_config(tasks: Vec<Task>) -> RunConfig {
    RunConfig {
        process_name: "game".into(),
        match_threshold: 0.8,
        resource_dir: "icons".into(),
        poll_interval: Duration::from_millis(100),
        no_match_delay: Duration::ZERO,
        monitor_interval: None,
        on_focus_loss: FocusPolicy::Pause,
        tasks,
    }
}

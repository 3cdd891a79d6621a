//! Per-run store of decoded icon templates.
//!
//! Lives on the worker thread only, so no locking. Entries are keyed by the
//! lowercased path and dropped in one go by [`TemplateCache::clear`] when the
//! run tears down.

use image::DynamicImage;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::Template;
use crate::error::TemplateLoadError;

/// Where template pixels come from.
pub trait TemplateSource: Send {
    fn load(&self, path: &Path) -> Result<DynamicImage, TemplateLoadError>;
}

/// Reads and decodes icon files from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskSource;

impl TemplateSource for DiskSource {
    fn load(&self, path: &Path) -> Result<DynamicImage, TemplateLoadError> {
        if !path.is_file() {
            return Err(TemplateLoadError {
                path: path.to_path_buf(),
                reason: "file not found".into(),
            });
        }
        image::open(path).map_err(|e| TemplateLoadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

pub struct TemplateCache {
    run_id: Uuid,
    source: Box<dyn TemplateSource>,
    entries: HashMap<String, Arc<Template>>,
}

impl TemplateCache {
    pub fn new(run_id: Uuid) -> Self {
        Self::with_source(run_id, Box::new(DiskSource))
    }

    pub fn with_source(run_id: Uuid, source: Box<dyn TemplateSource>) -> Self {
        Self {
            run_id,
            source,
            entries: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Decoded template for `path`, loading it on first use.
    pub fn resolve(&mut self, path: &Path) -> Result<Arc<Template>, TemplateLoadError> {
        let key = path.to_string_lossy().to_lowercase();
        if let Some(template) = self.entries.get(&key) {
            return Ok(Arc::clone(template));
        }

        let image = self.source.load(path)?;
        let template = Arc::new(Template::new(path, &image, self.run_id));
        log::debug!(
            "Loaded template {} ({}x{})",
            path.display(),
            template.luma().width(),
            template.luma().height()
        );
        self.entries.insert(key, Arc::clone(&template));
        Ok(template)
    }

    /// Release every cached template.
    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        log::debug!("Released {count} cached templates");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

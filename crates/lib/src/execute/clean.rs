//! Removal of everything a build would produce.

use std::path::Path;

use tracing::{debug, info};

use super::{EventSender, JobEvent, emit};
use crate::builder::OutFileCollector;
use crate::diag::ErrorItem;
use crate::engine::Engine;

/// Deletes the output files of every default product.
///
/// Deletion is best effort: missing files and permission problems are
/// logged and skipped.
pub struct CleanJob {
  files: Vec<String>,
  errors: Vec<ErrorItem>,
  events: Option<EventSender>,
}

impl CleanJob {
  /// Collect the outputs of `targets`; empty selects the default products.
  pub fn new(engine: &mut Engine, targets: &[String]) -> Self {
    let mut collector = OutFileCollector::default();
    let errors = if engine.visit(&mut collector, targets) {
      Vec::new()
    } else {
      engine.errors()
    };
    Self {
      files: collector.files,
      errors,
      events: None,
    }
  }

  pub fn with_events(mut self, events: EventSender) -> Self {
    self.events = Some(events);
    self
  }

  /// Output files in visit order.
  pub fn files(&self) -> &[String] {
    &self.files
  }

  pub fn errors(&self) -> &[ErrorItem] {
    &self.errors
  }

  /// Delete the files; returns how many were removed.
  pub fn run(&self) -> usize {
    emit(
      self.events.as_ref(),
      JobEvent::TaskStarted {
        description: "clean".to_string(),
        total: self.files.len(),
      },
    );
    let mut removed = 0;
    for (i, file) in self.files.iter().enumerate() {
      match std::fs::remove_file(Path::new(file)) {
        Ok(()) => removed += 1,
        Err(e) => debug!(file = %file, error = %e, "not removed"),
      }
      emit(self.events.as_ref(), JobEvent::TaskProgress(i + 1));
    }
    info!(removed, total = self.files.len(), "clean finished");
    emit(
      self.events.as_ref(),
      JobEvent::TaskFinished {
        success: self.errors.is_empty(),
      },
    );
    removed
  }
}

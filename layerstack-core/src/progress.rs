//! Progress reporting. Advisory only; observers cannot influence a run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Layers,
    Metadata,
}

pub trait ProgressObserver {
    fn on_progress(&mut self, stage: ProgressStage, percent: f64);
}

impl<F: FnMut(ProgressStage, f64)> ProgressObserver for F {
    fn on_progress(&mut self, stage: ProgressStage, percent: f64) {
        self(stage, percent)
    }
}

/// `(index + 1) / total * 100`
pub fn percent_done(index: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (index + 1) as f64 / total as f64 * 100.0
}

/// Observer for callers that do not track progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _stage: ProgressStage, _percent: f64) {}
}

pub(crate) fn report(observer: &mut dyn ProgressObserver, stage: ProgressStage, index: usize, total: usize) {
    observer.on_progress(stage, percent_done(index, total));
}

//! Stage progress reporting for pipeline runs.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::gate::StageId;

/// What happened to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Started,
    Completed,
    Skipped,
    Failed,
}

/// Progress information for one stage event.
#[derive(Debug, Clone)]
pub struct StageInfo {
    pub stage: StageId,
    pub event: StageEvent,
    /// Time since the run started.
    pub elapsed: Duration,
    /// Time spent in this stage, for completed and failed stages.
    pub stage_elapsed: Option<Duration>,
}

/// Observer of pipeline stages.
pub trait StageCallback: Send + Sync {
    fn on_stage(&self, info: &StageInfo);

    /// Called when the run starts.
    fn on_start(&self) {}

    /// Called when every stage has finished.
    fn on_complete(&self, _elapsed: Duration) {}

    /// Called when the run stops with an error.
    fn on_error(&self, _stage: StageId, _error: &str) {}
}

/// Reports stages through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LoggingCallback;

impl StageCallback for LoggingCallback {
    fn on_stage(&self, info: &StageInfo) {
        match info.event {
            StageEvent::Started => tracing::info!(stage = %info.stage, "Stage started"),
            StageEvent::Completed => tracing::info!(
                stage = %info.stage,
                "Stage completed in {:.2}s",
                info.stage_elapsed.unwrap_or_default().as_secs_f64()
            ),
            StageEvent::Skipped => {
                tracing::info!(stage = %info.stage, "Stage output exists, skipping")
            }
            StageEvent::Failed => tracing::warn!(stage = %info.stage, "Stage failed"),
        }
    }

    fn on_start(&self) {
        tracing::info!("Registration pipeline started");
    }

    fn on_complete(&self, elapsed: Duration) {
        tracing::info!("Registration pipeline finished in {:.2}s", elapsed.as_secs_f64());
    }

    fn on_error(&self, stage: StageId, error: &str) {
        tracing::error!(%stage, "Registration pipeline failed: {}", error);
    }
}

/// Records every stage event.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<StageInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<StageInfo> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stages that saw `event`, in order.
    pub fn stages_with(&self, event: StageEvent) -> Vec<StageId> {
        self.history()
            .into_iter()
            .filter(|info| info.event == event)
            .map(|info| info.stage)
            .collect()
    }

    pub fn clear(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl StageCallback for HistoryCallback {
    fn on_stage(&self, info: &StageInfo) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(info.clone());
    }
}

/// Fans stage events out to registered callbacks.
#[derive(Clone, Default)]
pub struct StageTracker {
    callbacks: Vec<Arc<dyn StageCallback>>,
    start_time: Option<Instant>,
    stage_start: Option<Instant>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Arc<dyn StageCallback>) {
        self.callbacks.push(callback);
    }

    fn elapsed(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    fn emit(&self, stage: StageId, event: StageEvent, stage_elapsed: Option<Duration>) {
        let info = StageInfo {
            stage,
            event,
            elapsed: self.elapsed(),
            stage_elapsed,
        };
        for callback in &self.callbacks {
            callback.on_stage(&info);
        }
    }

    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
        for callback in &self.callbacks {
            callback.on_start();
        }
    }

    pub fn stage_started(&mut self, stage: StageId) {
        self.stage_start = Some(Instant::now());
        self.emit(stage, StageEvent::Started, None);
    }

    pub fn stage_completed(&mut self, stage: StageId) {
        let took = self.stage_start.take().map(|t| t.elapsed());
        self.emit(stage, StageEvent::Completed, took);
    }

    pub fn stage_skipped(&self, stage: StageId) {
        self.emit(stage, StageEvent::Skipped, None);
    }

    pub fn stage_failed(&mut self, stage: StageId, error: &str) {
        let took = self.stage_start.take().map(|t| t.elapsed());
        self.emit(stage, StageEvent::Failed, took);
        for callback in &self.callbacks {
            callback.on_error(stage, error);
        }
    }

    pub fn complete(&self) {
        let elapsed = self.elapsed();
        for callback in &self.callbacks {
            callback.on_complete(elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_callback() {
        let history = Arc::new(HistoryCallback::new());
        let mut tracker = StageTracker::new();
        tracker.add_callback(history.clone());
        tracker.add_callback(Arc::new(LoggingCallback));

        tracker.start();
        tracker.stage_skipped(StageId::Affine);
        tracker.stage_started(StageId::Freeform);
        tracker.stage_completed(StageId::Freeform);
        tracker.complete();

        let events = history.history();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event, StageEvent::Skipped);
        assert!(events[2].stage_elapsed.is_some());
        assert_eq!(history.stages_with(StageEvent::Completed), vec![StageId::Freeform]);
    }

    #[test]
    fn test_failed_stage_is_reported() {
        let history = Arc::new(HistoryCallback::new());
        let mut tracker = StageTracker::new();
        tracker.add_callback(history.clone());
        tracker.start();
        tracker.stage_started(StageId::Segmentation);
        tracker.stage_failed(StageId::Segmentation, "engine exited with code 1");
        assert_eq!(history.stages_with(StageEvent::Failed), vec![StageId::Segmentation]);

        history.clear();
        assert!(history.history().is_empty());
    }
}

//! Overall-progress mapping and reporting.
//!
//! Each pipeline stage owns a fixed window of the 0-100 scale; a
//! stage's internal completion fraction is remapped into its window
//! before being persisted. Persisted progress never decreases while a
//! scan is live. The tracker takes `&self` so the active-scan progress
//! forwarder task can share it with the orchestrator.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{ScanUpdate, Store};
use crate::error::PipelineError;

/// Contiguous slice of the overall 0-100 progress range owned by one
/// stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub lo: i32,
    pub hi: i32,
}

impl Window {
    /// Remap a stage-internal percentage (0-100) into this window:
    /// `lo + floor(internal/100 * (hi - lo))`.
    pub fn map(&self, internal: u8) -> i32 {
        let internal = internal.min(100) as i64;
        self.lo + (internal * (self.hi - self.lo) as i64 / 100) as i32
    }
}

pub struct ProgressTracker {
    store: Arc<dyn Store>,
    scan_id: Uuid,
    last: AtomicI32,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn Store>, scan_id: Uuid) -> Self {
        Self {
            store,
            scan_id,
            last: AtomicI32::new(0),
        }
    }

    /// Last value handed to the store (after monotonic clamping).
    pub fn current(&self) -> i32 {
        self.last.load(Ordering::SeqCst)
    }

    /// Persist an overall progress value, clamped monotone.
    pub async fn report(&self, overall: i32) -> Result<(), PipelineError> {
        let overall = overall.clamp(0, 100);
        let previous = self.last.fetch_max(overall, Ordering::SeqCst);
        if overall <= previous {
            return Ok(());
        }
        self.store
            .update_scan(self.scan_id, ScanUpdate::progress(overall))
            .await
            .map_err(|e| PipelineError::Unexpected(anyhow::anyhow!(e)))
    }

    /// Remap a stage-internal percentage into `window` and persist it.
    pub async fn report_stage(&self, window: Window, internal: u8) -> Result<(), PipelineError> {
        self.report(window.map(internal)).await
    }

    /// Smoothly advance to `target` with `steps` evenly time-spaced
    /// writes over `duration`, checking the cancellation token before
    /// each write. Used when a stage is skipped so the bar still
    /// traverses its window instead of jumping.
    pub async fn animate_to(
        &self,
        target: i32,
        duration: Duration,
        steps: u32,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let steps = steps.max(1);
        let start = self.current();
        let pause = duration / steps;

        for step in 1..=steps {
            if token.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let value = start + (target - start) * step as i32 / steps as i32;
            self.report(value).await?;
            if step < steps {
                tokio::time::sleep(pause).await;
            }
        }
        Ok(())
    }
}

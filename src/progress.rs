//! Progress reporting and cooperative cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::BBox;

/// Cancellation flag shared between a blame run and its caller.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Create a signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// Progress callback, receives a fraction in `0.0..=1.0`.
pub type ProgressFn = Box<dyn FnMut(f64) + Send>;

/// Bounding box callback, fires once as soon as the current geometry is known.
pub type BboxFn = Box<dyn FnMut(BBox) + Send>;

/// Optional hooks for one blame run.
#[derive(Default)]
pub struct BlameOptions {
    /// Cancellation signal, checked at every progress checkpoint.
    pub signal: Option<AbortSignal>,
    /// Progress callback.
    pub on_progress: Option<ProgressFn>,
    /// Early bounding box callback.
    pub on_bbox: Option<BboxFn>,
}

impl BlameOptions {
    /// Options without any hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a cancellation signal.
    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Attach a bounding box callback.
    pub fn with_bbox(mut self, f: impl FnMut(BBox) + Send + 'static) -> Self {
        self.on_bbox = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for BlameOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlameOptions")
            .field("signal", &self.signal)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_bbox", &self.on_bbox.is_some())
            .finish()
    }
}

/// Returned from a checkpoint once the signal has fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

/// Drives the callbacks of one run.
///
/// Every report is a checkpoint: the signal is checked first, and once it
/// has fired no callback is invoked again.
pub struct Progress {
    options: BlameOptions,
    /// Sub-range `[start, end)` the current phase reports into.
    range: (f64, f64),
    last: f64,
}

impl Progress {
    /// Start reporting with the given hooks.
    pub fn new(options: BlameOptions) -> Self {
        Self { options, range: (0.0, 1.0), last: 0.0 }
    }

    /// Restrict subsequent reports to `start..end` of the overall progress.
    pub fn phase(&mut self, start: f64, end: f64) {
        self.range = (start, end);
    }

    /// Fail if the signal has fired.
    pub fn checkpoint(&self) -> Result<(), Aborted> {
        match &self.options.signal {
            Some(signal) if signal.is_aborted() => Err(Aborted),
            _ => Ok(()),
        }
    }

    /// Report `fraction` of the current phase. Overall progress never goes back.
    pub fn report(&mut self, fraction: f64) -> Result<(), Aborted> {
        self.checkpoint()?;
        let (start, end) = self.range;
        let overall = (start + (end - start) * fraction.clamp(0.0, 1.0)).max(self.last);
        self.last = overall;
        if let Some(on_progress) = self.options.on_progress.as_mut() {
            on_progress(overall);
        }
        Ok(())
    }

    /// Publish the bounding box of the current geometry.
    pub fn bbox(&mut self, bbox: BBox) -> Result<(), Aborted> {
        self.checkpoint()?;
        if let Some(on_bbox) = self.options.on_bbox.as_mut() {
            on_bbox(bbox);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_report_maps_into_phase() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut progress = Progress::new(BlameOptions::new().with_progress(move |p| sink.lock().push(p)));

        progress.phase(0.5, 1.0);
        progress.report(0.5).unwrap();
        progress.report(0.0).unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0], 0.75);
        // never goes back
        assert_eq!(seen[1], 0.75);
    }

    #[test]
    fn test_aborted_checkpoint_skips_callbacks() {
        let calls = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&calls);
        let signal = AbortSignal::new();
        let mut progress = Progress::new(
            BlameOptions::new()
                .with_signal(signal.clone())
                .with_progress(move |_| *sink.lock() += 1),
        );

        progress.report(0.1).unwrap();
        signal.abort();
        assert_eq!(progress.report(0.2), Err(Aborted));
        assert_eq!(*calls.lock(), 1);
    }
}

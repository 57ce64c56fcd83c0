//! Cooperative cancellation and progress reporting for long runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared flag checked by workers before each source. Cloning shares the
/// flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sources completed so far out of the run's total.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl Progress {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Completed fraction in `[0, 1]`; 1.0 for an empty run.
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 1.0,
            total => self.completed() as f64 / total as f64,
        }
    }

    pub(crate) fn start(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    pub(crate) fn advance(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handles a caller keeps to observe or stop a run from another thread.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub cancel: CancellationToken,
    pub progress: Arc<Progress>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_progress_fraction() {
        let progress = Progress::default();
        assert_eq!(progress.fraction(), 1.0);
        progress.start(4);
        progress.advance();
        assert_eq!(progress.completed(), 1);
        assert_eq!(progress.fraction(), 0.25);
        progress.start(2);
        assert_eq!(progress.completed(), 0);
    }
}

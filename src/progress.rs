//! Cancellation and progress reporting for long-running entry points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Shared flag a caller flips to abort a parse or a range sweep. Clones share
/// the same flag, so one can be handed to a worker thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
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

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub step: usize,
    /// Known for range sweeps, unknown while parsing.
    pub total: Option<usize>,
}

pub(crate) struct Monitor<'a> {
    cancel: &'a CancelToken,
    on_progress: &'a mut dyn FnMut(Progress),
    step: usize,
    total: Option<usize>,
}

impl<'a> Monitor<'a> {
    pub(crate) fn new(
        cancel: &'a CancelToken,
        on_progress: &'a mut dyn FnMut(Progress),
        total: Option<usize>,
    ) -> Self {
        Self {
            cancel,
            on_progress,
            step: 0,
            total,
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::OperationCancelled)
        } else {
            Ok(())
        }
    }

    /// Cancellation check followed by one progress report.
    pub(crate) fn step(&mut self) -> Result<()> {
        self.check()?;
        self.step += 1;
        (self.on_progress)(Progress {
            step: self.step,
            total: self.total,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_reports_and_cancels() {
        let cancel = CancelToken::new();
        let mut seen = Vec::new();
        let mut record = |p: Progress| seen.push(p.step);
        let mut monitor = Monitor::new(&cancel, &mut record, Some(3));
        monitor.step().unwrap();
        monitor.step().unwrap();
        cancel.clone().cancel();
        assert!(monitor.step().unwrap_err().is_cancelled());
        drop(monitor);
        assert_eq!(seen, vec![1, 2]);
    }
}

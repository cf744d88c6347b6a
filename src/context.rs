//! Cooperative cancellation: the only permitted cross-thread interaction
//! is a caller flipping a flag from another thread; the session polls it
//! once per command and at the top of each `foreach` iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that a caller can flip from another thread to request
    /// cancellation.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            cancelled: self.cancelled.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Returns `Err(Error::Cancelled)` if cancellation was requested; call
    /// this before issuing each channel command.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The caller-held half of a [`Context`]'s cancellation flag.
#[derive(Debug, Clone)]
pub struct Canceller {
    cancelled: Arc<AtomicBool>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_from_handle_is_observed() {
        let ctx = Context::new();
        let canceller = ctx.canceller();
        assert!(ctx.check().is_ok());
        canceller.cancel();
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }
}

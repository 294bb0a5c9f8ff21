// SPDX-License-Identifier: CEPL-1.0
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable shutdown token. The window host raises it, the frame loop
/// checks it once per iteration.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            tracing::info!("shutdown requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        assert!(!ShutdownSignal::new().is_requested());
    }

    #[test]
    fn clones_observe_request() {
        let host = ShutdownSignal::new();
        let looper = host.clone();
        host.request();
        assert!(looper.is_requested());
        // idempotent
        host.request();
        assert!(looper.is_requested());
    }
}

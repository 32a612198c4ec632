// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Cooperative cancellation of busy-poll loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Something a poll loop can ask whether it should give up.
///
/// Checked once per poll iteration, so implementations must be cheap.
pub trait Cancel {
    fn is_cancelled(&self) -> bool;
}

impl Cancel for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// A non-zero value requests cancellation (used for flags living in shared
/// memory, which are 32-bit words).
impl Cancel for AtomicU32 {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Acquire) != 0
    }
}

impl<T: Cancel + ?Sized> Cancel for &T {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

impl<T: Cancel + ?Sized> Cancel for Arc<T> {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_flag_cancels_when_non_zero() {
        let flag = AtomicU32::new(0);
        let shared = Arc::new(flag);
        assert!(!shared.is_cancelled());
        shared.store(1, Ordering::Release);
        assert!(shared.is_cancelled());
    }
}

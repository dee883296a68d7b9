use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation flag shared between workers.
///
/// Workers check it at their yield points (typically between two progress
/// increments) and wind down without finishing the remaining work. A
/// cancelled worker should end its task explicitly, usually with
/// [`Tracker::abandon`](crate::Tracker::abandon), so no handle is left
/// dangling.
///
/// Clones observe the same flag. Cancellation is one-way; there is no
/// reset.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

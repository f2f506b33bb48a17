use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared advisory connectivity flag.
///
/// The embedding host flips this from its reachability monitor; the sync
/// engine consults it to decide whether a remote refresh is worth
/// attempting. Advisory only: a request made while "online" can still fail
/// with `ApiError::NoConnection`.
#[derive(Debug, Clone)]
pub struct Connectivity {
    online: Arc<AtomicBool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }
}

impl Default for Connectivity {
    /// Assume online until the host says otherwise.
    fn default() -> Self {
        Self::new(true)
    }
}

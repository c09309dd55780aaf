use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use vcuda_core::Registry;

/// Per-client session state on the server side.
/// Owns the session's registry; holding the guard serialises routine handling.
pub struct Session {
    pub session_id: u32,
    pub peer: String,
    registry: Mutex<Registry>,
    requests: AtomicU64,
}

impl Session {
    pub fn new(session_id: u32, peer: String) -> Self {
        Self {
            session_id,
            peer,
            registry: Mutex::new(Registry::new()),
            requests: AtomicU64::new(0),
        }
    }

    /// Lock the session registry. Blocks while another request of this
    /// session is being handled.
    pub fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock()
    }

    /// Count a request, returning the new total.
    pub fn record_request(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

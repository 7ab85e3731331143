use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// In-process single-flight registry for sync runs.
///
/// A user whose sync is still in flight cannot start a second one; the
/// permit releases its slot on drop, so an aborted run never leaves the
/// user stuck.
#[derive(Clone, Default)]
pub struct SyncGuard {
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the sync slot for a user. Returns `None` if a run is already
    /// in flight for that user.
    pub fn try_acquire(&self, user_id: i64) -> Option<SyncPermit> {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if set.insert(user_id) {
            Some(SyncPermit {
                user_id,
                in_flight: Arc::clone(&self.in_flight),
            })
        } else {
            None
        }
    }

    pub fn is_running(&self, user_id: i64) -> bool {
        let set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        set.contains(&user_id)
    }
}

pub struct SyncPermit {
    user_id: i64,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected_while_in_flight() {
        let guard = SyncGuard::new();
        let permit = guard.try_acquire(7);
        assert!(permit.is_some());
        assert!(guard.try_acquire(7).is_none());
        assert!(guard.is_running(7));

        // Other users are unaffected
        assert!(guard.try_acquire(8).is_some());
    }

    #[test]
    fn test_slot_released_on_drop() {
        let guard = SyncGuard::new();
        let permit = guard.try_acquire(7);
        drop(permit);
        assert!(!guard.is_running(7));
        assert!(guard.try_acquire(7).is_some());
    }
}

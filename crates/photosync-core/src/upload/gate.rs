use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-flight flag for upload cycles.
///
/// Clones share the flag. Whoever holds the [`UploadPermit`] is the only
/// cycle allowed to claim records; dropping it reopens the gate.
#[derive(Debug, Clone, Default)]
pub struct UploadGate {
    running: Arc<AtomicBool>,
}

impl UploadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate, or `None` if another cycle holds it.
    pub fn try_acquire(&self) -> Option<UploadPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| UploadPermit {
                running: Arc::clone(&self.running),
            })
    }
}

/// Held for the duration of one upload cycle.
#[derive(Debug)]
pub struct UploadPermit {
    running: Arc<AtomicBool>,
}

impl Drop for UploadPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_permit_at_a_time() {
        let gate = UploadGate::new();
        let permit = gate.try_acquire().unwrap();
        assert!(gate.try_acquire().is_none());
        assert!(gate.clone().try_acquire().is_none());

        drop(permit);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn concurrent_acquires_yield_one_winner() {
        let gate = UploadGate::new();
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    gate.try_acquire()
                })
            })
            .collect();
        let permits: Vec<_> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(permits.len(), 1);
    }
}

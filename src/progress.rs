use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// A single f32 value written by one owner and polled by any number of readers.
///
/// Readers see the last written value; there is no queue of updates.
/// Cloning yields another handle onto the same cell.
#[derive(Debug, Clone)]
pub struct ProgressSignal {
    bits: Arc<AtomicU32>,
}

impl ProgressSignal {
    pub fn new(initial: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(initial.to_bits())),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

impl Default for ProgressSignal {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cooperative cancellation flag, checked by `meta_learn` between meta-batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the next run proceeds
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

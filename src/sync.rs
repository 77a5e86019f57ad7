#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering, fence};
#[cfg(not(feature = "loom"))]
pub use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering, fence};

#[cfg(feature = "loom")]
pub use loom::sync::Arc;
#[cfg(not(feature = "loom"))]
pub use std::sync::Arc;

#[cfg(feature = "loom")]
pub use loom::hint::spin_loop;
#[cfg(not(feature = "loom"))]
pub use std::hint::spin_loop;

#[cfg(not(feature = "loom"))]
pub use antidote::Mutex;

#[cfg(feature = "loom")]
#[derive(Debug, Default)]
pub struct Mutex<T>(loom::sync::Mutex<T>);

#[cfg(feature = "loom")]
impl<T> Mutex<T> {
    pub fn new(t: T) -> Self {
        Self(loom::sync::Mutex::new(t))
    }

    pub fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
        self.0.lock().unwrap()
    }

    pub fn try_lock(&self) -> Result<loom::sync::MutexGuard<'_, T>, ()> {
        self.0.try_lock().map_err(|_| ())
    }
}

/// Light barrier issued by a reader between publishing a hazard and
/// re-reading its source.
///
/// 读者在发布危险指针与重新读取源之间使用的轻量屏障。
#[inline(always)]
pub(crate) fn light_barrier() {
    fence(Ordering::SeqCst);
}

/// Heavy barrier issued by the reclaimer before it snapshots the hazards.
///
/// 回收者在快照所有危险指针之前使用的重量屏障。
#[inline]
pub(crate) fn heavy_barrier() {
    fence(Ordering::SeqCst);
}

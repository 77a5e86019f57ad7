use crate::garbage::RetireList;
use crate::local::LocalCaches;
use crate::sync::{Arc, AtomicBool, AtomicPtr, AtomicUsize, Mutex, Ordering, light_barrier};
use std::ptr;
use std::vec::Vec;

/// Default retired-object count at which a reclamation scan starts automatically.
/// 自动开始回收扫描的默认已退休对象数量。
pub(crate) const AUTO_RECLAIM_THRESHOLD: usize = 1000;

/// A scan only starts once the retired count is also this many times the slot count.
/// 只有当已退休数量同时达到槽位数量的此倍数时才会开始扫描。
pub(crate) const DEFAULT_SCAN_MULTIPLIER: usize = 2;

/// Default size of a thread's private retire batch before it is handed to the domain.
/// 线程私有退休批次交给域之前的默认大小。
pub(crate) const DEFAULT_RETIRE_BATCH_SIZE: usize = 20;

/// Default number of free hazard slots each thread keeps cached.
/// 每个线程默认缓存的空闲危险槽数量。
pub(crate) const DEFAULT_SLOT_CACHE_CAPACITY: usize = 10;

/// Default interval (in automatic scans) between full cleanups of all thread batches.
/// 两次完整清理所有线程批次之间的默认间隔（以自动扫描次数计）。
pub(crate) const DEFAULT_CLEANUP_INTERVAL: usize = 16;

/// One hazard-pointer cell.
///
/// `hazard` holds the address its owner is currently reading, or null.
/// `active` tells whether a holder (or a thread cache) owns the slot.
/// Cache-aligned to prevent false sharing between readers.
///
/// 一个危险指针槽。
/// `hazard` 保存其拥有者当前正在读取的地址，或为空。
/// `active` 表示是否有持有者（或线程缓存）拥有此槽。
/// 缓存对齐以防止读者之间的伪共享。
#[derive(Debug)]
#[repr(align(64))]
pub(crate) struct HazardSlot {
    hazard: AtomicPtr<()>,
    active: AtomicBool,
}

impl HazardSlot {
    /// A fresh slot, already owned by whoever created it.
    pub(crate) fn new_active() -> Self {
        Self {
            hazard: AtomicPtr::new(ptr::null_mut()),
            active: AtomicBool::new(true),
        }
    }

    #[inline]
    pub(crate) fn set(&self, ptr: *mut ()) {
        self.hazard.store(ptr, Ordering::Release);
    }

    #[inline]
    pub(crate) fn get(&self) -> *mut () {
        self.hazard.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn clear(&self) {
        self.hazard.store(ptr::null_mut(), Ordering::Release);
    }

    /// Claim an inactive slot found in the registry.
    /// 认领注册表中一个不活跃的槽。
    #[inline]
    pub(crate) fn try_acquire(&self) -> bool {
        !self.active.load(Ordering::Acquire)
            && self
                .active
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
    }

    #[inline]
    pub(crate) fn release(&self) {
        self.clear();
        self.active.store(false, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Publish `unmark(*ptr)` and check that `src` still holds `*ptr`.
    ///
    /// On failure the slot is cleared, `*ptr` receives the value `src` holds now,
    /// and `false` is returned so the caller can retry with it.
    ///
    /// 发布 `unmark(*ptr)` 并检查 `src` 是否仍然持有 `*ptr`。
    /// 失败时清空此槽，`*ptr` 被更新为 `src` 的当前值，并返回 `false` 以便调用者重试。
    #[inline]
    pub(crate) fn try_protect<T, F>(&self, ptr: &mut *mut T, src: &AtomicPtr<T>, unmark: F) -> bool
    where
        F: Fn(*mut T) -> *mut T,
    {
        self.set(unmark(*ptr).cast());
        light_barrier();
        let current = src.load(Ordering::Acquire);
        if current != *ptr {
            *ptr = current;
            self.clear();
            return false;
        }
        true
    }

    /// Load `src` and publish it, retrying until the publication is validated.
    /// Returns the raw (possibly marked) value read from `src`.
    ///
    /// 读取 `src` 并发布，直到发布被验证为止。
    /// 返回从 `src` 读取的原始值（可能带有标记）。
    #[inline]
    pub(crate) fn protect<T, F>(&self, src: &AtomicPtr<T>, unmark: F) -> *mut T
    where
        F: Fn(*mut T) -> *mut T,
    {
        let mut ptr = src.load(Ordering::Relaxed);
        while !self.try_protect(&mut ptr, src, &unmark) {}
        ptr
    }
}

/// Tunables fixed when the domain is built.
/// 构建域时确定的可调参数。
#[derive(Debug, Clone, Copy)]
pub(crate) struct DomainConfig {
    pub(crate) auto_reclaim_threshold: Option<usize>,
    pub(crate) scan_multiplier: usize,
    pub(crate) retire_batch_size: usize,
    pub(crate) slot_cache_capacity: usize,
    pub(crate) cleanup_interval: usize,
}

/// Shared state of a reclamation domain.
///
/// Contains the registry of every hazard slot ever handed out, the domain-wide
/// retire list, and the per-thread slot caches and retire batches.
///
/// 回收域的共享状态。
/// 包含所有已分配危险槽的注册表、域级退休列表，以及每线程的槽缓存和退休批次。
pub(crate) struct DomainState {
    /// Every slot of this domain. Slots are never removed, only deactivated.
    /// 此域的所有槽。槽从不被移除，只会被停用。
    pub(crate) slots: Mutex<Vec<Arc<HazardSlot>>>,
    pub(crate) slot_count: AtomicUsize,
    pub(crate) garbage: RetireList,
    pub(crate) locals: LocalCaches,
    pub(crate) config: DomainConfig,
    /// Number of automatic scans performed so far.
    /// 迄今为止执行的自动扫描次数。
    pub(crate) scan_counter: AtomicUsize,
    /// Held for the whole of a reclamation pass: passes never overlap.
    ///
    /// A node freed by one pass releases its link to a successor, and that
    /// successor is then judged against the hazard snapshot of the same pass.
    /// An older snapshot taken by a concurrent pass would miss a reader that
    /// stepped onto the successor in between.
    ///
    /// 在整个回收过程中持有：回收过程从不重叠。
    pub(crate) reclaim_lock: Mutex<()>,
}

impl DomainState {
    pub(crate) fn new(config: DomainConfig) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            slot_count: AtomicUsize::new(0),
            garbage: RetireList::new(),
            locals: LocalCaches::new(config.slot_cache_capacity),
            config,
            scan_counter: AtomicUsize::new(0),
            reclaim_lock: Mutex::new(()),
        }
    }
}

impl Drop for DomainState {
    /// No handle to the domain is left, so no hazard can be published any more:
    /// everything still retired is reclaimed here.
    ///
    /// 已没有任何域句柄，因此不会再发布危险指针：这里回收所有仍处于退休状态的对象。
    fn drop(&mut self) {
        let mut pending = self.locals.drain_all_mut();
        pending.append(&mut self.garbage.take_all());

        while !pending.is_empty() {
            let mut requeue = Vec::new();
            for retired in pending.drain(..) {
                unsafe { retired.reclaim(&mut requeue) };
            }
            pending = requeue;
        }
    }
}

use crate::garbage::{ReclaimFn, Retired, reclaim_unprotected};
use crate::state::{
    AUTO_RECLAIM_THRESHOLD, DEFAULT_CLEANUP_INTERVAL, DEFAULT_RETIRE_BATCH_SIZE,
    DEFAULT_SCAN_MULTIPLIER, DEFAULT_SLOT_CACHE_CAPACITY, DomainConfig, DomainState, HazardSlot,
};
use crate::sync::{Arc, Ordering, heavy_barrier};
use std::collections::HashSet;
use std::fmt;
use std::vec::Vec;

/// Builder for configuring a `Domain`.
///
/// - `auto_reclaim_threshold`: retired count that starts an automatic scan
/// - `scan_multiplier`: the count must also reach this multiple of the slot count
/// - `retire_batch_size`: size of each thread's private retire batch
/// - `slot_cache_capacity`: free slots each thread keeps for itself
/// - `cleanup_interval`: automatic scans between full cleanups
///
/// # Example
/// ```
/// use hazard_set::Domain;
///
/// let domain = Domain::builder()
///     .auto_reclaim_threshold(128)
///     .retire_batch_size(8)
///     .build();
/// ```
///
/// 用于配置 `Domain` 的构建器。
pub struct DomainBuilder {
    config: DomainConfig,
}

impl DomainBuilder {
    /// Create a new builder with default settings.
    /// 创建一个带有默认设置的新构建器。
    #[inline]
    pub fn new() -> Self {
        Self {
            config: DomainConfig {
                auto_reclaim_threshold: Some(AUTO_RECLAIM_THRESHOLD),
                scan_multiplier: DEFAULT_SCAN_MULTIPLIER,
                retire_batch_size: DEFAULT_RETIRE_BATCH_SIZE,
                slot_cache_capacity: DEFAULT_SLOT_CACHE_CAPACITY,
                cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            },
        }
    }

    /// Set the automatic reclamation threshold.
    ///
    /// Once this many objects were handed to the domain, and the count is also at
    /// least `scan_multiplier` times the number of slots, the retiring thread scans.
    /// Pass `None` to disable automatic reclamation.
    ///
    /// Default: `Some(1000)`
    ///
    /// 设置自动回收阈值。
    /// 当交给域的对象达到此数量，且同时至少为槽数量的 `scan_multiplier` 倍时，
    /// 执行退休的线程会进行扫描。传递 `None` 可禁用自动回收。
    #[inline]
    pub fn auto_reclaim_threshold(mut self, threshold: impl Into<Option<usize>>) -> Self {
        self.config.auto_reclaim_threshold = threshold.into();
        self
    }

    /// Default: `2`
    #[inline]
    pub fn scan_multiplier(mut self, multiplier: usize) -> Self {
        self.config.scan_multiplier = multiplier;
        self
    }

    /// Set how many retired objects a thread collects before handing them to the domain.
    /// `0` or `1` hands every object over immediately.
    ///
    /// Default: `20`
    ///
    /// 设置线程在交给域之前收集的已退休对象数量。`0` 或 `1` 表示立即交出。
    #[inline]
    pub fn retire_batch_size(mut self, size: usize) -> Self {
        self.config.retire_batch_size = size;
        self
    }

    /// Set how many free hazard slots each thread keeps cached. `0` disables the cache.
    ///
    /// Default: `10`
    ///
    /// 设置每个线程缓存的空闲危险槽数量。`0` 表示禁用缓存。
    #[inline]
    pub fn slot_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.slot_cache_capacity = capacity;
        self
    }

    /// Set the cleanup interval.
    ///
    /// Every N automatic scans, the batches of all threads (exited ones included)
    /// are collected into the domain first. Set to `0` to disable.
    ///
    /// Default: `16`
    ///
    /// 设置清理间隔。
    /// 每 N 次自动扫描，先将所有线程（包括已退出线程）的批次收集到域中。设置为 `0` 可禁用。
    #[inline]
    pub fn cleanup_interval(mut self, interval: usize) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    /// Build the `Domain` with the configured settings.
    /// 使用配置的设置构建 `Domain`。
    #[inline]
    pub fn build(self) -> Domain {
        Domain {
            shared: Arc::new(DomainState::new(self.config)),
        }
    }
}

impl Default for DomainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A hazard-pointer reclamation domain.
///
/// The domain owns:
/// - The registry of hazard slots, scanned on every reclamation pass.
/// - The retire list of objects waiting for reclamation.
/// - The per-thread slot caches and retire batches.
///
/// `Domain` is a cheap `Clone` handle and can be shared across threads.
/// When the last handle is dropped every object still retired is reclaimed.
///
/// **Typical Usage**:
/// ```
/// use hazard_set::{Domain, HazardPointer};
/// use std::sync::atomic::{AtomicPtr, Ordering};
///
/// let domain = Domain::new();
/// let shared = AtomicPtr::new(Box::into_raw(Box::new(42u32)));
///
/// let mut hp = HazardPointer::new(&domain);
/// let value = unsafe { hp.protect(&shared) }.copied();
/// assert_eq!(value, Some(42));
/// hp.reset();
///
/// let old = shared.swap(std::ptr::null_mut(), Ordering::AcqRel);
/// unsafe { domain.retire(old) };
/// domain.cleanup();
/// assert_eq!(domain.pending_count(), 0);
/// ```
///
/// 危险指针回收域。
/// 域拥有：
/// - 危险槽注册表，每次回收都会扫描它。
/// - 等待回收的对象的退休列表。
/// - 每线程的槽缓存和退休批次。
/// `Domain` 是一个廉价的 `Clone` 句柄，可以在线程间共享。
/// 最后一个句柄被 drop 时，所有仍处于退休状态的对象都会被回收。
#[derive(Clone)]
pub struct Domain {
    shared: Arc<DomainState>,
}

impl Domain {
    /// Create a new domain with default settings.
    /// 创建一个带有默认设置的新域。
    #[inline]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring a domain.
    /// 创建一个用于配置域的构建器。
    #[inline]
    pub fn builder() -> DomainBuilder {
        DomainBuilder::new()
    }

    /// Handle to the process-wide default domain, created on first use.
    /// 进程级默认域的句柄，首次使用时创建。
    #[cfg(not(feature = "loom"))]
    #[inline]
    pub fn global() -> Domain {
        crate::global::domain()
    }

    #[inline]
    pub(crate) fn state(&self) -> &DomainState {
        &self.shared
    }

    /// Whether both handles refer to the same domain.
    /// 两个句柄是否指向同一个域。
    #[inline]
    pub fn ptr_eq(&self, other: &Domain) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// A handle that does not keep the domain alive.
    /// 一个不会使域保持存活的句柄。
    #[cfg(not(feature = "loom"))]
    #[inline]
    pub fn downgrade(&self) -> WeakDomain {
        WeakDomain {
            shared: Arc::downgrade(&self.shared),
        }
    }

    // --- slots ---

    /// Take a slot for a new holder: the thread cache first, then the registry.
    /// 为新的持有者获取一个槽：先从线程缓存，再从注册表。
    #[inline]
    pub(crate) fn take_slot(&self) -> Arc<HazardSlot> {
        match self.shared.locals.pop_slot() {
            Some(slot) => slot,
            None => self.acquire_slot(),
        }
    }

    /// Take `n` slots at once, appending them to `out`.
    /// 一次获取 `n` 个槽，追加到 `out`。
    pub(crate) fn take_slots(&self, n: usize, out: &mut Vec<Arc<HazardSlot>>) {
        let cached = self.shared.locals.pop_slots(n, out);
        if cached < n {
            self.acquire_slots(n - cached, out);
        }
    }

    /// Give a slot back, to the thread cache if it has room.
    /// 归还一个槽，线程缓存有空间时放回缓存。
    #[inline]
    pub(crate) fn recycle_slot(&self, slot: Arc<HazardSlot>) {
        slot.clear();
        if let Err(slot) = self.shared.locals.push_slot(slot) {
            self.release_slot(&slot);
        }
    }

    pub(crate) fn recycle_slots(&self, mut slots: Vec<Arc<HazardSlot>>) {
        for slot in &slots {
            slot.clear();
        }
        self.shared.locals.push_slots(&mut slots);
        for slot in &slots {
            self.release_slot(slot);
        }
    }

    /// Reuse an inactive registered slot, or register a new one.
    /// 复用一个不活跃的已注册槽，或注册一个新槽。
    pub(crate) fn acquire_slot(&self) -> Arc<HazardSlot> {
        let mut slots = self.shared.slots.lock();
        if let Some(slot) = slots.iter().find(|slot| slot.try_acquire()) {
            return Arc::clone(slot);
        }
        self.register_slot(&mut slots)
    }

    /// Same as `acquire_slot`, `n` times under a single lock.
    /// 与 `acquire_slot` 相同，但在一次加锁中执行 `n` 次。
    pub(crate) fn acquire_slots(&self, n: usize, out: &mut Vec<Arc<HazardSlot>>) {
        let mut slots = self.shared.slots.lock();
        let mut missing = n;
        for slot in slots.iter() {
            if missing == 0 {
                break;
            }
            if slot.try_acquire() {
                out.push(Arc::clone(slot));
                missing -= 1;
            }
        }
        for _ in 0..missing {
            let slot = self.register_slot(&mut slots);
            out.push(slot);
        }
    }

    fn register_slot(&self, slots: &mut Vec<Arc<HazardSlot>>) -> Arc<HazardSlot> {
        let slot = Arc::new(HazardSlot::new_active());
        slots.push(Arc::clone(&slot));
        let _count = self.shared.slot_count.fetch_add(1, Ordering::AcqRel) + 1;
        #[cfg(feature = "tracing")]
        tracing::debug!(slots = _count, "hazard slot registry grew");
        slot
    }

    /// Deactivate a slot so the registry can hand it out again.
    /// 停用一个槽，使注册表可以再次分配它。
    #[inline]
    pub(crate) fn release_slot(&self, slot: &HazardSlot) {
        slot.release();
    }

    // --- retirement ---

    /// Retire an object allocated with `Box::into_raw`.
    ///
    /// The object is reclaimed by a later pass once no hazard pointer protects it.
    /// This never frees synchronously, though it may start a reclamation pass
    /// for objects retired earlier.
    ///
    /// # Safety
    /// - `ptr` must come from `Box::<T>::into_raw`.
    /// - It must already be unreachable for new readers, i.e. removed from every
    ///   shared location a hazard pointer could protect it from.
    /// - It must not be retired twice.
    ///
    /// 退休一个通过 `Box::into_raw` 分配的对象。
    /// 一旦没有危险指针保护它，后续的回收过程就会回收它。
    /// 此方法从不同步释放，但可能为更早退休的对象启动一次回收。
    ///
    /// # 安全性
    /// - `ptr` 必须来自 `Box::<T>::into_raw`。
    /// - 它必须已经无法被新读者访问，即已从危险指针可能保护它的所有共享位置中移除。
    /// - 它不能被退休两次。
    #[inline]
    pub unsafe fn retire<T: Send + 'static>(&self, ptr: *mut T) {
        let retired = unsafe { Retired::from_box(ptr) };
        self.push_retired(retired);
    }

    /// Retire an object with a custom reclaim function.
    ///
    /// # Safety
    /// Same contract as `retire`; `reclaim` must be sound for `ptr`.
    #[inline]
    pub(crate) unsafe fn retire_with(&self, ptr: *mut (), reclaim: ReclaimFn) {
        let retired = unsafe { Retired::new(ptr, reclaim) };
        self.push_retired(retired);
    }

    fn push_retired(&self, retired: Retired) {
        let state = self.state();
        if let Some(batch) = state.locals.push_retired(retired, state.config.retire_batch_size) {
            state.garbage.push_batch(batch);
            self.try_auto_reclaim();
        }
    }

    /// Hand objects requeued by reclaim functions back to the domain.
    /// 将回收函数重新入队的对象交还给域。
    pub(crate) fn push_requeued(&self, requeue: Vec<Retired>) {
        if !requeue.is_empty() {
            self.state().garbage.push_batch(requeue);
        }
    }

    // --- reclamation ---

    fn try_auto_reclaim(&self) {
        let state = self.state();
        let Some(threshold) = state.config.auto_reclaim_threshold else {
            return;
        };
        let bound = threshold.max(
            state
                .config
                .scan_multiplier
                .saturating_mul(state.slot_count.load(Ordering::Acquire)),
        );
        if !state.garbage.try_claim(bound) {
            return;
        }
        // A pass is running, possibly on this thread through a reclaim
        // function that retires. It will see the objects on its next scan.
        let Ok(_pass) = state.reclaim_lock.try_lock() else {
            return;
        };

        let passes = state.scan_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let interval = state.config.cleanup_interval;
        if interval > 0 && passes % interval == 0 {
            state.garbage.push_batch(state.locals.drain_all_retired());
        }

        self.reclaim_pass();
    }

    /// Reclaim what can be reclaimed right now.
    ///
    /// Hands the calling thread's batch to the domain and performs one scan.
    /// Returns the number of objects reclaimed. Waits for a pass already
    /// running on another thread, so it must not be called from the drop of an
    /// object retired into this domain.
    ///
    /// 立即回收可以回收的对象。
    /// 将调用线程的批次交给域并执行一次扫描。返回回收的对象数量。
    /// 会等待其他线程上正在进行的回收，因此不能在退休到此域的对象的 drop 中调用。
    pub fn try_reclaim(&self) -> usize {
        let state = self.state();
        state.garbage.push_batch(state.locals.take_retired());
        state.garbage.reset_count();
        let _pass = state.reclaim_lock.lock();
        self.reclaim_pass()
    }

    /// Reclaim everything that is not protected.
    ///
    /// Collects the batches of every thread and scans until a pass makes no progress.
    /// Objects protected by a live hazard pointer stay retired.
    /// Same restriction as [`try_reclaim`](Domain::try_reclaim) on drops.
    ///
    /// 回收所有未受保护的对象。
    /// 收集所有线程的批次并反复扫描，直到某次扫描没有进展为止。
    /// 被存活危险指针保护的对象保持退休状态。
    pub fn cleanup(&self) {
        let state = self.state();
        state.garbage.push_batch(state.locals.drain_all_retired());
        state.garbage.reset_count();

        let _pass = state.reclaim_lock.lock();
        let mut _total = 0;
        loop {
            let freed = self.reclaim_pass();
            _total += freed;
            if freed == 0 || state.garbage.len() == 0 {
                break;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            freed = _total,
            pending = state.garbage.len(),
            "domain cleanup finished"
        );
    }

    /// One reclamation pass. The caller holds `reclaim_lock`.
    ///
    /// 1. Take the retired list.
    /// 2. Heavy barrier, then snapshot every published hazard.
    /// 3. Reclaim objects outside the snapshot, push the rest back.
    ///
    /// 一次回收过程，调用者持有 `reclaim_lock`：
    /// 1. 取走退休列表。
    /// 2. 重量屏障，然后快照所有已发布的危险指针。
    /// 3. 回收不在快照中的对象，其余的放回。
    fn reclaim_pass(&self) -> usize {
        let state = self.state();
        let retired = state.garbage.take_all();
        if retired.is_empty() {
            return 0;
        }

        heavy_barrier();

        let hazards: HashSet<*mut ()> = state
            .slots
            .lock()
            .iter()
            .map(|slot| slot.get())
            .filter(|ptr| !ptr.is_null())
            .collect();

        let _total = retired.len();
        let mut kept = Vec::new();
        let freed = reclaim_unprotected(retired, |addr| hazards.contains(&addr), &mut kept);
        let _kept = kept.len();
        state.garbage.push_batch(kept);

        #[cfg(feature = "tracing")]
        tracing::trace!(
            scanned = _total,
            freed,
            kept = _kept,
            hazards = hazards.len(),
            "reclamation pass"
        );

        freed
    }

    // --- statistics ---

    /// Number of hazard slots registered in this domain.
    /// 此域中已注册的危险槽数量。
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.shared.slot_count.load(Ordering::Acquire)
    }

    /// Number of retired objects not reclaimed yet, thread batches included.
    /// 尚未回收的已退休对象数量，包括线程批次中的对象。
    pub fn pending_count(&self) -> usize {
        self.shared.garbage.len() + self.shared.locals.retired_len()
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-owning handle to a [`Domain`], obtained with [`Domain::downgrade`].
///
/// Objects sitting in a domain's retire list can refer to their domain through
/// it without keeping the domain alive.
///
/// [`Domain`] 的非拥有句柄，通过 [`Domain::downgrade`] 获得。
/// 位于域退休列表中的对象可以通过它引用所属的域，而不会使域保持存活。
#[cfg(not(feature = "loom"))]
#[derive(Clone)]
pub struct WeakDomain {
    shared: std::sync::Weak<DomainState>,
}

#[cfg(not(feature = "loom"))]
impl WeakDomain {
    /// The domain, if any handle to it is still alive.
    /// 如果仍有句柄存活，则返回该域。
    #[inline]
    pub fn upgrade(&self) -> Option<Domain> {
        self.shared.upgrade().map(|shared| Domain { shared })
    }
}

#[cfg(not(feature = "loom"))]
impl fmt::Debug for WeakDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDomain")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("slots", &self.slot_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

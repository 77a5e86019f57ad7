use crate::sync::{AtomicUsize, Mutex, Ordering};
use std::boxed::Box;
use std::mem;
use std::vec::Vec;

/// Type-erased reclaim function of a retired object.
///
/// It receives the object's address and a requeue list: an object whose
/// reclamation makes another object unreferenced pushes that object there
/// instead of freeing it recursively.
///
/// 已退休对象的类型擦除回收函数。
/// 它接收对象地址和一个重新入队列表：如果回收一个对象使另一个对象失去引用，
/// 则将后者推入该列表，而不是递归地释放它。
pub(crate) type ReclaimFn = unsafe fn(*mut (), &mut Vec<Retired>);

/// An object that has been retired (unlinked from the shared structure) but not yet reclaimed.
/// It stores the raw pointer and the function that knows how to reclaim the concrete type.
///
/// 一个已被退休（从共享结构中断开）但尚未回收的对象。
/// 它存储原始指针以及知道如何回收具体类型的函数。
pub(crate) struct Retired {
    ptr: *mut (),
    reclaim: ReclaimFn,
}

// SAFETY: a retired object is only reachable through its `Retired` record and
// whoever retires it guarantees the pointee may be reclaimed on any thread.
unsafe impl Send for Retired {}

/// Reclaim function for plain `Box<T>` allocations.
/// 普通 `Box<T>` 分配的回收函数。
#[inline(always)]
pub(crate) unsafe fn drop_value<T>(ptr: *mut (), _requeue: &mut Vec<Retired>) {
    let ptr = ptr as *mut T;
    unsafe {
        drop(Box::from_raw(ptr));
    }
}

impl Retired {
    /// # Safety
    /// `reclaim(ptr, _)` must be sound to call exactly once, on any thread,
    /// once no hazard protects `ptr`.
    #[inline(always)]
    pub(crate) unsafe fn new(ptr: *mut (), reclaim: ReclaimFn) -> Self {
        Self { ptr, reclaim }
    }

    /// Retire a boxed value allocated with `Box::into_raw`.
    ///
    /// # Safety
    /// `ptr` must come from `Box::<T>::into_raw` and be retired only once.
    #[inline(always)]
    pub(crate) unsafe fn from_box<T: Send + 'static>(ptr: *mut T) -> Self {
        unsafe { Self::new(ptr.cast(), drop_value::<T>) }
    }

    /// Address compared against the published hazards.
    /// 与已发布的危险指针进行比较的地址。
    #[inline(always)]
    pub(crate) fn address(&self) -> *mut () {
        self.ptr
    }

    /// # Safety
    /// No hazard may protect the object any more.
    #[inline(always)]
    pub(crate) unsafe fn reclaim(self, requeue: &mut Vec<Retired>) {
        unsafe { (self.reclaim)(self.ptr, requeue) }
    }
}

/// The domain-wide list of retired objects.
///
/// `count` follows the objects pushed since the last claimed scan and drives
/// automatic reclamation; the exact number of pending objects is the length
/// of `items`.
///
/// 域级已退休对象列表。
/// `count` 记录自上次认领扫描以来推入的对象数，用于驱动自动回收；
/// 待回收对象的精确数量为 `items` 的长度。
pub(crate) struct RetireList {
    items: Mutex<Vec<Retired>>,
    count: AtomicUsize,
}

impl RetireList {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        }
    }

    /// Push a whole batch and return the updated count.
    /// 推入整个批次并返回更新后的计数。
    pub(crate) fn push_batch(&self, mut batch: Vec<Retired>) -> usize {
        if batch.is_empty() {
            return self.count.load(Ordering::Acquire);
        }
        let added = batch.len();
        self.items.lock().append(&mut batch);
        self.count.fetch_add(added, Ordering::AcqRel) + added
    }

    /// Take every pending object, leaving the list empty.
    /// 取走所有待回收对象，使列表为空。
    pub(crate) fn take_all(&self) -> Vec<Retired> {
        mem::take(&mut *self.items.lock())
    }

    /// Elect the caller as the reclaimer once the count reached `bound`.
    ///
    /// Only one of the threads racing past the bound wins, the count restarts from zero.
    ///
    /// 当计数达到 `bound` 时选举调用者为回收者。
    /// 同时越过界限的线程中只有一个会胜出，计数从零重新开始。
    pub(crate) fn try_claim(&self, bound: usize) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current < bound {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Forget the count without electing anybody, used by manual passes.
    /// 不选举任何人而直接清零计数，用于手动回收。
    pub(crate) fn reset_count(&self) {
        self.count.store(0, Ordering::Release);
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }
}

/// Split `retired` into objects that can be reclaimed now and objects that
/// are still protected, reclaiming the former.
///
/// Objects requeued by a reclaim function lost their last reference during
/// this pass, after the hazard snapshot was taken, so the same snapshot
/// decides for them. Returns the number of reclaim calls; protected objects
/// are appended to `kept`.
///
/// 将 `retired` 分成可以立即回收的对象和仍受保护的对象，并回收前者。
/// 被回收函数重新入队的对象是在本次扫描中、危险指针快照之后失去最后一个引用的，
/// 因此由同一个快照决定。返回回收调用的次数；受保护的对象被追加到 `kept`。
pub(crate) fn reclaim_unprotected<F>(retired: Vec<Retired>, is_protected: F, kept: &mut Vec<Retired>) -> usize
where
    F: Fn(*mut ()) -> bool,
{
    let mut pending = retired;
    let mut freed = 0;

    while !pending.is_empty() {
        let mut requeue = Vec::new();
        for object in pending {
            if is_protected(object.address()) {
                kept.push(object);
            } else {
                // SAFETY: the hazard snapshot does not contain the address.
                unsafe { object.reclaim(&mut requeue) };
                freed += 1;
            }
        }
        pending = requeue;
    }

    freed
}

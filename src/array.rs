use crate::domain::Domain;
use crate::holder::no_mark;
use crate::local::SlotCacheGuard;
use crate::state::HazardSlot;
use crate::sync::{Arc, AtomicPtr};
use std::array;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::vec::Vec;

/// `M` hazard pointers acquired and released together.
///
/// All `M` slots are taken in one batch (the thread cache first, then a single
/// registry lock) and returned in one batch on drop. Each index behaves like an
/// independent `HazardPointer`.
///
/// **Example**:
/// ```
/// use hazard_set::{Domain, HazardArray};
/// use std::sync::atomic::AtomicPtr;
///
/// let domain = Domain::new();
/// let a = AtomicPtr::new(Box::into_raw(Box::new(1u8)));
/// let b = AtomicPtr::new(Box::into_raw(Box::new(2u8)));
///
/// let mut hps = HazardArray::<2>::new(&domain);
/// let pa = hps.protect_ptr(0, &a);
/// let pb = hps.protect_ptr(1, &b);
/// assert_eq!(unsafe { *pa + *pb }, 3);
/// # drop(hps);
/// # unsafe { drop(Box::from_raw(pa)); drop(Box::from_raw(pb)); }
/// ```
///
/// 一起获取和释放的 `M` 个危险指针。
/// 所有 `M` 个槽一次性批量获取（先从线程缓存，再通过一次注册表加锁），
/// drop 时也一次性批量归还。每个下标都像一个独立的 `HazardPointer`。
pub struct HazardArray<'domain, const M: usize> {
    domain: &'domain Domain,
    slots: ManuallyDrop<[Arc<HazardSlot>; M]>,
}

impl<'domain, const M: usize> HazardArray<'domain, M> {
    /// Acquire `M` empty hazard pointers from `domain`.
    /// 从 `domain` 获取 `M` 个空危险指针。
    pub fn new(domain: &'domain Domain) -> Self {
        let mut batch = Vec::with_capacity(M);
        domain.take_slots(M, &mut batch);
        let slots = array::from_fn(|_| batch.pop().unwrap_or_else(|| domain.acquire_slot()));
        Self {
            domain,
            slots: ManuallyDrop::new(slots),
        }
    }

    /// The domain these hazard pointers publish into.
    /// 这些危险指针发布到的域。
    #[inline]
    pub fn domain(&self) -> &'domain Domain {
        self.domain
    }

    /// Number of hazard pointers in the array.
    /// 数组中危险指针的数量。
    #[inline]
    pub const fn len(&self) -> usize {
        M
    }

    /// Whether the array holds no hazard pointer (`M == 0`).
    /// 数组是否不含任何危险指针（`M == 0`）。
    #[inline]
    pub const fn is_empty(&self) -> bool {
        M == 0
    }

    /// `try_protect_ptr_with` of hazard pointer `i`.
    /// 第 `i` 个危险指针的 `try_protect_ptr_with`。
    #[inline]
    pub fn try_protect_ptr_with<T, F>(&mut self, i: usize, ptr: &mut *mut T, src: &AtomicPtr<T>, unmark: F) -> bool
    where
        F: Fn(*mut T) -> *mut T,
    {
        self.slots[i].try_protect(ptr, src, unmark)
    }

    /// `protect_ptr_with` of hazard pointer `i`.
    /// 第 `i` 个危险指针的 `protect_ptr_with`。
    #[inline]
    pub fn protect_ptr_with<T, F>(&mut self, i: usize, src: &AtomicPtr<T>, unmark: F) -> *mut T
    where
        F: Fn(*mut T) -> *mut T,
    {
        self.slots[i].protect(src, unmark)
    }

    #[inline]
    pub fn protect_ptr<T>(&mut self, i: usize, src: &AtomicPtr<T>) -> *mut T {
        self.slots[i].protect(src, no_mark)
    }

    #[inline]
    pub fn reset_protection<T>(&mut self, i: usize, ptr: *const T) {
        self.slots[i].set(ptr.cast_mut().cast());
    }

    #[inline]
    pub fn reset(&mut self, i: usize) {
        self.slots[i].clear();
    }

    /// Exchange the slots (and protections) of hazard pointers `i` and `j`.
    /// 交换第 `i` 和第 `j` 个危险指针的槽（以及保护）。
    #[inline]
    pub fn swap(&mut self, i: usize, j: usize) {
        self.slots.swap(i, j);
    }

    #[inline]
    pub fn protected(&self, i: usize) -> *const () {
        self.slots[i].get()
    }
}

impl<const M: usize> Drop for HazardArray<'_, M> {
    fn drop(&mut self) {
        // SAFETY: the slots are taken exactly once, here.
        let slots = unsafe { ManuallyDrop::take(&mut self.slots) };
        self.domain.recycle_slots(Vec::from(slots));
    }
}

enum LocalSlots<'domain> {
    /// The first N entries of the thread's slot cache, used in place.
    Cached(SlotCacheGuard<'domain>),
    /// Slots owned for the lifetime of the `HazardLocal`.
    Owned(Vec<Arc<HazardSlot>>),
}

/// `N` hazard pointers borrowed from the calling thread's slot cache.
///
/// The fastest variant: when the thread cache holds (or can be topped up to) `N`
/// slots, they are used in place without being moved. A `HazardLocal` must stay
/// on the thread that created it and only one can use the cache at a time;
/// a second one, or a cache smaller than `N`, falls back to owning registry slots.
///
/// Intended for the body of a single call, e.g. one traversal of a data structure.
///
/// 从调用线程的槽缓存中借用的 `N` 个危险指针。
/// 最快的变体：当线程缓存持有（或可以补充到）`N` 个槽时，它们被就地使用而不会移动。
/// `HazardLocal` 必须留在创建它的线程上，并且同一时间只有一个能使用缓存；
/// 第二个 `HazardLocal`，或小于 `N` 的缓存，会退回到拥有注册表中的槽。
/// 用于单次调用的函数体，例如一次数据结构遍历。
pub struct HazardLocal<'domain, const N: usize> {
    domain: &'domain Domain,
    slots: LocalSlots<'domain>,
    _not_send: PhantomData<*const ()>,
}

impl<'domain, const N: usize> HazardLocal<'domain, N> {
    pub fn new(domain: &'domain Domain) -> Self {
        let slots = match domain.state().locals.borrow_slots() {
            Some(mut cache) if N <= domain.state().locals.slot_capacity() => {
                if cache.len() < N {
                    let missing = N - cache.len();
                    domain.acquire_slots(missing, &mut cache);
                }
                LocalSlots::Cached(cache)
            }
            _ => {
                let mut owned = Vec::with_capacity(N);
                domain.acquire_slots(N, &mut owned);
                LocalSlots::Owned(owned)
            }
        };
        Self {
            domain,
            slots,
            _not_send: PhantomData,
        }
    }

    #[inline]
    fn slot(&self, i: usize) -> &HazardSlot {
        debug_assert!(i < N, "BUG: hazard index {i} out of range for HazardLocal<{N}>");
        match &self.slots {
            LocalSlots::Cached(cache) => &*cache[i],
            LocalSlots::Owned(owned) => &*owned[i],
        }
    }

    /// The domain these hazard pointers publish into.
    /// 这些危险指针发布到的域。
    #[inline]
    pub fn domain(&self) -> &'domain Domain {
        self.domain
    }

    #[inline]
    pub fn try_protect_ptr_with<T, F>(&mut self, i: usize, ptr: &mut *mut T, src: &AtomicPtr<T>, unmark: F) -> bool
    where
        F: Fn(*mut T) -> *mut T,
    {
        self.slot(i).try_protect(ptr, src, unmark)
    }

    #[inline]
    pub fn protect_ptr_with<T, F>(&mut self, i: usize, src: &AtomicPtr<T>, unmark: F) -> *mut T
    where
        F: Fn(*mut T) -> *mut T,
    {
        self.slot(i).protect(src, unmark)
    }

    #[inline]
    pub fn protect_ptr<T>(&mut self, i: usize, src: &AtomicPtr<T>) -> *mut T {
        self.slot(i).protect(src, no_mark)
    }

    #[inline]
    pub fn reset_protection<T>(&mut self, i: usize, ptr: *const T) {
        self.slot(i).set(ptr.cast_mut().cast());
    }

    #[inline]
    pub fn reset(&mut self, i: usize) {
        self.slot(i).clear();
    }

    #[inline]
    pub fn swap(&mut self, i: usize, j: usize) {
        debug_assert!(i < N && j < N, "BUG: hazard index out of range for HazardLocal<{N}>");
        match &mut self.slots {
            LocalSlots::Cached(cache) => cache.swap(i, j),
            LocalSlots::Owned(owned) => owned.swap(i, j),
        }
    }

    #[inline]
    pub fn protected(&self, i: usize) -> *const () {
        self.slot(i).get()
    }

    /// Whether the slots are used in place from the thread cache.
    #[cfg(test)]
    pub(crate) fn is_cached(&self) -> bool {
        matches!(self.slots, LocalSlots::Cached(_))
    }
}

impl<const N: usize> Drop for HazardLocal<'_, N> {
    fn drop(&mut self) {
        match &mut self.slots {
            LocalSlots::Cached(cache) => {
                for slot in cache.iter().take(N) {
                    slot.clear();
                }
            }
            LocalSlots::Owned(owned) => self.domain.recycle_slots(mem::take(owned)),
        }
    }
}

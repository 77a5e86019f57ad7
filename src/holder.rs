use crate::domain::Domain;
use crate::state::HazardSlot;
use crate::sync::{Arc, AtomicPtr};
use std::fmt;
use std::mem::{self, ManuallyDrop};

/// Identity `unmark` function for sources that carry no tag bits.
#[inline(always)]
pub(crate) fn no_mark<T>(ptr: *mut T) -> *mut T {
    ptr
}

/// An owned hazard pointer.
///
/// A `HazardPointer` owns one slot of its domain for its whole lifetime. While it
/// publishes an address, no object at that address retired into the domain is
/// reclaimed.
///
/// Slots come from the calling thread's cache when possible and go back to it on drop.
/// Dropping a hazard pointer clears its protection and never reclaims anything.
///
/// **Example**:
/// ```
/// use hazard_set::{Domain, HazardPointer};
/// use std::sync::atomic::AtomicPtr;
///
/// let domain = Domain::new();
/// let shared = AtomicPtr::new(Box::into_raw(Box::new(String::from("hello"))));
///
/// let mut hp = HazardPointer::new(&domain);
/// let raw = hp.protect_ptr(&shared);
/// // `raw` cannot be reclaimed until `hp` is reset or dropped.
/// assert_eq!(unsafe { &*raw }, "hello");
/// # drop(hp);
/// # unsafe { drop(Box::from_raw(raw)) };
/// ```
///
/// 一个拥有所有权的危险指针。
/// `HazardPointer` 在其整个生命周期内拥有其域中的一个槽。
/// 在它发布某个地址期间，退休到该域中、位于该地址的对象不会被回收。
/// 槽尽可能从调用线程的缓存中获取，并在 drop 时归还。
/// drop 危险指针会清除其保护，并且从不回收任何对象。
pub struct HazardPointer<'domain> {
    domain: &'domain Domain,
    slot: ManuallyDrop<Arc<HazardSlot>>,
}

impl<'domain> HazardPointer<'domain> {
    /// Create an empty hazard pointer in `domain`.
    /// 在 `domain` 中创建一个空的危险指针。
    #[inline]
    pub fn new(domain: &'domain Domain) -> Self {
        Self {
            domain,
            slot: ManuallyDrop::new(domain.take_slot()),
        }
    }

    /// The domain this hazard pointer publishes into.
    /// 此危险指针发布到的域。
    #[inline]
    pub fn domain(&self) -> &'domain Domain {
        self.domain
    }

    /// Try once to protect the value `*ptr`, which the caller read from `src`.
    ///
    /// Publishes `unmark(*ptr)` then re-reads `src`. On success the published address
    /// is protected and `true` is returned. Otherwise `*ptr` is updated to the new
    /// value of `src`, the protection is cleared and `false` is returned.
    ///
    /// 尝试一次保护调用者从 `src` 读取的值 `*ptr`。
    /// 发布 `unmark(*ptr)` 后重新读取 `src`。成功时已发布的地址受到保护并返回 `true`。
    /// 否则 `*ptr` 被更新为 `src` 的新值，保护被清除并返回 `false`。
    #[inline]
    pub fn try_protect_ptr_with<T, F>(&mut self, ptr: &mut *mut T, src: &AtomicPtr<T>, unmark: F) -> bool
    where
        F: Fn(*mut T) -> *mut T,
    {
        self.slot.try_protect(ptr, src, unmark)
    }

    /// Protect the current value of `src`, retrying until validated.
    ///
    /// `unmark` strips tag bits: the protected address is `unmark(value)` while the
    /// returned pointer is the raw value read from `src`.
    ///
    /// 保护 `src` 的当前值，重试直到验证通过。
    /// `unmark` 去除标记位：受保护的地址是 `unmark(value)`，返回的是从 `src` 读取的原始值。
    #[inline]
    pub fn protect_ptr_with<T, F>(&mut self, src: &AtomicPtr<T>, unmark: F) -> *mut T
    where
        F: Fn(*mut T) -> *mut T,
    {
        self.slot.protect(src, unmark)
    }

    /// Protect the current value of an untagged `src`.
    /// 保护一个不带标记的 `src` 的当前值。
    #[inline]
    pub fn protect_ptr<T>(&mut self, src: &AtomicPtr<T>) -> *mut T {
        self.slot.protect(src, no_mark)
    }

    /// Protect the current value of `src` and borrow it.
    ///
    /// The reference lives as long as this hazard pointer is not used again.
    ///
    /// # Safety
    /// Every non-null value stored in `src` must point to a valid `T` that is only
    /// freed through this hazard pointer's domain.
    ///
    /// 保护 `src` 的当前值并借用它。
    /// 只要此危险指针不被再次使用，引用就一直有效。
    ///
    /// # 安全性
    /// 存储在 `src` 中的每个非空值都必须指向一个有效的 `T`，且只能通过此危险指针的域释放。
    #[inline]
    pub unsafe fn protect<'l, T>(&'l mut self, src: &AtomicPtr<T>) -> Option<&'l T> {
        let ptr = self.protect_ptr(src);
        unsafe { ptr.as_ref() }
    }

    /// Publish `ptr` without validation.
    ///
    /// Only sound when the caller already knows `ptr` is live, e.g. because another
    /// hazard pointer protects it.
    ///
    /// 不经验证直接发布 `ptr`。
    /// 仅当调用者已知 `ptr` 存活时（例如另一个危险指针正在保护它）才是可靠的。
    #[inline]
    pub fn reset_protection<T>(&mut self, ptr: *const T) {
        self.slot.set(ptr.cast_mut().cast());
    }

    /// Clear the protection.
    /// 清除保护。
    #[inline]
    pub fn reset(&mut self) {
        self.slot.clear();
    }

    /// Exchange the slots (and protections) of two hazard pointers.
    /// 交换两个危险指针的槽（以及保护）。
    #[inline]
    pub fn swap(&mut self, other: &mut HazardPointer<'domain>) {
        mem::swap(self, other);
    }

    /// Address currently published by this hazard pointer.
    /// 此危险指针当前发布的地址。
    #[inline]
    pub fn protected(&self) -> *const () {
        self.slot.get()
    }
}

impl Drop for HazardPointer<'_> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: the slot is taken exactly once, here.
        let slot = unsafe { ManuallyDrop::take(&mut self.slot) };
        self.domain.recycle_slot(slot);
    }
}

impl fmt::Debug for HazardPointer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HazardPointer")
            .field("protected", &self.protected())
            .finish()
    }
}

use crate::domain::{Domain, WeakDomain};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// An object that knows which domain it is retired into.
///
/// Implementors only provide `domain`; `retire` hands the object to it.
/// An object sitting in the retire list should not hold a strong [`Domain`]
/// handle: the domain would then own a handle to itself and never be dropped.
///
/// 一个知道自己应退休到哪个域的对象。
/// 实现者只需提供 `domain`；`retire` 将对象交给该域。
/// 位于退休列表中的对象不应持有强 [`Domain`] 句柄，否则域将持有指向自身的句柄而永远不会被 drop。
pub trait Retire: Send + Sized + 'static {
    /// The domain that reclaims this object, or `None` once it is gone.
    /// 回收此对象的域；域已不存在时返回 `None`。
    fn domain(&self) -> Option<Domain>;

    /// Retire `this` into its domain.
    ///
    /// When the domain is gone no hazard pointer of it can exist any more, and
    /// the object is dropped right away.
    ///
    /// # Safety
    /// - `this` must come from `Box::<Self>::into_raw`.
    /// - It must already be unreachable for new readers.
    /// - It must not be retired twice, nor used by the caller afterwards.
    ///
    /// 将 `this` 退休到它的域中。
    /// 域已不存在时，不可能再有它的危险指针，对象被立即 drop。
    ///
    /// # 安全性
    /// - `this` 必须来自 `Box::<Self>::into_raw`。
    /// - 它必须已经无法被新读者访问。
    /// - 它不能被退休两次，之后调用者也不能再使用它。
    unsafe fn retire(this: *mut Self) {
        match unsafe { (*this).domain() } {
            Some(domain) => unsafe { domain.retire(this) },
            None => unsafe { drop(Box::from_raw(this)) },
        }
    }
}

/// Wrapper that makes any value retireable into a chosen domain.
///
/// The wrapper refers to its domain through a [`WeakDomain`], so retired
/// wrappers never keep the domain alive: dropping the last handle reclaims them.
///
/// **Example**:
/// ```
/// use hazard_set::{Domain, HazardPointer, Retire, Retireable};
/// use std::sync::atomic::{AtomicPtr, Ordering};
///
/// let domain = Domain::new();
/// let shared = AtomicPtr::new(Box::into_raw(Box::new(Retireable::new(7u64, &domain))));
///
/// let mut hp = HazardPointer::new(&domain);
/// assert_eq!(unsafe { hp.protect(&shared) }.map(|v| **v), Some(7));
///
/// let old = shared.swap(Box::into_raw(Box::new(Retireable::new(8u64, &domain))), Ordering::AcqRel);
/// unsafe { Retire::retire(old) };
///
/// // Still protected by `hp`.
/// domain.cleanup();
/// assert_eq!(domain.pending_count(), 1);
///
/// drop(hp);
/// domain.cleanup();
/// assert_eq!(domain.pending_count(), 0);
/// # unsafe { drop(Box::from_raw(shared.load(Ordering::Acquire))) };
/// ```
///
/// 使任意值可以退休到指定域的包装器。
pub struct Retireable<T> {
    value: T,
    domain: WeakDomain,
}

impl<T> Retireable<T> {
    #[inline]
    pub fn new(value: T, domain: &Domain) -> Self {
        Self {
            value,
            domain: domain.downgrade(),
        }
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Send + 'static> Retire for Retireable<T> {
    #[inline]
    fn domain(&self) -> Option<Domain> {
        self.domain.upgrade()
    }
}

impl<T> Deref for Retireable<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Retireable<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Retireable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Retireable").field(&self.value).finish()
    }
}

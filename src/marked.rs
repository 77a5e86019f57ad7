// Tagged `next` pointers of the sorted set.
//
// Bit 0 is the deletion mark: once set on a node's `next`, the node is
// logically removed and the mark is never cleared. Nodes are at least
// pointer-aligned, so the bit is always free.

const DELETE_MARK: usize = 0b1;

/// A pointer that uses its least significant bit as the deletion mark.
pub(crate) struct MarkedPtr<T> {
    ptr: *mut T,
}

impl<T> Clone for MarkedPtr<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MarkedPtr<T> {}

impl<T> MarkedPtr<T> {
    /// Wrap a (possibly marked) pointer.
    #[inline]
    pub(crate) fn new(ptr: *mut T) -> Self {
        MarkedPtr { ptr }
    }

    /// Strip the mark from a raw pointer. Used as the `unmark` function of hazard pointers.
    #[inline]
    pub(crate) fn unmark(ptr: *mut T) -> *mut T {
        (ptr as usize & !DELETE_MARK) as *mut T
    }

    /// The pointer without its mark (the one you dereference).
    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut T {
        Self::unmark(self.ptr)
    }

    /// The pointer with its mark intact (for CAS operations).
    #[inline]
    pub(crate) fn as_raw(&self) -> *mut T {
        self.ptr
    }

    #[inline]
    pub(crate) fn is_marked(&self) -> bool {
        (self.ptr as usize & DELETE_MARK) != 0
    }

    /// Same address, mark set or cleared.
    #[inline]
    pub(crate) fn with_mark(&self, mark: bool) -> Self {
        let bits = self.as_ptr() as usize;
        let bits = if mark { bits | DELETE_MARK } else { bits };
        MarkedPtr {
            ptr: bits as *mut T,
        }
    }
}

//! Lock-free sorted set (Harris-style linked list) protected by hazard pointers.
//!
//! Deletion is two-phase: a node is first *logically* removed by setting the
//! mark bit of its own `next`, then *physically* unlinked by a CAS on its
//! predecessor. Traversals step over marked nodes without helping, so lookups
//! are wait-free; `remove` and the repair pass do the unlinking.
//!
//! Each node carries a reference count: one "existence" reference dropped by
//! the first reclamation pass that finds the node unprotected, plus one per
//! `next` cell that links it. A traversal may walk from a removed node into
//! its (possibly also removed) successors; the count keeps every node such a
//! walk can reach allocated.
//!
//! 由危险指针保护的无锁有序集合（Harris 风格链表）。
//! 删除分两个阶段：先通过设置节点自身 `next` 的标记位进行*逻辑*删除，
//! 再通过对前驱的 CAS 进行*物理*断开。遍历会跳过被标记的节点而不帮助断开，
//! 因此查找是无等待的；断开由 `remove` 和修复过程完成。
//! 每个节点带有引用计数：一个"存在"引用，在第一次发现节点未受保护的回收过程中释放；
//! 以及每个链接它的 `next` 单元各一个引用。

use crate::array::{HazardArray, HazardLocal};
use crate::backoff::Backoff;
use crate::domain::Domain;
use crate::garbage::Retired;
use crate::marked::MarkedPtr;
use crate::sync::{AtomicPtr, AtomicUsize, Ordering};
use std::boxed::Box;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::vec::Vec;

// Hazard indices used by traversals.
const PREV: usize = 0;
const CURR: usize = 1;
const NEXT: usize = 2;

pub(crate) struct Node<T> {
    pub(crate) value: T,
    pub(crate) next: AtomicPtr<Node<T>>,
    refs: AtomicUsize,
}

impl<T> Node<T> {
    /// Existence reference plus the link that will publish the node.
    fn new(value: T) -> Self {
        Self {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
            refs: AtomicUsize::new(2),
        }
    }

    #[inline]
    fn is_deleted(&self) -> bool {
        MarkedPtr::new(self.next.load(Ordering::Acquire)).is_marked()
    }
}

/// Reclaim function of a retired node: drop one reference, free on the last one.
///
/// Freeing a node releases its link to the successor.
unsafe fn reclaim_node<T>(ptr: *mut (), requeue: &mut Vec<Retired>) {
    let node = ptr.cast::<Node<T>>();
    unsafe {
        if (*node).refs.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let next = MarkedPtr::unmark((*node).next.load(Ordering::Acquire));
        drop(Box::from_raw(node));
        if !next.is_null() {
            release_link(next, requeue);
        }
    }
}

/// Drop one reference of `node`.
///
/// The last reference is not freed here: a reader may still hold a hazard on
/// the node, so it is handed back to the reclaimer, which checks it against
/// the hazard snapshot.
unsafe fn release_link<T>(node: *mut Node<T>, requeue: &mut Vec<Retired>) {
    unsafe {
        if (*node).refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            (*node).refs.fetch_add(1, Ordering::Relaxed);
            requeue.push(Retired::new(node.cast(), reclaim_node::<T>));
        }
    }
}

/// Where a traversal stopped.
pub(crate) struct Position<T> {
    pub(crate) found: bool,
    /// `*prev` linked `curr` directly, no marked node in between.
    pub(crate) adjacent: bool,
    /// The cell that links `curr`: the head, or `next` of the node protected by `PREV`.
    prev: *const AtomicPtr<Node<T>>,
    /// First unmarked node whose value is not below the target, or null.
    pub(crate) curr: *mut Node<T>,
}

/// A lock-free set keeping its elements in ascending order.
///
/// `add`, `remove` and `contains` can be called from any number of threads.
/// Removed nodes are retired into the set's domain and reclaimed once no
/// hazard pointer protects them.
///
/// **Example**:
/// ```
/// use hazard_set::{Domain, SortedSet};
///
/// let set = SortedSet::with_domain(Domain::new());
/// assert!(set.add(3));
/// assert!(set.add(2));
/// assert!(set.add(5));
/// assert!(!set.add(3));
///
/// assert_eq!(set.first(), Some(2));
/// assert_eq!(set.last(), Some(5));
/// assert!(set.remove(&2));
/// assert_eq!(set.first(), Some(3));
/// assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 5]);
/// ```
///
/// 一个按升序保存元素的无锁集合。
/// `add`、`remove` 和 `contains` 可以被任意多个线程调用。
/// 被移除的节点会退休到集合的域中，在没有危险指针保护时被回收。
pub struct SortedSet<T> {
    head: AtomicPtr<Node<T>>,
    domain: Domain,
    _marker: PhantomData<T>,
}

#[cfg(not(feature = "loom"))]
impl<T: Ord + Send + Sync + 'static> SortedSet<T> {
    /// Create an empty set in the default domain.
    /// 在默认域中创建一个空集合。
    pub fn new() -> Self {
        Self::with_domain(Domain::global())
    }
}

#[cfg(not(feature = "loom"))]
impl<T: Ord + Send + Sync + 'static> Default for SortedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Send + Sync + 'static> SortedSet<T> {
    /// Create an empty set whose removed nodes are reclaimed by `domain`.
    /// 创建一个空集合，其被移除的节点由 `domain` 回收。
    pub fn with_domain(domain: Domain) -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            domain,
            _marker: PhantomData,
        }
    }

    /// The domain removed nodes are retired into.
    /// 被移除节点退休到的域。
    #[inline]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Locate the first unmarked node not below `value`.
    ///
    /// On return `PREV` protects the owner of `prev` (when it is not the head)
    /// and `CURR` protects `curr`. Marked nodes are stepped over, never unlinked.
    pub(crate) fn find(&self, value: &T, hp: &mut HazardLocal<'_, 3>) -> Position<T> {
        let mut prev: *const AtomicPtr<Node<T>> = &self.head;
        let mut adjacent = true;
        hp.reset(PREV);
        let mut curr = hp.protect_ptr(CURR, &self.head);

        loop {
            if curr.is_null() {
                return Position {
                    found: false,
                    adjacent,
                    prev,
                    curr,
                };
            }
            // SAFETY: `curr` is protected by `CURR` and was reached through a counted link.
            let node = unsafe { &*curr };
            let next = MarkedPtr::new(hp.protect_ptr_with(NEXT, &node.next, MarkedPtr::unmark));

            if next.is_marked() {
                adjacent = false;
                hp.swap(CURR, NEXT);
                curr = next.as_ptr();
                continue;
            }

            match node.value.cmp(value) {
                CmpOrdering::Less => {
                    prev = &node.next;
                    adjacent = true;
                    hp.swap(PREV, CURR);
                    hp.swap(CURR, NEXT);
                    curr = next.as_ptr();
                }
                CmpOrdering::Equal => {
                    return Position {
                        found: true,
                        adjacent,
                        prev,
                        curr,
                    };
                }
                CmpOrdering::Greater => {
                    return Position {
                        found: false,
                        adjacent,
                        prev,
                        curr,
                    };
                }
            }
        }
    }

    /// Unlink the marked node `curr` from `prev` and retire it.
    ///
    /// # Safety
    /// `prev` must belong to the head or a protected node, `curr` must be
    /// protected and marked, `succ` must be its (unmarked) successor.
    unsafe fn unlink(&self, prev: &AtomicPtr<Node<T>>, curr: *mut Node<T>, succ: *mut Node<T>) -> bool {
        // Count the new link before publishing it. `curr` still links `succ`,
        // so the count cannot reach zero in between.
        let succ_ref = unsafe { succ.as_ref() };
        if let Some(succ) = succ_ref {
            succ.refs.fetch_add(1, Ordering::Relaxed);
        }
        if prev
            .compare_exchange(curr, succ, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            if let Some(succ) = succ_ref {
                succ.refs.fetch_sub(1, Ordering::Relaxed);
            }
            return false;
        }

        let mut requeue = Vec::new();
        unsafe {
            // `prev` no longer links `curr`.
            release_link(curr, &mut requeue);
            self.domain.retire_with(curr.cast(), reclaim_node::<T>);
        }
        self.domain.push_requeued(requeue);
        true
    }

    /// Unlink every marked node met on the way to `value`.
    ///
    /// Restarts from the head when a CAS fails. Stops at the first unmarked
    /// node above `value`.
    pub(crate) fn repair(&self, value: &T, hp: &mut HazardLocal<'_, 3>) {
        let mut backoff = Backoff::new();

        'restart: loop {
            let mut prev: *const AtomicPtr<Node<T>> = &self.head;
            hp.reset(PREV);
            let mut curr = hp.protect_ptr(CURR, &self.head);

            while !curr.is_null() {
                // SAFETY: protected by `CURR`.
                let node = unsafe { &*curr };
                let next = MarkedPtr::new(hp.protect_ptr_with(NEXT, &node.next, MarkedPtr::unmark));

                if next.is_marked() {
                    // SAFETY: `prev` is the head or `next` of the node protected by `PREV`.
                    if unsafe { self.unlink(&*prev, curr, next.as_ptr()) } {
                        hp.swap(CURR, NEXT);
                        curr = next.as_ptr();
                        continue;
                    }
                    backoff.spin();
                    continue 'restart;
                }

                if node.value > *value {
                    return;
                }
                prev = &node.next;
                hp.swap(PREV, CURR);
                hp.swap(CURR, NEXT);
                curr = next.as_ptr();
            }
            return;
        }
    }

    /// Insert `value`. Returns `false` if an equal value is already present.
    /// 插入 `value`。如果已经存在相等的值则返回 `false`。
    pub fn add(&self, value: T) -> bool {
        let mut hp = HazardLocal::<3>::new(&self.domain);
        let mut backoff = Backoff::new();
        let node = Box::into_raw(Box::new(Node::new(value)));
        // SAFETY: the node stays private until the CAS below publishes it.
        let value = unsafe { &(*node).value };

        loop {
            let pos = self.find(value, &mut hp);
            if pos.found {
                // SAFETY: never published.
                unsafe { drop(Box::from_raw(node)) };
                return false;
            }
            if !pos.adjacent {
                self.repair(value, &mut hp);
                backoff.spin();
                continue;
            }

            // SAFETY: the node is still private.
            unsafe { (*node).next.store(pos.curr, Ordering::Relaxed) };
            // SAFETY: `prev` is the head or belongs to the node protected by `PREV`.
            let prev = unsafe { &*pos.prev };
            match prev.compare_exchange(pos.curr, node, Ordering::AcqRel, Ordering::Acquire) {
                // `prev`'s link to `curr` moved into the new node.
                Ok(_) => return true,
                Err(actual) => {
                    unsafe { (*node).next.store(ptr::null_mut(), Ordering::Relaxed) };
                    if MarkedPtr::new(actual).is_marked() {
                        self.repair(value, &mut hp);
                    }
                    backoff.spin();
                }
            }
        }
    }

    /// Remove `value`. Returns `false` if it is not present.
    ///
    /// The removal takes effect when the node's mark is set; unlinking and
    /// retirement follow, here or in a later repair pass.
    ///
    /// 移除 `value`。如果不存在则返回 `false`。
    /// 移除在节点标记被设置时生效；断开和退休随后在此处或之后的修复过程中完成。
    pub fn remove(&self, value: &T) -> bool {
        let mut hp = HazardLocal::<3>::new(&self.domain);
        let mut backoff = Backoff::new();

        loop {
            let pos = self.find(value, &mut hp);
            if !pos.found {
                return false;
            }

            // SAFETY: protected by `CURR`.
            let node = unsafe { &*pos.curr };
            let succ = node.next.load(Ordering::Acquire);
            if MarkedPtr::new(succ).is_marked() {
                // Somebody else removed it first; look again.
                backoff.spin();
                continue;
            }
            let marked = MarkedPtr::new(succ).with_mark(true).as_raw();
            if node
                .next
                .compare_exchange(succ, marked, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                backoff.spin();
                continue;
            }

            // SAFETY: `prev` and `curr` are protected, `curr` is marked.
            let unlinked = pos.adjacent && unsafe { self.unlink(&*pos.prev, pos.curr, succ) };
            if !unlinked {
                self.repair(value, &mut hp);
            }
            return true;
        }
    }

    /// Whether an equal value is present. Never modifies the set.
    /// 是否存在相等的值。从不修改集合。
    pub fn contains(&self, value: &T) -> bool {
        let mut hp = HazardLocal::<3>::new(&self.domain);
        self.find(value, &mut hp).found
    }

    /// Iterator over clones of the live values, in ascending order.
    ///
    /// Not a snapshot: values added or removed concurrently may or may not be seen.
    ///
    /// 按升序遍历存活值的克隆的迭代器。
    /// 不是快照：并发添加或移除的值可能被看到，也可能不被看到。
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            set: self,
            hazards: HazardArray::new(&self.domain),
            curr: ptr::null_mut(),
            started: false,
        }
    }

    /// Number of live values met by one traversal.
    /// 一次遍历中遇到的存活值数量。
    pub fn len(&self) -> usize {
        let mut iter = self.iter();
        let mut len = 0;
        while iter.advance().is_some() {
            len += 1;
        }
        len
    }

    pub fn is_empty(&self) -> bool {
        self.iter().advance().is_none()
    }
}

impl<T: Ord + Clone + Send + Sync + 'static> SortedSet<T> {
    /// Smallest value.
    pub fn first(&self) -> Option<T> {
        self.iter().next()
    }

    /// Largest value.
    pub fn last(&self) -> Option<T> {
        self.iter().last()
    }
}

impl<T> Drop for SortedSet<T> {
    /// Exclusive access: no traversal of this set is running, so nothing can
    /// protect its nodes. Walks the chain dropping each node's existence
    /// reference and the link that reaches it; nodes still linked by removed
    /// nodes stay with the domain until those are reclaimed.
    ///
    /// 独占访问：此集合上没有正在进行的遍历，因此没有任何东西能保护其节点。
    /// 遍历整条链，释放每个节点的存在引用以及到达它的链接；
    /// 仍被已移除节点链接的节点留在域中，直到那些节点被回收。
    fn drop(&mut self) {
        let mut curr = self.head.swap(ptr::null_mut(), Ordering::AcqRel);
        // Whether the link that reached `curr` is ours to release.
        let mut owns_link = true;

        while !curr.is_null() {
            unsafe {
                let next = MarkedPtr::unmark((*curr).next.load(Ordering::Acquire));
                let release = if owns_link { 2 } else { 1 };
                if (*curr).refs.fetch_sub(release, Ordering::AcqRel) == release {
                    drop(Box::from_raw(curr));
                    owns_link = true;
                } else {
                    owns_link = false;
                }
                curr = next;
            }
        }
    }
}

impl<T: Ord + Clone + fmt::Debug + Send + Sync + 'static> fmt::Debug for SortedSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// SAFETY: nodes are shared between threads and dropped on whichever thread reclaims them.
unsafe impl<T: Send + Sync> Send for SortedSet<T> {}
unsafe impl<T: Send + Sync> Sync for SortedSet<T> {}

/// Iterator returned by [`SortedSet::iter`].
///
/// Holds two hazard pointers: the node last yielded and the one being read.
/// [`restart`](Iter::restart) starts over from the smallest value.
///
/// [`SortedSet::iter`] 返回的迭代器。
/// 持有两个危险指针：最近产出的节点和正在读取的节点。
/// [`restart`](Iter::restart) 从最小值重新开始。
pub struct Iter<'a, T> {
    set: &'a SortedSet<T>,
    hazards: HazardArray<'a, 2>,
    curr: *mut Node<T>,
    started: bool,
}

const IT_CURR: usize = 0;
const IT_NEXT: usize = 1;

impl<'a, T> Iter<'a, T> {
    /// Start over from the head of the set.
    /// 从集合头部重新开始。
    pub fn restart(&mut self) {
        self.hazards.reset(IT_CURR);
        self.hazards.reset(IT_NEXT);
        self.curr = ptr::null_mut();
        self.started = false;
    }

    /// Step to the next unmarked node and borrow its value.
    pub(crate) fn advance(&mut self) -> Option<&T> {
        loop {
            let next = if !self.started {
                self.started = true;
                self.hazards.protect_ptr(IT_NEXT, &self.set.head)
            } else if self.curr.is_null() {
                return None;
            } else {
                // SAFETY: `curr` is protected by `IT_CURR`.
                let node = unsafe { &*self.curr };
                MarkedPtr::unmark(self.hazards.protect_ptr_with(IT_NEXT, &node.next, MarkedPtr::unmark))
            };
            self.hazards.swap(IT_CURR, IT_NEXT);
            self.curr = next;

            if self.curr.is_null() {
                return None;
            }
            // SAFETY: protected by `IT_CURR` until the next call.
            let node = unsafe { &*self.curr };
            if !node.is_deleted() {
                return Some(&node.value);
            }
        }
    }
}

impl<T: Clone> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.advance().cloned()
    }
}

//! Per-thread slot caches and retire batches of a domain.
//!
//! Compiled out under `loom`: every operation then goes straight to the
//! domain registry and retire list.
//!
//! 域的每线程槽缓存和退休批次。
//! 在 `loom` 下被编译掉：此时所有操作都直接访问域注册表和退休列表。

use crate::garbage::Retired;
use crate::state::HazardSlot;
use crate::sync::Arc;
use std::vec::Vec;

#[cfg(not(feature = "loom"))]
pub(crate) use imp::{LocalCaches, SlotCacheGuard};

#[cfg(feature = "loom")]
pub(crate) use stub::{LocalCaches, SlotCacheGuard};

#[cfg(not(feature = "loom"))]
mod imp {
    use super::*;
    use crate::sync::Mutex;
    use std::cell::{RefCell, RefMut};
    use std::mem;
    use thread_local::ThreadLocal;

    /// Borrow of the calling thread's slot cache, held by a `HazardLocal`.
    /// 对调用线程槽缓存的借用，由 `HazardLocal` 持有。
    pub(crate) type SlotCacheGuard<'a> = RefMut<'a, Vec<Arc<HazardSlot>>>;

    pub(crate) struct LocalCaches {
        slots: ThreadLocal<RefCell<Vec<Arc<HazardSlot>>>>,
        retired: ThreadLocal<Mutex<Vec<Retired>>>,
        slot_capacity: usize,
    }

    impl LocalCaches {
        pub(crate) fn new(slot_capacity: usize) -> Self {
            Self {
                slots: ThreadLocal::new(),
                retired: ThreadLocal::new(),
                slot_capacity,
            }
        }

        #[inline]
        pub(crate) fn slot_capacity(&self) -> usize {
            self.slot_capacity
        }

        #[inline]
        fn slot_cache(&self) -> &RefCell<Vec<Arc<HazardSlot>>> {
            self.slots
                .get_or(|| RefCell::new(Vec::with_capacity(self.slot_capacity)))
        }

        /// Pop a cached slot. `None` when empty or borrowed by a `HazardLocal`.
        /// 弹出一个缓存的槽。为空或被 `HazardLocal` 借用时返回 `None`。
        #[inline]
        pub(crate) fn pop_slot(&self) -> Option<Arc<HazardSlot>> {
            if self.slot_capacity == 0 {
                return None;
            }
            self.slot_cache().try_borrow_mut().ok()?.pop()
        }

        /// Move up to `n` cached slots into `out`, returning how many were moved.
        /// 将最多 `n` 个缓存槽移入 `out`，返回移动的数量。
        pub(crate) fn pop_slots(&self, n: usize, out: &mut Vec<Arc<HazardSlot>>) -> usize {
            if self.slot_capacity == 0 {
                return 0;
            }
            let Ok(mut cache) = self.slot_cache().try_borrow_mut() else {
                return 0;
            };
            let take = n.min(cache.len());
            let start = cache.len() - take;
            out.extend(cache.drain(start..));
            take
        }

        /// Cache a free slot, handing it back when the cache is full or busy.
        /// 缓存一个空闲槽；缓存已满或正忙时将其交还。
        #[inline]
        pub(crate) fn push_slot(&self, slot: Arc<HazardSlot>) -> Result<(), Arc<HazardSlot>> {
            if self.slot_capacity == 0 {
                return Err(slot);
            }
            match self.slot_cache().try_borrow_mut() {
                Ok(mut cache) if cache.len() < self.slot_capacity => {
                    cache.push(slot);
                    Ok(())
                }
                _ => Err(slot),
            }
        }

        /// Cache as many of `slots` as fit; the rest stay in `slots`.
        /// 尽可能多地缓存 `slots` 中的槽；其余的留在 `slots` 中。
        pub(crate) fn push_slots(&self, slots: &mut Vec<Arc<HazardSlot>>) {
            if self.slot_capacity == 0 {
                return;
            }
            if let Ok(mut cache) = self.slot_cache().try_borrow_mut() {
                let room = self.slot_capacity.saturating_sub(cache.len());
                let keep = slots.len().saturating_sub(room);
                cache.extend(slots.drain(keep..));
            }
        }

        /// Borrow the whole slot cache of the calling thread in place.
        /// 就地借用调用线程的整个槽缓存。
        #[inline]
        pub(crate) fn borrow_slots(&self) -> Option<SlotCacheGuard<'_>> {
            if self.slot_capacity == 0 {
                return None;
            }
            self.slot_cache().try_borrow_mut().ok()
        }

        /// Add `retired` to the calling thread's batch.
        ///
        /// Returns the full batch once it reached `batch_size`, so the caller
        /// can hand it to the domain.
        ///
        /// 将 `retired` 加入调用线程的批次。
        /// 当批次达到 `batch_size` 时返回整个批次，以便调用者交给域。
        pub(crate) fn push_retired(&self, retired: Retired, batch_size: usize) -> Option<Vec<Retired>> {
            if batch_size <= 1 {
                return Some(vec![retired]);
            }
            let batch = self.retired.get_or(|| Mutex::new(Vec::with_capacity(batch_size)));
            let mut batch = batch.lock();
            batch.push(retired);
            if batch.len() >= batch_size {
                Some(mem::replace(&mut *batch, Vec::with_capacity(batch_size)))
            } else {
                None
            }
        }

        /// Take the calling thread's batch.
        /// 取走调用线程的批次。
        pub(crate) fn take_retired(&self) -> Vec<Retired> {
            self.retired
                .get()
                .map(|batch| mem::take(&mut *batch.lock()))
                .unwrap_or_default()
        }

        /// Take the batches of every thread, including threads that already exited.
        /// 取走所有线程的批次，包括已经退出的线程。
        pub(crate) fn drain_all_retired(&self) -> Vec<Retired> {
            let mut all = Vec::new();
            for batch in self.retired.iter() {
                all.append(&mut batch.lock());
            }
            all
        }

        pub(crate) fn drain_all_mut(&mut self) -> Vec<Retired> {
            let mut all = Vec::new();
            for batch in self.retired.iter_mut() {
                all.append(&mut batch.lock());
            }
            all
        }

        /// Number of objects sitting in thread batches.
        /// 位于线程批次中的对象数量。
        pub(crate) fn retired_len(&self) -> usize {
            self.retired.iter().map(|batch| batch.lock().len()).sum()
        }
    }
}

#[cfg(feature = "loom")]
mod stub {
    use super::*;

    pub(crate) type SlotCacheGuard<'a> = &'a mut Vec<Arc<HazardSlot>>;

    pub(crate) struct LocalCaches;

    impl LocalCaches {
        pub(crate) fn new(_slot_capacity: usize) -> Self {
            LocalCaches
        }

        pub(crate) fn slot_capacity(&self) -> usize {
            0
        }

        pub(crate) fn pop_slot(&self) -> Option<Arc<HazardSlot>> {
            None
        }

        pub(crate) fn pop_slots(&self, _n: usize, _out: &mut Vec<Arc<HazardSlot>>) -> usize {
            0
        }

        pub(crate) fn push_slot(&self, slot: Arc<HazardSlot>) -> Result<(), Arc<HazardSlot>> {
            Err(slot)
        }

        pub(crate) fn push_slots(&self, _slots: &mut Vec<Arc<HazardSlot>>) {}

        pub(crate) fn borrow_slots(&self) -> Option<SlotCacheGuard<'_>> {
            None
        }

        pub(crate) fn push_retired(&self, retired: Retired, _batch_size: usize) -> Option<Vec<Retired>> {
            Some(vec![retired])
        }

        pub(crate) fn take_retired(&self) -> Vec<Retired> {
            Vec::new()
        }

        pub(crate) fn drain_all_retired(&self) -> Vec<Retired> {
            Vec::new()
        }

        pub(crate) fn drain_all_mut(&mut self) -> Vec<Retired> {
            Vec::new()
        }

        pub(crate) fn retired_len(&self) -> usize {
            0
        }
    }
}

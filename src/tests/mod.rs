/// 测试模块
/// 按主题划分：基础功能、边界情况、生命周期、并发以及有序集合
use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

mod basic_tests;
mod list_tests;

/// 带有 drop 计数的测试值，按 `key` 比较
#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) key: u64,
    drops: Arc<AtomicUsize>,
}

impl Tracked {
    pub(crate) fn new(key: u64, drops: &Arc<AtomicUsize>) -> Self {
        Self {
            key,
            drops: Arc::clone(drops),
        }
    }

    /// 用于查找的探针值，使用独立的计数器
    pub(crate) fn probe(key: u64) -> Self {
        Self {
            key,
            drops: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Tracked {}

impl PartialOrd for Tracked {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tracked {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key.cmp(&other.key)
    }
}

pub(crate) fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub(crate) fn drops(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

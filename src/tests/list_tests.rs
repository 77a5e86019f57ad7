/// 有序集合测试模块
/// 测试插入、移除、查找、迭代与修复过程
use super::{Tracked, counter, drops};
use crate::marked::MarkedPtr;
use crate::sync::Ordering;
use crate::{Domain, HazardLocal, SortedSet};

/// 测试1: 单线程基本场景
#[test]
fn test_single_thread_scenario() {
    let set = SortedSet::with_domain(Domain::new());

    assert!(set.add(3));
    assert!(set.add(2));
    assert!(set.add(5));
    assert!(!set.add(3));

    assert_eq!(set.first(), Some(2));
    assert_eq!(set.last(), Some(5));

    assert!(set.remove(&2));
    assert_eq!(set.first(), Some(3));
    assert_eq!(set.len(), 2);
}

/// 测试2: 查找
#[test]
fn test_contains() {
    let set = SortedSet::with_domain(Domain::new());
    for i in (0..100u32).step_by(3) {
        set.add(i);
    }

    for i in 0..100u32 {
        assert_eq!(set.contains(&i), i % 3 == 0, "value {i}");
    }
}

/// 测试3: 迭代器按升序产出
#[test]
fn test_iter_ascending() {
    let set = SortedSet::with_domain(Domain::new());
    for i in [9u8, 1, 7, 3, 5] {
        set.add(i);
    }

    assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 3, 5, 7, 9]);
    assert_eq!(format!("{set:?}"), "{1, 3, 5, 7, 9}");
}

/// 测试4: 迭代器重新开始
#[test]
fn test_iter_restart() {
    let set = SortedSet::with_domain(Domain::new());
    for i in 1..=3u32 {
        set.add(i);
    }

    let mut iter = set.iter();
    assert_eq!(iter.next(), Some(1));
    assert_eq!(iter.next(), Some(2));

    // 重新开始后能看到新插入的较小值
    set.add(0);
    iter.restart();
    assert_eq!(iter.collect::<Vec<_>>(), vec![0, 1, 2, 3]);
}

/// 测试5: 耗尽后迭代器保持结束状态
#[test]
fn test_iter_stays_exhausted() {
    let set = SortedSet::with_domain(Domain::new());
    set.add(1u32);

    let mut iter = set.iter();
    assert_eq!(iter.next(), Some(1));
    assert_eq!(iter.next(), None);

    set.add(2);
    assert_eq!(iter.next(), None);
}

/// 测试6: 查找跳过被标记但未断开的节点
#[test]
fn test_find_skips_marked_node() {
    let domain = Domain::new();
    let set = SortedSet::with_domain(domain.clone());
    for i in 1..=3u32 {
        set.add(i);
    }

    // 只设置标记，不断开，模拟一个停在中途的移除者
    {
        let mut hp = HazardLocal::<3>::new(&domain);
        let pos = set.find(&2, &mut hp);
        assert!(pos.found);
        let node = unsafe { &*pos.curr };
        let succ = node.next.load(Ordering::Acquire);
        let marked = MarkedPtr::new(succ).with_mark(true).as_raw();
        node.next.store(marked, Ordering::Release);
    }

    assert!(!set.contains(&2));
    assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(set.len(), 2);

    // 查找 3 时前驱单元并不直接链接它
    {
        let mut hp = HazardLocal::<3>::new(&domain);
        let pos = set.find(&3, &mut hp);
        assert!(pos.found);
        assert!(!pos.adjacent);
    }

    // 插入在被标记节点之后的位置会先修复链表
    assert!(set.add(4));
    assert!(set.add(2));
    assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
}

/// 测试7: 修复过程断开被标记的节点并退休它
#[test]
fn test_repair_unlinks_marked_nodes() {
    let domain = Domain::new();
    let set = SortedSet::with_domain(domain.clone());
    let counter = counter();
    for i in 1..=5 {
        set.add(Tracked::new(i, &counter));
    }

    // 标记 2 和 4 而不断开
    for key in [2, 4] {
        let mut hp = HazardLocal::<3>::new(&domain);
        let pos = set.find(&Tracked::probe(key), &mut hp);
        let node = unsafe { &*pos.curr };
        let succ = node.next.load(Ordering::Acquire);
        node.next
            .store(MarkedPtr::new(succ).with_mark(true).as_raw(), Ordering::Release);
    }

    {
        let mut hp = HazardLocal::<3>::new(&domain);
        set.repair(&Tracked::probe(5), &mut hp);
    }
    assert_eq!(domain.pending_count(), 2);

    // 修复后前驱直接链接后继
    {
        let mut hp = HazardLocal::<3>::new(&domain);
        let pos = set.find(&Tracked::probe(5), &mut hp);
        assert!(pos.found);
        assert!(pos.adjacent);
    }

    domain.cleanup();
    assert_eq!(drops(&counter), 2);
    assert_eq!(set.len(), 3);
}

/// 测试8: 插入与移除交替
#[test]
fn test_add_remove_interleaved() {
    let set = SortedSet::with_domain(Domain::new());

    for round in 0..10u32 {
        for i in 0..50 {
            assert!(set.add(round * 1000 + i));
        }
        for i in (0..50).filter(|i| i % 2 == 1) {
            assert!(set.remove(&(round * 1000 + i)));
        }
    }

    assert_eq!(set.len(), 250);
    let values: Vec<u32> = set.iter().collect();
    assert!(values.windows(2).all(|w| w[0] < w[1]));
    assert!(values.iter().all(|v| v % 2 == 0));
}

/// 测试9: 有界内存：大量移除后清理使待回收数量回到零
#[test]
fn test_pending_returns_to_zero() {
    let domain = Domain::new();
    let set = SortedSet::with_domain(domain.clone());

    for i in 0..5000u64 {
        set.add(i);
    }
    for i in 0..5000u64 {
        set.remove(&i);
    }

    domain.cleanup();
    assert_eq!(domain.pending_count(), 0);
    assert!(set.is_empty());
}

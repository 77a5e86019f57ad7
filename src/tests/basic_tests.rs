/// 基础测试模块
/// 测试域、危险指针、数组与退休列表的核心功能
use super::{Tracked, counter, drops};
use crate::garbage::{Retired, RetireList, reclaim_unprotected};
use crate::marked::MarkedPtr;
use crate::{Domain, HazardArray, HazardLocal, HazardPointer};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// 测试1: 创建默认域
#[test]
fn test_create_domain() {
    let domain = Domain::new();

    // 新域中没有槽，也没有待回收对象
    assert_eq!(domain.slot_count(), 0);
    assert_eq!(domain.pending_count(), 0);
}

/// 测试2: 构建器配置
#[test]
fn test_builder_configuration() {
    let domain = Domain::builder()
        .auto_reclaim_threshold(None)
        .scan_multiplier(4)
        .retire_batch_size(1)
        .slot_cache_capacity(0)
        .cleanup_interval(0)
        .build();

    let config = domain.state().config;
    assert_eq!(config.auto_reclaim_threshold, None);
    assert_eq!(config.scan_multiplier, 4);
    assert_eq!(config.retire_batch_size, 1);
    assert_eq!(config.slot_cache_capacity, 0);
    assert_eq!(config.cleanup_interval, 0);
}

/// 测试3: 危险指针保护并读取值
#[test]
fn test_hazard_pointer_protect_and_read() {
    let domain = Domain::new();
    let shared = AtomicPtr::new(Box::into_raw(Box::new(42i32)));

    let mut hp = HazardPointer::new(&domain);
    let value = unsafe { hp.protect(&shared) };
    assert_eq!(value, Some(&42));

    // 受保护的地址就是读取到的指针
    assert_eq!(hp.protected(), shared.load(Ordering::Acquire) as *const ());

    hp.reset();
    assert!(hp.protected().is_null());

    unsafe { drop(Box::from_raw(shared.load(Ordering::Acquire))) };
}

/// 测试4: 保护空指针
#[test]
fn test_protect_null() {
    let domain = Domain::new();
    let shared: AtomicPtr<u64> = AtomicPtr::new(ptr::null_mut());

    let mut hp = HazardPointer::new(&domain);
    assert!(unsafe { hp.protect(&shared) }.is_none());
    assert!(hp.protected().is_null());
}

/// 测试5: 一次性尝试保护在源改变时失败
#[test]
fn test_try_protect_detects_change() {
    let domain = Domain::new();
    let a = Box::into_raw(Box::new(1u32));
    let b = Box::into_raw(Box::new(2u32));
    let shared = AtomicPtr::new(b);

    let mut hp = HazardPointer::new(&domain);

    // 调用者认为源中是 a，但实际上是 b
    let mut seen = a;
    assert!(!hp.try_protect_ptr_with(&mut seen, &shared, |p| p));
    assert_eq!(seen, b);
    assert!(hp.protected().is_null());

    // 用更新后的值重试即可成功
    assert!(hp.try_protect_ptr_with(&mut seen, &shared, |p| p));
    assert_eq!(hp.protected(), b as *const ());

    drop(hp);
    unsafe {
        drop(Box::from_raw(a));
        drop(Box::from_raw(b));
    }
}

/// 测试6: 带标记的指针只发布去除标记后的地址
#[test]
fn test_protect_marked_pointer() {
    let domain = Domain::new();
    let raw = Box::into_raw(Box::new(7u64));
    let marked = MarkedPtr::new(raw).with_mark(true).as_raw();
    let shared = AtomicPtr::new(marked);

    let mut hp = HazardPointer::new(&domain);
    let seen = hp.protect_ptr_with(&shared, MarkedPtr::unmark);

    // 返回值保留标记，发布的地址没有标记
    assert_eq!(seen, marked);
    assert!(MarkedPtr::new(seen).is_marked());
    assert_eq!(hp.protected(), raw as *const ());

    drop(hp);
    unsafe { drop(Box::from_raw(raw)) };
}

/// 测试7: 交换两个危险指针
#[test]
fn test_hazard_pointer_swap() {
    let domain = Domain::new();
    let a = 0x1000usize as *const u8;
    let b = 0x2000usize as *const u8;

    let mut hp1 = HazardPointer::new(&domain);
    let mut hp2 = HazardPointer::new(&domain);
    hp1.reset_protection(a);
    hp2.reset_protection(b);

    hp1.swap(&mut hp2);
    assert_eq!(hp1.protected(), b.cast());
    assert_eq!(hp2.protected(), a.cast());
}

/// 测试8: 危险指针数组
#[test]
fn test_hazard_array_protect() {
    let domain = Domain::new();
    let a = AtomicPtr::new(Box::into_raw(Box::new(10u32)));
    let b = AtomicPtr::new(Box::into_raw(Box::new(20u32)));

    let mut hps = HazardArray::<3>::new(&domain);
    assert_eq!(hps.len(), 3);
    assert_eq!(domain.slot_count(), 3);

    let pa = hps.protect_ptr(0, &a);
    let pb = hps.protect_ptr(2, &b);
    assert_eq!(unsafe { *pa + *pb }, 30);
    assert!(hps.protected(1).is_null());

    hps.swap(0, 1);
    assert!(hps.protected(0).is_null());
    assert_eq!(hps.protected(1), pa as *const ());

    hps.reset(1);
    assert!(hps.protected(1).is_null());

    drop(hps);
    unsafe {
        drop(Box::from_raw(pa));
        drop(Box::from_raw(pb));
    }
}

/// 测试9: 线程缓存中的局部危险指针
#[test]
fn test_hazard_local_uses_thread_cache() {
    let domain = Domain::new();

    {
        let hps = HazardLocal::<3>::new(&domain);
        assert!(hps.is_cached());
        assert_eq!(domain.slot_count(), 3);
    }

    // 槽保留在线程缓存中，再次创建不会注册新槽
    {
        let _hps = HazardLocal::<3>::new(&domain);
        let _hp = HazardPointer::new(&domain);
        assert_eq!(domain.slot_count(), 4);
    }
}

/// 测试10: 槽被复用
#[test]
fn test_slot_reuse() {
    let domain = Domain::new();

    for _ in 0..100 {
        let _hp = HazardPointer::new(&domain);
    }
    assert_eq!(domain.slot_count(), 1);

    // 没有线程缓存时，槽通过注册表复用
    let uncached = Domain::builder().slot_cache_capacity(0).build();
    for _ in 0..100 {
        let _hp = HazardPointer::new(&uncached);
    }
    assert_eq!(uncached.slot_count(), 1);

    let _a = HazardPointer::new(&uncached);
    let _b = HazardPointer::new(&uncached);
    assert_eq!(uncached.slot_count(), 2);

    // 归还注册表的槽变为不活跃状态
    drop(_b);
    let slots = uncached.state().slots.lock();
    assert_eq!(slots.iter().filter(|slot| slot.is_active()).count(), 1);
}

/// 测试11: 退休并清理
#[test]
fn test_retire_and_cleanup() {
    let domain = Domain::new();
    let counter = counter();

    for i in 0..10 {
        let ptr = Box::into_raw(Box::new(Tracked::new(i, &counter)));
        unsafe { domain.retire(ptr) };
    }

    // 退休从不同步释放
    assert_eq!(drops(&counter), 0);
    assert_eq!(domain.pending_count(), 10);

    domain.cleanup();
    assert_eq!(drops(&counter), 10);
    assert_eq!(domain.pending_count(), 0);
}

/// 测试12: 手动回收返回回收数量
#[test]
fn test_try_reclaim_counts() {
    let domain = Domain::new();

    for i in 0..5u64 {
        unsafe { domain.retire(Box::into_raw(Box::new(i))) };
    }

    assert_eq!(domain.try_reclaim(), 5);
    assert_eq!(domain.try_reclaim(), 0);
    assert_eq!(domain.pending_count(), 0);
}

/// 测试13: 只回收未受保护的对象
#[test]
fn test_reclaim_unprotected_keeps_protected() {
    let counter = counter();
    let a = Box::into_raw(Box::new(Tracked::new(1, &counter)));
    let b = Box::into_raw(Box::new(Tracked::new(2, &counter)));
    let batch = unsafe { vec![Retired::from_box(a), Retired::from_box(b)] };

    let mut kept = Vec::new();
    let freed = reclaim_unprotected(batch, |addr| addr == a.cast(), &mut kept);

    assert_eq!(freed, 1);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].address(), a.cast());
    assert_eq!(drops(&counter), 1);

    let mut requeue = Vec::new();
    for object in kept {
        unsafe { object.reclaim(&mut requeue) };
    }
    assert!(requeue.is_empty());
    assert_eq!(drops(&counter), 2);
}

/// 测试14: 计数达到界限时只有一次认领成功
#[test]
fn test_retire_list_claim_once() {
    let list = RetireList::new();
    let batch: Vec<Retired> = (0..4u64)
        .map(|i| unsafe { Retired::from_box(Box::into_raw(Box::new(i))) })
        .collect();
    assert_eq!(list.push_batch(batch), 4);

    assert!(!list.try_claim(5));
    assert!(list.try_claim(4));
    assert!(!list.try_claim(4));

    // 认领只重置计数，不移动对象
    assert_eq!(list.len(), 4);

    let mut requeue = Vec::new();
    for object in list.take_all() {
        unsafe { object.reclaim(&mut requeue) };
    }
    assert_eq!(list.len(), 0);
}

/// 测试15: 域句柄的克隆指向同一个域
#[test]
fn test_domain_clone_shares_state() {
    let domain = Domain::new();
    let other = domain.clone();
    assert!(domain.ptr_eq(&other));
    assert!(!domain.ptr_eq(&Domain::new()));

    unsafe { other.retire(Box::into_raw(Box::new(1u8))) };
    assert_eq!(domain.pending_count(), 1);
    domain.cleanup();
    assert_eq!(other.pending_count(), 0);
}

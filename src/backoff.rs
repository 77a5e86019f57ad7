use crate::sync::spin_loop;

/// Exponential backoff for CAS retry loops.
///
/// Each call to `spin()` executes `count + 1` pause hints, then doubles the
/// count, capped at 15: 0 → 1 → 3 → 7 → 15.
///
/// CAS 重试循环的指数退避。
/// 每次调用 `spin()` 执行 `count + 1` 次暂停提示，然后将计数加倍，上限为 15。
pub(crate) struct Backoff {
    count: u32,
}

impl Backoff {
    #[inline(always)]
    pub(crate) const fn new() -> Self {
        Self { count: 0 }
    }

    #[inline]
    pub(crate) fn spin(&mut self) {
        for _ in 0..=self.count {
            spin_loop();
        }
        self.count = ((self.count << 1) | 1) & 15;
    }
}

//! The process-wide default domain.
//!
//! Created lazily by [`domain`] (or [`Domain::global`]), replaced by [`init`] and
//! detached by [`teardown`]. A detached domain is dropped, and fully reclaimed,
//! once the last handle to it goes away.
//!
//! 进程级默认域。
//! 由 [`domain`]（或 [`Domain::global`]）惰性创建，由 [`init`] 替换，由 [`teardown`] 分离。
//! 被分离的域在最后一个句柄消失时被 drop 并完全回收。

use crate::domain::{Domain, DomainBuilder};
use crate::sync::Mutex;
use std::sync::OnceLock;

static DEFAULT: OnceLock<Mutex<Option<Domain>>> = OnceLock::new();

#[inline]
fn cell() -> &'static Mutex<Option<Domain>> {
    DEFAULT.get_or_init(|| Mutex::new(None))
}

/// Handle to the default domain, creating it with default settings on first use.
/// 默认域的句柄，首次使用时以默认设置创建。
pub fn domain() -> Domain {
    cell().lock().get_or_insert_with(Domain::new).clone()
}

/// Install a default domain built from `builder` and return a handle to it.
///
/// A previously installed default is detached; structures created on it keep
/// working since they hold their own handles.
///
/// 安装一个由 `builder` 构建的默认域并返回其句柄。
/// 先前安装的默认域会被分离；在其上创建的结构仍可继续工作，因为它们持有各自的句柄。
pub fn init(builder: DomainBuilder) -> Domain {
    let domain = builder.build();
    let previous = cell().lock().replace(domain.clone());
    drop(previous);
    domain
}

/// Detach the default domain. The next call to [`domain`] creates a fresh one.
///
/// Returns `true` if a default domain was installed.
///
/// 分离默认域。下一次调用 [`domain`] 会创建一个新的默认域。
/// 如果之前安装了默认域则返回 `true`。
pub fn teardown() -> bool {
    let previous = cell().lock().take();
    let detached = previous.is_some();
    if let Some(domain) = previous {
        domain.cleanup();
    }
    detached
}

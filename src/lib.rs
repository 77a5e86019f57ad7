//! Hazard-pointer memory reclamation, and a lock-free sorted set built on it.
//!
//! A reader publishes the address it is about to dereference in a hazard
//! pointer and re-reads the source to validate it. A writer that unlinks an
//! object retires it into a [`Domain`]; the domain periodically scans every
//! published hazard and reclaims the retired objects nobody protects.
//!
//! - [`HazardPointer`], [`HazardArray`], [`HazardLocal`]: owners of one, `M`,
//!   or `N` thread-cached hazard slots.
//! - [`Domain`] / [`DomainBuilder`]: slot registry, retire lists, reclamation.
//! - [`Retire`] / [`Retireable`] / [`WeakDomain`]: objects that know their domain.
//! - [`SortedSet`]: lock-free ordered set with wait-free lookups.
//! - [`global`]: the process-wide default domain.
//!
//! ```
//! use hazard_set::{Domain, SortedSet};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let set = Arc::new(SortedSet::with_domain(Domain::new()));
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let set = Arc::clone(&set);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 set.add(t * 100 + i);
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! assert_eq!(set.len(), 400);
//! ```
//!
//! 危险指针内存回收，以及在其之上构建的无锁有序集合。
//! 读者在危险指针中发布即将解引用的地址，并重新读取源以进行验证。
//! 断开对象的写者将其退休到 [`Domain`] 中；域定期扫描所有已发布的危险指针，
//! 并回收没有被任何人保护的已退休对象。

mod array;
mod backoff;
mod domain;
mod garbage;
mod holder;
mod list;
mod local;
mod marked;
#[cfg(not(feature = "loom"))]
mod object;
mod state;
mod sync;

#[cfg(not(feature = "loom"))]
pub mod global;

pub use array::{HazardArray, HazardLocal};
pub use domain::{Domain, DomainBuilder};
#[cfg(not(feature = "loom"))]
pub use domain::WeakDomain;
pub use holder::HazardPointer;
pub use list::{Iter, SortedSet};
#[cfg(not(feature = "loom"))]
pub use object::{Retire, Retireable};

#[cfg(all(test, not(feature = "loom")))]
mod tests;

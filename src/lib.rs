//! Coordination primitives for a fixed cohort of threads.
//!
//! This crate provides two independent building blocks:
//!
//! - **Reusable barriers** ([`PhaseBarrier`], [`TurnstileBarrier`]): every member of
//!   a cohort blocks in [`Barrier::wait`] until all of them have arrived, then they
//!   are released together and the barrier is immediately ready for the next round.
//! - **A deadlock-free resource ring** ([`ResourceRing`]): `N` participants in a
//!   cycle, each repeatedly taking its own resource and its neighbour's. The last
//!   participant takes its two resources in reverse order, which rules out a
//!   circular wait (the resource-hierarchy solution to the dining philosophers).
//!
//! Both are plain in-process objects: build one, share it with an `Arc`, and hand it
//! to the participating threads. Nothing is stored in globals, so independent
//! cohorts can coexist.
//!
//! 面向固定线程群体的协调原语。
//!
//! 本 crate 提供两个相互独立的组件：
//! - **可重用屏障**（`PhaseBarrier`、`TurnstileBarrier`）：群体中的每个成员在
//!   `Barrier::wait` 中阻塞，直到所有成员到达，然后一起被释放，屏障立即可用于下一轮。
//! - **无死锁资源环**（`ResourceRing`）：环形排列的 `N` 个参与者，每人反复获取自己的资源
//!   和邻居的资源。最后一位参与者以相反顺序获取两个资源，从而排除循环等待
//!   （哲学家就餐问题的资源分级解法）。
//!
//! # Example
//! ```
//! use cohort_sync::{Barrier, BarrierStrategy};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let barrier: Arc<dyn Barrier> = Arc::from(BarrierStrategy::Turnstile.build(4));
//! let handles: Vec<_> = (0..4)
//!     .map(|_| {
//!         let barrier = Arc::clone(&barrier);
//!         thread::spawn(move || {
//!             for _ in 0..3 {
//!                 barrier.wait();
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! assert_eq!(barrier.phase(), 3);
//! ```

mod barrier;
mod builder;
mod error;
mod resource;
mod ring;
mod semaphore;
mod state;
mod sync;
mod turnstile;

pub use barrier::{Barrier, BarrierStrategy, BarrierWaitResult, PhaseBarrier};
pub use builder::{DurationBounds, RingBuilder};
pub use error::{BoxError, ConfigError, RingError};
pub use resource::HeldPair;
pub use ring::{NoHooks, ResourceRing, RingHooks, acquisition_order};
pub use semaphore::Semaphore;
pub use state::ParticipantState;
pub use turnstile::TurnstileBarrier;

#[cfg(all(test, not(feature = "loom")))]
mod tests;

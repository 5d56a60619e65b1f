use crate::barrier::{Barrier, BarrierWaitResult};
use crate::error::ConfigError;
use crate::semaphore::Semaphore;
use crate::sync::{AtomicUsize, Ordering};

/// Barrier built from an atomic arrival counter and two turnstiles.
///
/// A turnstile is a semaphore used as a gate: each participant takes the
/// single permit and puts it straight back, so once opened, everyone waiting
/// behind it passes exactly once.
///
/// One round runs in two halves:
///
/// 1. **Arrive.** Each participant increments `arrived`. The one that reaches
///    `capacity` closes the exit turnstile and opens the entry turnstile; everyone
///    then passes the entry turnstile.
/// 2. **Depart.** Each participant decrements `arrived`. The one that brings it
///    back to zero closes the entry turnstile and opens the exit turnstile;
///    everyone then passes the exit turnstile.
///
/// The entry turnstile is drained and closed before the exit turnstile opens, and
/// nobody can start the next round before passing the exit turnstile, so a fast
/// participant can never be counted into two rounds at once or slip through a gate
/// still open from the previous round.
///
/// 由原子到达计数器和两个旋转门构成的屏障。
/// 旋转门是一个作为闸门使用的信号量：每个参与者取走唯一的许可并立即归还，
/// 因此一旦打开，排在后面的每个参与者都恰好通过一次。
/// 一轮分两半：
/// 1. **到达**：每个参与者递增 `arrived`，使其达到 `capacity` 的那位关闭出口旋转门并打开入口旋转门；
/// 2. **离开**：每个参与者递减 `arrived`，使其归零的那位关闭入口旋转门并打开出口旋转门。
/// 入口旋转门在出口旋转门打开之前已被关闭，且任何人都必须先通过出口旋转门才能开始下一轮，
/// 因此快速的参与者不会被同时计入两轮。
#[derive(Debug)]
pub struct TurnstileBarrier {
    capacity: usize,
    arrived: AtomicUsize,
    phase: AtomicUsize,
    entry: Semaphore,
    exit: Semaphore,
}

impl TurnstileBarrier {
    /// Create a barrier for `capacity` participants.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity > 0,
            "BUG: barrier capacity must be at least 1. \
             A barrier nobody can complete would block its callers forever."
        );
        Self {
            capacity,
            arrived: AtomicUsize::new(0),
            phase: AtomicUsize::new(0),
            entry: Semaphore::new(0),
            exit: Semaphore::new(1),
        }
    }

    /// Create a barrier, reporting a zero capacity as [`ConfigError::ZeroCapacity`].
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self::new(capacity))
    }

    #[inline]
    fn pass(gate: &Semaphore) {
        gate.acquire();
        gate.release();
    }
}

impl Barrier for TurnstileBarrier {
    #[inline]
    fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn phase(&self) -> usize {
        self.phase.load(Ordering::Acquire)
    }

    fn wait(&self) -> BarrierWaitResult {
        // Stable until this round's leader advances it, which happens only
        // after our own increment below.
        let arrival_phase = self.phase.load(Ordering::Acquire);

        let leader = self.arrived.fetch_add(1, Ordering::AcqRel) + 1 == self.capacity;
        if leader {
            self.exit.acquire();
            self.phase.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(phase = arrival_phase, capacity = self.capacity, "turnstile opened");
            self.entry.release();
        }
        Self::pass(&self.entry);

        if self.arrived.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.entry.acquire();
            self.exit.release();
        }
        Self::pass(&self.exit);

        BarrierWaitResult::new(arrival_phase, leader)
    }
}

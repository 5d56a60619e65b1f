use crate::error::ConfigError;
use crate::sync::{Condvar, Mutex};
use crate::turnstile::TurnstileBarrier;
use std::fmt;

/// A reusable rendezvous point for a fixed cohort of participants.
///
/// Every call to [`wait`](Barrier::wait) blocks until `capacity` calls have been
/// made in the current phase; then all of them return together and the barrier is
/// immediately ready for the next phase. The same participants can cross it any
/// number of times without rebuilding it.
///
/// **Capacity contract**: the number of threads calling `wait` each round must be
/// exactly `capacity`. Fewer callers block forever; this is a caller bug and is
/// not detected.
///
/// 供固定参与者群体使用的可重用汇合点。
/// 每次调用 `wait` 都会阻塞，直到当前阶段累计 `capacity` 次调用；
/// 随后所有调用者一起返回，屏障立即可用于下一阶段，无需重建。
/// **容量约定**：每轮调用 `wait` 的线程数必须恰好等于 `capacity`，
/// 少于该数量会永久阻塞，这属于调用方错误，不会被检测。
pub trait Barrier: Send + Sync {
    /// Cohort size fixed at construction.
    /// 构造时确定的群体大小。
    fn capacity(&self) -> usize;

    /// Number of fully completed rounds.
    /// 已完整结束的轮数。
    fn phase(&self) -> usize;

    /// Block until the whole cohort has arrived in the current phase.
    /// 阻塞直到整个群体在当前阶段全部到达。
    fn wait(&self) -> BarrierWaitResult;
}

/// Outcome of one [`Barrier::wait`] call.
///
/// 一次 `Barrier::wait` 调用的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    phase: usize,
    leader: bool,
}

impl BarrierWaitResult {
    #[inline]
    pub(crate) fn new(phase: usize, leader: bool) -> Self {
        Self { phase, leader }
    }

    /// The round this call was released from, counting from 0.
    #[inline]
    pub fn phase(&self) -> usize {
        self.phase
    }

    /// `true` for exactly one participant per round: the one whose arrival
    /// completed the cohort and released the others.
    #[inline]
    pub fn is_leader(&self) -> bool {
        self.leader
    }
}

/// Selects one of the two barrier implementations at runtime.
///
/// 在运行时选择两种屏障实现之一。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarrierStrategy {
    /// [`PhaseBarrier`]: mutex-guarded phase counter with condition wait.
    #[default]
    Phase,
    /// [`TurnstileBarrier`]: atomic arrival counter with two turnstiles.
    Turnstile,
}

impl BarrierStrategy {
    /// Build a barrier of this strategy for `capacity` participants.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn build(self, capacity: usize) -> Box<dyn Barrier> {
        match self {
            BarrierStrategy::Phase => Box::new(PhaseBarrier::new(capacity)),
            BarrierStrategy::Turnstile => Box::new(TurnstileBarrier::new(capacity)),
        }
    }

    /// Like [`build`](Self::build) but reports a zero capacity as an error.
    pub fn try_build(self, capacity: usize) -> Result<Box<dyn Barrier>, ConfigError> {
        let barrier: Box<dyn Barrier> = match self {
            BarrierStrategy::Phase => Box::new(PhaseBarrier::try_new(capacity)?),
            BarrierStrategy::Turnstile => Box::new(TurnstileBarrier::try_new(capacity)?),
        };
        Ok(barrier)
    }
}

#[derive(Debug)]
struct PhaseState {
    arrived: usize,
    phase: usize,
}

/// Barrier built from a mutex-guarded `(arrived, phase)` pair and a condition variable.
///
/// The last arrival of a round resets `arrived` to zero and advances `phase`
/// in the same critical section, then wakes everybody. Waiters remember the
/// phase they arrived in and keep waiting until `phase` has moved past it, so
/// a spurious wake-up, or an arrival belonging to the next round, can never
/// be mistaken for their own release.
///
/// # Example
/// ```
/// use cohort_sync::{Barrier, PhaseBarrier};
/// use std::sync::Arc;
/// use std::thread;
///
/// let barrier = Arc::new(PhaseBarrier::new(3));
/// let handles: Vec<_> = (0..3)
///     .map(|_| {
///         let barrier = Arc::clone(&barrier);
///         thread::spawn(move || {
///             barrier.wait();
///             barrier.wait();
///         })
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(barrier.phase(), 2);
/// ```
///
/// 由互斥保护的 `(arrived, phase)` 对和条件变量构成的屏障。
/// 每轮最后到达者在同一临界区内把 `arrived` 归零并推进 `phase`，然后唤醒所有人。
/// 等待者记住自己到达时的阶段，直到 `phase` 超过它才继续，
/// 因此虚假唤醒或下一轮的到达都不会被误认为是本轮的释放。
pub struct PhaseBarrier {
    capacity: usize,
    state: Mutex<PhaseState>,
    released: Condvar,
}

impl PhaseBarrier {
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
            state: Mutex::new(PhaseState {
                arrived: 0,
                phase: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Create a barrier, reporting a zero capacity as [`ConfigError::ZeroCapacity`].
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self::new(capacity))
    }

    /// Participants that have arrived in the current, unfinished phase.
    pub fn arrived(&self) -> usize {
        self.state.lock().arrived
    }
}

impl Barrier for PhaseBarrier {
    #[inline]
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn phase(&self) -> usize {
        self.state.lock().phase
    }

    fn wait(&self) -> BarrierWaitResult {
        let mut state = self.state.lock();
        let arrival_phase = state.phase;
        state.arrived += 1;

        if state.arrived == self.capacity {
            state.arrived = 0;
            state.phase = state.phase.wrapping_add(1);
            drop(state);
            tracing::debug!(phase = arrival_phase, capacity = self.capacity, "barrier phase complete");
            self.released.notify_all();
            return BarrierWaitResult::new(arrival_phase, true);
        }

        while state.phase == arrival_phase {
            state = self.released.wait(state);
        }
        BarrierWaitResult::new(arrival_phase, false)
    }
}

impl fmt::Debug for PhaseBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PhaseBarrier")
            .field("capacity", &self.capacity)
            .field("arrived", &state.arrived)
            .field("phase", &state.phase)
            .finish()
    }
}

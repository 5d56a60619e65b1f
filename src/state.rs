use crate::sync::{AtomicU8, Ordering};
use std::fmt;
use std::time::{Duration, Instant};

/// Marks a resource that no participant currently holds.
/// 表示当前没有任何参与者持有的资源。
pub(crate) const NO_HOLDER: usize = usize::MAX;

/// Default cohort size of a ring built without overrides.
/// 未覆盖配置时环的默认参与者数量。
pub(crate) const DEFAULT_PARTICIPANTS: usize = 5;

/// Default number of think/hold rounds per participant.
/// 每个参与者默认的 思考/持有 轮数。
pub(crate) const DEFAULT_ITERATIONS: usize = 5;

/// Default upper bound of the think activity, in milliseconds.
pub(crate) const DEFAULT_THINK_MAX_MS: u64 = 3;

/// Default upper bound of the hold activity, in milliseconds.
pub(crate) const DEFAULT_HOLD_MAX_MS: u64 = 5;

/// Instant `timeout` from now, or `None` when that lies beyond what `Instant`
/// can represent. Callers treat `None` as "wait without a deadline".
#[inline]
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Where a ring participant currently is in its round.
///
/// Each round moves `Thinking -> Acquiring -> Holding -> Releasing` and
/// then back to `Thinking`; after the last round the participant is
/// `Terminated`. A participant that was never run stays `Idle`.
///
/// 环中参与者在当前轮次所处的阶段。
/// 每轮按 `Thinking -> Acquiring -> Holding -> Releasing` 推进，
/// 然后回到 `Thinking`；最后一轮结束后参与者变为 `Terminated`。
/// 从未运行过的参与者保持 `Idle`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParticipantState {
    Idle = 0,
    Thinking = 1,
    Acquiring = 2,
    Holding = 3,
    Releasing = 4,
    Terminated = 5,
}

impl ParticipantState {
    #[inline]
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ParticipantState::Idle,
            1 => ParticipantState::Thinking,
            2 => ParticipantState::Acquiring,
            3 => ParticipantState::Holding,
            4 => ParticipantState::Releasing,
            5 => ParticipantState::Terminated,
            other => unreachable!("BUG: invalid participant state byte {other}"),
        }
    }
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParticipantState::Idle => "idle",
            ParticipantState::Thinking => "thinking",
            ParticipantState::Acquiring => "acquiring",
            ParticipantState::Holding => "holding",
            ParticipantState::Releasing => "releasing",
            ParticipantState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Per-participant state cell, readable from any thread.
///
/// Cache-aligned so neighbouring participants do not false-share.
///
/// 每个参与者的状态单元，可被任意线程读取。
/// 缓存对齐以防止相邻参与者之间的伪共享。
#[derive(Debug)]
#[repr(align(64))]
pub(crate) struct StateSlot {
    raw: AtomicU8,
}

impl StateSlot {
    pub(crate) fn new() -> Self {
        Self {
            raw: AtomicU8::new(ParticipantState::Idle as u8),
        }
    }

    #[inline]
    pub(crate) fn load(&self) -> ParticipantState {
        ParticipantState::from_u8(self.raw.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn store(&self, state: ParticipantState) {
        self.raw.store(state as u8, Ordering::Release);
    }
}

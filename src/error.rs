use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by user-supplied ring hooks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Rejected construction parameters.
///
/// 被拒绝的构造参数。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A barrier needs at least one participant per round.
    #[error("barrier capacity must be at least 1")]
    ZeroCapacity,

    /// A ring needs two participants so every participant has a neighbour.
    #[error("a resource ring needs at least 2 participants, got {participants}")]
    TooFewParticipants { participants: usize },

    /// Every participant must run at least one round.
    #[error("iteration count must be at least 1")]
    ZeroIterations,

    /// Activity bounds where the lower bound exceeds the upper bound.
    #[error("activity duration bounds are inverted: min {min:?} > max {max:?}")]
    InvalidBounds { min: Duration, max: Duration },
}

/// Failures surfaced by a ring participant.
///
/// Whatever the variant, the participant has already given back every
/// resource it held when the error reaches the caller.
///
/// 环参与者报告的失败。
/// 无论哪种情况，错误返回给调用者时，该参与者持有的资源都已释放。
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RingError {
    /// The index does not name a participant of this ring.
    /// 索引不属于该环中的任何参与者。
    #[error("participant {participant} is out of range for a ring of {participants}")]
    ParticipantOutOfRange {
        participant: usize,
        participants: usize,
    },

    /// `run` was called a second time for the same participant.
    /// 同一参与者的 `run` 被第二次调用。
    #[error("participant {participant} has already been started")]
    AlreadyStarted { participant: usize },

    /// `resource` could not be taken before the deadline expired.
    /// 在截止时间之前未能获取 `resource`。
    #[error("participant {participant} timed out after {timeout:?} waiting for resource {resource}")]
    AcquireTimeout {
        participant: usize,
        resource: usize,
        timeout: Duration,
    },

    /// The hold hook returned an error; `source` carries it.
    /// 持有阶段的回调返回了错误，`source` 为其原因。
    #[error("participant {participant} failed while holding its resources in iteration {iteration}")]
    HoldFailed {
        participant: usize,
        iteration: usize,
        #[source]
        source: BoxError,
    },

    /// The participant's thread panicked; reported by `run_all`.
    /// 参与者线程发生 panic，由 `run_all` 报告。
    #[error("participant {participant} panicked")]
    ParticipantPanicked { participant: usize },
}

impl RingError {
    /// Index of the participant the error belongs to.
    pub fn participant(&self) -> usize {
        match self {
            RingError::ParticipantOutOfRange { participant, .. }
            | RingError::AlreadyStarted { participant }
            | RingError::AcquireTimeout { participant, .. }
            | RingError::HoldFailed { participant, .. }
            | RingError::ParticipantPanicked { participant } => *participant,
        }
    }
}

use crate::error::ConfigError;
use crate::ring::{NoHooks, ResourceRing, RingHooks};
use crate::state::{DEFAULT_HOLD_MAX_MS, DEFAULT_ITERATIONS, DEFAULT_PARTICIPANTS, DEFAULT_THINK_MAX_MS};
use rand::Rng;
use std::time::Duration;

/// Inclusive range a simulated activity's length is drawn from.
///
/// 模拟活动时长的闭区间取值范围。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationBounds {
    min: Duration,
    max: Duration,
}

impl DurationBounds {
    /// Create bounds, rejecting `min > max`.
    /// 创建取值范围，`min > max` 时返回错误。
    pub fn new(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    /// Shortest duration that can be drawn.
    /// 可抽取的最短时长。
    #[inline]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Longest duration that can be drawn.
    /// 可抽取的最长时长。
    #[inline]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a uniformly distributed duration within the bounds.
    pub(crate) fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::rng().random_range(self.min..=self.max)
    }
}

/// Builder for configuring a [`ResourceRing`].
///
/// - `participants`: ring size, also the number of resources (default `5`, minimum `2`)
/// - `iterations`: think/hold rounds each participant runs (default `5`, minimum `1`)
/// - `think_time` / `hold_time`: bounds of the randomized activities
///   (defaults `0..=3ms` and `0..=5ms`)
/// - `acquire_timeout`: optional deadline for taking both resources in a round
/// - `hooks`: instrumentation and hold-activity callbacks
///
/// # Example
/// ```
/// use cohort_sync::ResourceRing;
/// use std::time::Duration;
///
/// let ring = ResourceRing::builder()
///     .participants(5)
///     .iterations(5)
///     .think_time(Duration::ZERO, Duration::from_millis(1))
///     .hold_time(Duration::ZERO, Duration::from_millis(1))
///     .build()
///     .unwrap();
/// assert_eq!(ring.participants(), 5);
/// ```
///
/// 用于配置 `ResourceRing` 的构建器。
pub struct RingBuilder {
    participants: usize,
    iterations: usize,
    think: (Duration, Duration),
    hold: (Duration, Duration),
    acquire_timeout: Option<Duration>,
    hooks: Box<dyn RingHooks>,
}

impl RingBuilder {
    /// Create a new builder with default settings.
    /// 创建一个带有默认设置的新构建器。
    #[inline]
    pub fn new() -> Self {
        Self {
            participants: DEFAULT_PARTICIPANTS,
            iterations: DEFAULT_ITERATIONS,
            think: (Duration::ZERO, Duration::from_millis(DEFAULT_THINK_MAX_MS)),
            hold: (Duration::ZERO, Duration::from_millis(DEFAULT_HOLD_MAX_MS)),
            acquire_timeout: None,
            hooks: Box::new(NoHooks),
        }
    }

    /// Set the number of participants (and resources).
    /// 设置参与者（以及资源）的数量。
    #[inline]
    pub fn participants(mut self, participants: usize) -> Self {
        self.participants = participants;
        self
    }

    /// Set how many rounds each participant runs.
    /// 设置每个参与者运行的轮数。
    #[inline]
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the bounds of the think activity. `min > max` is rejected by
    /// [`build`](Self::build).
    #[inline]
    pub fn think_time(mut self, min: Duration, max: Duration) -> Self {
        self.think = (min, max);
        self
    }

    /// Set the bounds of the hold activity. `min > max` is rejected by
    /// [`build`](Self::build).
    #[inline]
    pub fn hold_time(mut self, min: Duration, max: Duration) -> Self {
        self.hold = (min, max);
        self
    }

    /// Bound how long a participant may wait for its two resources in one round.
    ///
    /// On expiry the participant gives back whatever it already holds and
    /// [`ResourceRing::run`] returns [`RingError::AcquireTimeout`](crate::RingError::AcquireTimeout).
    /// Pass `None` to wait indefinitely (the default).
    #[inline]
    pub fn acquire_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.acquire_timeout = timeout.into();
        self
    }

    /// Install hooks that observe acquisitions and run during the hold activity.
    #[inline]
    pub fn hooks(mut self, hooks: impl RingHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Validate the configuration and build the ring with every resource free.
    ///
    /// 校验配置并构建所有资源均空闲的环。
    pub fn build(self) -> Result<ResourceRing, ConfigError> {
        if self.participants < 2 {
            return Err(ConfigError::TooFewParticipants {
                participants: self.participants,
            });
        }
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        let think = DurationBounds::new(self.think.0, self.think.1)?;
        let hold = DurationBounds::new(self.hold.0, self.hold.1)?;

        Ok(ResourceRing::from_parts(
            self.participants,
            self.iterations,
            think,
            hold,
            self.acquire_timeout,
            self.hooks,
        ))
    }
}

impl Default for RingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

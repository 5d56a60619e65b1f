use crate::builder::{DurationBounds, RingBuilder};
use crate::error::{BoxError, RingError};
use crate::resource::{HeldPair, Resource};
use crate::state::{ParticipantState, StateSlot, deadline_after};
use crate::sync::{AtomicBool, AtomicUsize, Condvar, Mutex, Ordering};
use std::fmt;
use std::time::{Duration, Instant};

/// Callbacks a [`ResourceRing`] invokes while its participants run.
///
/// Every method has a no-op default. Hooks run on the participant's own thread.
/// `acquired` fires right after a resource is taken and `releasing` right before it
/// is given back, so between the two the hook may treat the participant as the
/// resource's sole owner.
///
/// `releasing` also runs while unwinding from a panicking participant. A panic
/// inside `releasing` never keeps the resource held: the resource is given
/// back regardless and the panic propagates afterwards, or is logged and
/// dropped if the thread is already unwinding.
///
/// 环在参与者运行期间调用的回调。
/// 所有方法都有空的默认实现，回调在参与者自己的线程上执行。
/// `acquired` 在获取资源之后立即触发，`releasing` 在归还之前触发，
/// 两者之间回调可以认为该参与者是资源的唯一持有者。
pub trait RingHooks: Send + Sync {
    /// `participant` now holds `resource`.
    fn acquired(&self, participant: usize, resource: usize) {
        let _ = (participant, resource);
    }

    /// `participant` is about to give back `resource`.
    fn releasing(&self, participant: usize, resource: usize) {
        let _ = (participant, resource);
    }

    /// Runs at the start of the hold activity, with both resources held.
    ///
    /// An error ends the participant's run: both resources are given back and
    /// [`ResourceRing::run`] returns [`RingError::HoldFailed`].
    fn hold(&self, participant: usize, iteration: usize) -> Result<(), BoxError> {
        let _ = (participant, iteration);
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl RingHooks for NoHooks {}

impl<T: RingHooks + ?Sized> RingHooks for std::sync::Arc<T> {
    fn acquired(&self, participant: usize, resource: usize) {
        (**self).acquired(participant, resource)
    }

    fn releasing(&self, participant: usize, resource: usize) {
        (**self).releasing(participant, resource)
    }

    fn hold(&self, participant: usize, iteration: usize) -> Result<(), BoxError> {
        (**self).hold(participant, iteration)
    }
}

/// The order in which `participant` takes its two resources in a ring of
/// `participants`.
///
/// Participant `i` needs resources `i` and `(i + 1) % participants`. Everyone
/// takes the lower slot `i` first, except the last participant, which takes
/// resource `0` first and its own slot second. That single reversal means
/// resources are always taken in increasing index order, so no cycle of
/// participants each holding one resource and waiting for the next can form.
///
/// ```
/// use cohort_sync::acquisition_order;
///
/// assert_eq!(acquisition_order(0, 5), [0, 1]);
/// assert_eq!(acquisition_order(3, 5), [3, 4]);
/// assert_eq!(acquisition_order(4, 5), [0, 4]);
/// ```
///
/// # Panics
///
/// Panics if `participant >= participants`.
///
/// 在大小为 `participants` 的环中，`participant` 获取两个资源的顺序。
/// 除最后一位参与者外，所有人先取自己的槽位 `i`；最后一位先取资源 `0`，再取自己的槽位。
/// 这一次反转使资源总是按索引递增顺序被获取，因此不会形成循环等待。
pub fn acquisition_order(participant: usize, participants: usize) -> [usize; 2] {
    assert!(
        participant < participants,
        "participant {participant} is out of range for a ring of {participants}"
    );
    let own = participant;
    let next = (participant + 1) % participants;
    if participant == participants - 1 {
        [next, own]
    } else {
        [own, next]
    }
}

/// Tracks how many participants have finished, for `await_all_participants`.
struct Completion {
    finished: Mutex<usize>,
    all_done: Condvar,
}

/// Marks the participant terminated and counts it as finished on every exit
/// path, including unwinding.
struct FinishGuard<'ring> {
    ring: &'ring ResourceRing,
    participant: usize,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.ring.states[self.participant].store(ParticipantState::Terminated);
        let mut finished = self.ring.completion.finished.lock();
        *finished += 1;
        drop(finished);
        self.ring.completion.all_done.notify_all();
    }
}

/// `N` participants in a cycle, each needing its own resource and its
/// neighbour's, with deadlock-free acquisition.
///
/// Participant `i` repeatedly thinks for a random time, takes resources `i` and
/// `(i + 1) % N` in the order given by [`acquisition_order`], holds them for a
/// random time and gives both back. This is the dining philosophers problem with
/// the resource-hierarchy solution.
///
/// The ring is shared by reference (typically through an `Arc`) and
/// [`run`](Self::run) is called once per participant index, each on its own thread.
///
/// **Liveness**: no participant set can deadlock, but an unlucky participant may
/// be overtaken by its neighbours arbitrarily often under adversarial scheduling.
/// Starvation freedom is not guaranteed.
///
/// # Example
/// ```
/// use cohort_sync::ResourceRing;
/// use std::sync::Arc;
/// use std::thread;
/// use std::time::Duration;
///
/// let ring = Arc::new(
///     ResourceRing::builder()
///         .participants(5)
///         .iterations(5)
///         .think_time(Duration::ZERO, Duration::ZERO)
///         .hold_time(Duration::ZERO, Duration::from_micros(200))
///         .build()
///         .unwrap(),
/// );
///
/// for participant in 0..ring.participants() {
///     let ring = Arc::clone(&ring);
///     thread::spawn(move || ring.run(participant));
/// }
///
/// ring.await_all_participants();
/// assert_eq!(ring.holds_completed(), 25);
/// ```
///
/// 环形排列的 `N` 个参与者，每人需要自己的资源和邻居的资源，并以无死锁的方式获取。
/// 参与者 `i` 反复地：随机思考一段时间，按 `acquisition_order` 给出的顺序获取资源 `i` 和
/// `(i + 1) % N`，随机持有一段时间，然后归还两者。
/// **活性**：不会发生死锁，但在对抗性调度下，个别参与者可能被邻居反复抢先，不保证无饥饿。
pub struct ResourceRing {
    resources: Box<[Resource]>,
    states: Box<[StateSlot]>,
    started: Box<[AtomicBool]>,
    iterations: usize,
    think: DurationBounds,
    hold: DurationBounds,
    acquire_timeout: Option<Duration>,
    hooks: Box<dyn RingHooks>,
    holds_completed: AtomicUsize,
    completion: Completion,
}

impl ResourceRing {
    /// Create a builder for configuring a ring.
    #[inline]
    pub fn builder() -> RingBuilder {
        RingBuilder::new()
    }

    pub(crate) fn from_parts(
        participants: usize,
        iterations: usize,
        think: DurationBounds,
        hold: DurationBounds,
        acquire_timeout: Option<Duration>,
        hooks: Box<dyn RingHooks>,
    ) -> Self {
        Self {
            resources: (0..participants).map(|_| Resource::new()).collect(),
            states: (0..participants).map(|_| StateSlot::new()).collect(),
            started: (0..participants).map(|_| AtomicBool::new(false)).collect(),
            iterations,
            think,
            hold,
            acquire_timeout,
            hooks,
            holds_completed: AtomicUsize::new(0),
            completion: Completion {
                finished: Mutex::new(0),
                all_done: Condvar::new(),
            },
        }
    }

    /// Number of participants, equal to the number of resources.
    #[inline]
    pub fn participants(&self) -> usize {
        self.resources.len()
    }

    /// Rounds each participant runs.
    #[inline]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Bounds the think activity's length is drawn from.
    #[inline]
    pub fn think_time(&self) -> DurationBounds {
        self.think
    }

    /// Bounds the hold activity's length is drawn from.
    #[inline]
    pub fn hold_time(&self) -> DurationBounds {
        self.hold
    }

    /// Current state of `participant`.
    ///
    /// # Panics
    ///
    /// Panics if `participant` is out of range.
    pub fn state(&self, participant: usize) -> ParticipantState {
        self.states[participant].load()
    }

    /// Participant currently holding `resource`, or `None` if it is free.
    ///
    /// # Panics
    ///
    /// Panics if `resource` is out of range.
    pub fn holder(&self, resource: usize) -> Option<usize> {
        self.resources[resource].holder()
    }

    /// Hold activities completed so far, across all participants.
    pub fn holds_completed(&self) -> usize {
        self.holds_completed.load(Ordering::Acquire)
    }

    /// Participants whose run has ended, successfully or not.
    pub fn finished_participants(&self) -> usize {
        *self.completion.finished.lock()
    }

    fn check_index(&self, participant: usize) -> Result<(), RingError> {
        if participant >= self.participants() {
            return Err(RingError::ParticipantOutOfRange {
                participant,
                participants: self.participants(),
            });
        }
        Ok(())
    }

    /// Take both resources `participant` needs, blocking until they are free.
    ///
    /// The resources are given back when the returned [`HeldPair`] is dropped.
    pub fn acquire_both(&self, participant: usize) -> Result<HeldPair<'_>, RingError> {
        self.check_index(participant)?;
        let order = acquisition_order(participant, self.participants());
        let mut pair = HeldPair::empty(&self.resources, self.hooks.as_ref(), participant, order);
        for _ in 0..2 {
            self.resources[pair.next()].acquire(participant);
            pair.push_next();
        }
        Ok(pair)
    }

    /// Take both resources `participant` needs, giving up after `timeout`.
    ///
    /// The deadline covers both acquisitions together. On expiry any resource
    /// already taken is given back before the error is returned. A timeout too
    /// large to form a deadline waits like [`acquire_both`](Self::acquire_both).
    pub fn acquire_both_timeout(
        &self,
        participant: usize,
        timeout: Duration,
    ) -> Result<HeldPair<'_>, RingError> {
        self.check_index(participant)?;
        let Some(deadline) = deadline_after(timeout) else {
            return self.acquire_both(participant);
        };
        let order = acquisition_order(participant, self.participants());
        let mut pair = HeldPair::empty(&self.resources, self.hooks.as_ref(), participant, order);
        for _ in 0..2 {
            let resource = pair.next();
            if !self.resources[resource].acquire_until(participant, deadline) {
                tracing::warn!(participant, resource, ?timeout, "timed out acquiring resource");
                return Err(RingError::AcquireTimeout {
                    participant,
                    resource,
                    timeout,
                });
            }
            pair.push_next();
        }
        Ok(pair)
    }

    /// Run the full think/acquire/hold/release loop for `participant`.
    ///
    /// Meant to be called exactly once per participant index, each on its own
    /// thread. Returns once all rounds are done or the first failure occurs; in
    /// both cases the participant holds nothing when this returns and counts as
    /// finished for [`await_all_participants`](Self::await_all_participants).
    ///
    /// 为 `participant` 执行完整的 思考/获取/持有/释放 循环。
    /// 每个参与者索引只应调用一次，并各自在独立线程上运行。
    /// 无论正常结束还是中途失败，返回时该参与者都不再持有任何资源。
    pub fn run(&self, participant: usize) -> Result<(), RingError> {
        self.check_index(participant)?;
        if self.started[participant].swap(true, Ordering::AcqRel) {
            return Err(RingError::AlreadyStarted { participant });
        }
        let _finish = FinishGuard {
            ring: self,
            participant,
        };

        let span = tracing::debug_span!("participant", participant);
        let _entered = span.enter();
        tracing::debug!(iterations = self.iterations, "participant started");

        let slot = &self.states[participant];
        for iteration in 0..self.iterations {
            slot.store(ParticipantState::Thinking);
            pause(self.think.sample());

            slot.store(ParticipantState::Acquiring);
            let pair = match self.acquire_timeout {
                Some(timeout) => self.acquire_both_timeout(participant, timeout)?,
                None => self.acquire_both(participant)?,
            };

            slot.store(ParticipantState::Holding);
            if let Err(source) = self.hooks.hold(participant, iteration) {
                slot.store(ParticipantState::Releasing);
                drop(pair);
                tracing::warn!(iteration, error = %source, "hold activity failed");
                return Err(RingError::HoldFailed {
                    participant,
                    iteration,
                    source,
                });
            }
            pause(self.hold.sample());
            self.holds_completed.fetch_add(1, Ordering::AcqRel);

            slot.store(ParticipantState::Releasing);
            drop(pair);
        }

        tracing::debug!("participant finished");
        Ok(())
    }

    /// Block until every participant's run has ended.
    ///
    /// A participant index that is never run keeps this blocked forever.
    pub fn await_all_participants(&self) {
        let mut finished = self.completion.finished.lock();
        while *finished < self.participants() {
            finished = self.completion.all_done.wait(finished);
        }
    }

    /// Like [`await_all_participants`](Self::await_all_participants) but gives
    /// up after `timeout`. Returns `true` if every participant finished in time.
    pub fn await_all_participants_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = deadline_after(timeout) else {
            self.await_all_participants();
            return true;
        };
        let mut finished = self.completion.finished.lock();
        while *finished < self.participants() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self.completion.all_done.wait_timeout(finished, deadline - now);
            finished = guard;
            if result.timed_out() && *finished < self.participants() {
                return false;
            }
        }
        true
    }

    /// Run every participant on its own scoped thread and wait for all of them.
    ///
    /// Returns the error of the lowest-indexed participant that failed, if any.
    #[cfg(not(feature = "loom"))]
    pub fn run_all(&self) -> Result<(), RingError> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.participants())
                .map(|participant| (participant, scope.spawn(move || self.run(participant))))
                .collect();

            let mut first_error = None;
            for (participant, handle) in handles {
                let outcome = handle
                    .join()
                    .unwrap_or(Err(RingError::ParticipantPanicked { participant }));
                if let Err(err) = outcome {
                    first_error.get_or_insert(err);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }
}

impl fmt::Debug for ResourceRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRing")
            .field("participants", &self.participants())
            .field("iterations", &self.iterations)
            .field("think", &self.think)
            .field("hold", &self.hold)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("holds_completed", &self.holds_completed())
            .finish_non_exhaustive()
    }
}

#[inline]
fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

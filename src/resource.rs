use crate::ring::RingHooks;
use crate::state::NO_HOLDER;
use crate::sync::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Instant;

/// A single-holder lock that remembers which participant holds it.
///
/// Ownership is tracked inside the lock itself, so handing a resource to a second
/// participant while the first still holds it is impossible rather than merely
/// unobserved, and giving back a resource you do not hold is caught as a bug.
pub(crate) struct Resource {
    holder: Mutex<usize>,
    freed: Condvar,
}

impl Resource {
    pub(crate) fn new() -> Self {
        Self {
            holder: Mutex::new(NO_HOLDER),
            freed: Condvar::new(),
        }
    }

    /// Block until the resource is free, then take it for `participant`.
    pub(crate) fn acquire(&self, participant: usize) {
        let mut holder = self.holder.lock();
        while *holder != NO_HOLDER {
            holder = self.freed.wait(holder);
        }
        *holder = participant;
    }

    /// Like [`acquire`](Self::acquire) but gives up at `deadline`.
    ///
    /// Returns `false`, without taking the resource, if the deadline passed first.
    pub(crate) fn acquire_until(&self, participant: usize, deadline: Instant) -> bool {
        let mut holder = self.holder.lock();
        while *holder != NO_HOLDER {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self.freed.wait_timeout(holder, deadline - now);
            holder = guard;
            if result.timed_out() && *holder != NO_HOLDER {
                return false;
            }
        }
        *holder = participant;
        true
    }

    /// Give the resource back and wake one waiter.
    ///
    /// # Panics
    ///
    /// Panics if `participant` is not the current holder.
    pub(crate) fn release(&self, participant: usize) {
        let mut holder = self.holder.lock();
        assert!(
            *holder == participant,
            "BUG: participant {participant} released a resource held by {}",
            describe_holder(*holder)
        );
        *holder = NO_HOLDER;
        drop(holder);
        self.freed.notify_one();
    }

    /// Current holder, or `None` when free.
    pub(crate) fn holder(&self) -> Option<usize> {
        let holder = *self.holder.lock();
        (holder != NO_HOLDER).then_some(holder)
    }
}

fn describe_holder(holder: usize) -> String {
    if holder == NO_HOLDER {
        "nobody".to_string()
    } else {
        format!("participant {holder}")
    }
}

/// Resources held by one participant, released when dropped.
///
/// Dropping happens on every exit path, including early returns and
/// unwinding, so a participant can never leave the ring still holding a
/// resource. Resources are given back in the reverse of the order they were
/// taken. A [`RingHooks::releasing`] hook that panics does not stop the
/// release; its panic is resumed once both resources are free.
///
/// 一个参与者持有的资源，在 drop 时释放。
/// drop 会在所有退出路径上发生（包括提前返回和栈展开），
/// 因此参与者离开环时绝不会仍持有资源。资源按获取的逆序归还。
#[must_use = "dropping a HeldPair immediately releases its resources"]
pub struct HeldPair<'ring> {
    resources: &'ring [Resource],
    hooks: &'ring dyn RingHooks,
    participant: usize,
    // Indices in acquisition order; only the first `len` are held.
    order: [usize; 2],
    len: usize,
}

impl<'ring> HeldPair<'ring> {
    pub(crate) fn empty(
        resources: &'ring [Resource],
        hooks: &'ring dyn RingHooks,
        participant: usize,
        order: [usize; 2],
    ) -> Self {
        Self {
            resources,
            hooks,
            participant,
            order,
            len: 0,
        }
    }

    /// Record that the next resource in acquisition order is now held.
    #[inline]
    pub(crate) fn push_next(&mut self) {
        debug_assert!(self.len < 2);
        let index = self.order[self.len];
        self.len += 1;
        tracing::trace!(participant = self.participant, resource = index, "acquired resource");
        self.hooks.acquired(self.participant, index);
    }

    /// Index of the next resource to take.
    #[inline]
    pub(crate) fn next(&self) -> usize {
        self.order[self.len]
    }

    /// Participant holding the pair.
    #[inline]
    pub fn participant(&self) -> usize {
        self.participant
    }

    /// Resource indices currently held, in acquisition order.
    #[inline]
    pub fn held(&self) -> &[usize] {
        &self.order[..self.len]
    }
}

impl Drop for HeldPair<'_> {
    fn drop(&mut self) {
        // A panicking `releasing` hook must not leave a resource held: every
        // resource is released first and the hook's panic resumes afterwards.
        let mut hook_panic = None;
        while self.len > 0 {
            self.len -= 1;
            let index = self.order[self.len];
            tracing::trace!(participant = self.participant, resource = index, "releasing resource");
            let hooks = self.hooks;
            let participant = self.participant;
            if let Err(payload) =
                panic::catch_unwind(AssertUnwindSafe(|| hooks.releasing(participant, index)))
            {
                hook_panic.get_or_insert(payload);
            }
            self.resources[index].release(self.participant);
        }

        if let Some(payload) = hook_panic {
            if thread::panicking() {
                tracing::error!(participant = self.participant, "releasing hook panicked during unwinding");
            } else {
                panic::resume_unwind(payload);
            }
        }
    }
}

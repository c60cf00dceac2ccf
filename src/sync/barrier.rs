use super::waker_set::{WaitKey, WakerSet};
use futures::FutureExt;
use std::future::{Future, poll_fn};
use std::sync::Mutex;
use std::task::{Context, Poll};

struct State {
    arrived: usize,
    generation: u64,
    wakers: WakerSet,
}

/// Cyclic rendezvous point for a fixed number of participants. Releases all
/// of them together once the last one arrives, then resets for reuse.
///
/// There is no timeout or cancellation: a participant that never arrives
/// blocks all others in that round. Dropping a pending [`wait`](Barrier::wait)
/// future does not undo its arrival.
pub struct Barrier {
    capacity: usize,
    state: Mutex<State>,
}

/// Returned by [`Barrier::wait`] once the round trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    is_leader: bool,
}

impl BarrierWaitResult {
    /// True for exactly one participant per round: the one whose arrival
    /// tripped the barrier.
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

struct Arrival {
    generation: u64,
    slot: Option<WaitKey>,
}

impl Barrier {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "zero capacity barrier is not allowed");
        Self {
            capacity,
            state: Mutex::new(State {
                arrived: 0,
                generation: 0,
                wakers: WakerSet::default(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Arrives at the barrier and waits until `capacity` participants have
    /// arrived in the current round.
    pub fn wait(&self) -> impl Future<Output = BarrierWaitResult> + '_ {
        let mut arrival: Option<Arrival> = None;
        poll_fn(move |cx| self.poll_wait(cx, &mut arrival))
            .map(|is_leader| BarrierWaitResult { is_leader })
    }

    fn poll_wait(&self, cx: &mut Context<'_>, arrival: &mut Option<Arrival>) -> Poll<bool> {
        let mut state = self.state.lock().expect("barrier state poisoned");
        match arrival {
            None => {
                state.arrived += 1;
                if state.arrived == self.capacity {
                    // reset and broadcast atomically under the lock, so woken
                    // waiters need no recheck beyond the generation comparison
                    state.arrived = 0;
                    state.generation = state.generation.wrapping_add(1);
                    state.wakers.wake_all();
                    log::trace!("barrier tripped (generation {})", state.generation);
                    Poll::Ready(true)
                } else {
                    let mut slot = None;
                    state.wakers.register(&mut slot, cx);
                    arrival.replace(Arrival {
                        generation: state.generation,
                        slot,
                    });
                    Poll::Pending
                }
            }
            Some(arrival) => {
                if state.generation != arrival.generation {
                    Poll::Ready(false)
                } else {
                    state.wakers.register(&mut arrival.slot, cx);
                    Poll::Pending
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;
    use tokio_test::task::spawn;
    use tokio_test::{assert_pending, assert_ready};

    #[test]
    fn test_static_properties() {
        assert_impl_all!(Barrier: Send, Sync);
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_is_rejected() {
        let _ = Barrier::new(0);
    }

    #[test]
    fn test_trips_once_all_participants_arrive() {
        let barrier = Barrier::new(3);

        let mut first = spawn(barrier.wait());
        let mut second = spawn(barrier.wait());
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        let last = assert_ready!(spawn(barrier.wait()).poll());
        assert!(last.is_leader());

        assert!(first.is_woken());
        assert!(second.is_woken());
        assert!(!assert_ready!(first.poll()).is_leader());
        assert!(!assert_ready!(second.poll()).is_leader());
    }

    #[test]
    fn test_resets_between_rounds() {
        let barrier = Barrier::new(2);

        let mut waiter = spawn(barrier.wait());
        assert_pending!(waiter.poll());
        assert_ready!(spawn(barrier.wait()).poll());
        assert_ready!(waiter.poll());

        // round 2 must not trip off leftover arrivals from round 1
        let mut waiter = spawn(barrier.wait());
        assert_pending!(waiter.poll());
        assert_pending!(waiter.poll());

        assert_ready!(spawn(barrier.wait()).poll());
        assert!(!assert_ready!(waiter.poll()).is_leader());
    }

    #[test]
    fn test_capacity_one_never_suspends() {
        let barrier = Barrier::new(1);
        for _ in 0..3 {
            let result = assert_ready!(spawn(barrier.wait()).poll());
            assert!(result.is_leader());
        }
    }

    #[test]
    fn test_abandoned_waiter_still_counts() {
        let barrier = Barrier::new(2);

        let mut abandoned = spawn(barrier.wait());
        assert_pending!(abandoned.poll());
        drop(abandoned);

        // the abandoned arrival completes the round
        let result = assert_ready!(spawn(barrier.wait()).poll());
        assert!(result.is_leader());
    }
}

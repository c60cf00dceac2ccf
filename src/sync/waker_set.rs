use std::task::{Context, Waker};

/// Registry of wakers for futures suspended on the same event. Always
/// accessed under the owning primitive's lock.
#[derive(Default)]
pub(super) struct WakerSet {
    entries: Vec<Option<Waker>>,
    epoch: u64,
}

/// Position of one waiter inside a [`WakerSet`]. Invalidated by `wake_all()`.
pub(super) struct WaitKey {
    epoch: u64,
    index: usize,
}

impl WakerSet {
    /// Stores the current task's waker, reusing the waiter's previous slot
    /// when it is still valid.
    pub(super) fn register(&mut self, slot: &mut Option<WaitKey>, cx: &mut Context<'_>) {
        match slot {
            Some(key) if key.epoch == self.epoch => {
                let entry = &mut self.entries[key.index];
                if entry.as_ref().is_none_or(|w| !w.will_wake(cx.waker())) {
                    entry.replace(cx.waker().clone());
                }
            }
            _ => {
                self.entries.push(Some(cx.waker().clone()));
                slot.replace(WaitKey {
                    epoch: self.epoch,
                    index: self.entries.len() - 1,
                });
            }
        }
    }

    /// Removes a waiter's waker without waking it, e.g. when the waiting
    /// future is dropped.
    pub(super) fn discard(&mut self, slot: &mut Option<WaitKey>) {
        if let Some(key) = slot.take()
            && key.epoch == self.epoch
        {
            self.entries[key.index] = None;
        }
    }

    /// Wakes all registered waiters and invalidates their keys.
    pub(super) fn wake_all(&mut self) {
        for waker in self.entries.drain(..) {
            if let Some(waker) = waker {
                waker.wake();
            }
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::poll_fn;
    use std::task::Poll;
    use tokio_test::assert_pending;
    use tokio_test::task::spawn;

    #[test]
    fn test_register_and_wake_all() {
        let mut set = WakerSet::default();
        let mut slot1 = None;
        let mut slot2 = None;

        let mut fut1 = spawn(poll_fn(|cx| -> Poll<()> {
            set.register(&mut slot1, cx);
            Poll::Pending
        }));
        assert_pending!(fut1.poll());
        drop(fut1);

        let mut fut2 = spawn(poll_fn(|cx| -> Poll<()> {
            set.register(&mut slot2, cx);
            Poll::Pending
        }));
        assert_pending!(fut2.poll());
        drop(fut2);

        assert_eq!(2, set.len());
        set.wake_all();
        assert_eq!(0, set.len());
    }

    #[test]
    fn test_discard_removes_only_own_slot() {
        let mut set = WakerSet::default();
        let mut slot1 = None;
        let mut slot2 = None;

        let mut fut = spawn(poll_fn(|cx| -> Poll<()> {
            set.register(&mut slot1, cx);
            set.register(&mut slot2, cx);
            Poll::Pending
        }));
        assert_pending!(fut.poll());
        drop(fut);

        set.discard(&mut slot1);
        assert!(slot1.is_none());
        assert_eq!(1, set.len());
    }

    #[test]
    fn test_stale_key_is_ignored_after_wake_all() {
        let mut set = WakerSet::default();
        let mut old_slot = None;

        let mut fut = spawn(poll_fn(|cx| -> Poll<()> {
            set.register(&mut old_slot, cx);
            Poll::Pending
        }));
        assert_pending!(fut.poll());
        drop(fut);

        set.wake_all();

        let mut new_slot = None;
        let mut fut = spawn(poll_fn(|cx| -> Poll<()> {
            set.register(&mut new_slot, cx);
            Poll::Pending
        }));
        assert_pending!(fut.poll());
        drop(fut);

        // discarding a pre-wake_all key must not touch the new waiter's slot
        set.discard(&mut old_slot);
        assert_eq!(1, set.len());
    }
}

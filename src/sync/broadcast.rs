use super::waker_set::{WaitKey, WakerSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

struct State<T> {
    value: Option<T>,
    has_sender: bool,
    wakers: WakerSet,
}

type StateArc<T> = Arc<Mutex<State<T>>>;

pub struct Sender<T>(StateArc<T>);

pub struct Receiver<T> {
    state: StateArc<T>,
    slot: Option<WaitKey>,
}

/// Write-once broadcast signal: one sender, any number of receivers, all of
/// which observe the same value.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let state = Arc::new(Mutex::new(State {
        value: None,
        has_sender: true,
        wakers: WakerSet::default(),
    }));
    (
        Sender(state.clone()),
        Receiver { state, slot: None },
    )
}

impl<T> Sender<T> {
    pub fn send(self, value: T) {
        let mut state = self.0.lock().expect("broadcast state poisoned");
        state.value = Some(value);
        state.wakers.wake_all();
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.0.lock().expect("broadcast state poisoned");
        state.has_sender = false;
        state.wakers.wake_all();
    }
}

impl<T: Clone> Future for Receiver<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.state.lock().expect("broadcast state poisoned");
        // value is checked before has_sender because Sender::send() consumes
        // the sender, running its Drop right after storing the value
        if let Some(value) = &state.value {
            Poll::Ready(Some(value.clone()))
        } else if !state.has_sender {
            Poll::Ready(None)
        } else {
            state.wakers.register(&mut this.slot, cx);
            Poll::Pending
        }
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            slot: None,
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.state.lock().expect("broadcast state poisoned");
        state.wakers.discard(&mut self.slot);
    }
}

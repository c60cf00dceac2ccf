use super::broadcast;
use super::error::RunError;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Mutex;

type CallResult<V, E> = Result<V, RunError<E>>;

struct Call<V, E> {
    done: broadcast::Receiver<CallResult<V, E>>,
    joiners: usize,
}

enum Role<V, E> {
    Owner(broadcast::Sender<CallResult<V, E>>),
    Joiner(broadcast::Receiver<CallResult<V, E>>),
}

/// Coalesces concurrent calls for the same key: the first caller executes the
/// work, concurrent callers for that key wait and receive the same outcome
/// without re-executing. Once a call completes its key is forgotten, so a
/// later call executes anew.
pub struct Group<K, V, E> {
    calls: Mutex<HashMap<K, Call<V, E>>>,
}

impl<K, V, E> Default for Group<K, V, E> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V, E> Group<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Default::default()
    }

    /// Executes `work` unless a call for `key` is already in flight, in which
    /// case `work` is dropped unexecuted and this caller waits for the
    /// in-flight call instead.
    ///
    /// Returns the call's outcome together with a flag that is true when the
    /// outcome was produced by an execution owned by a different caller.
    /// A failure is shared with waiters exactly like a success; if `work`
    /// panics, waiters are released with [`RunError::Panicked`] and the panic
    /// resumes in the owning caller. No lock is held while `work` runs.
    pub async fn run<F>(&self, key: K, work: F) -> (CallResult<V, E>, bool)
    where
        F: Future<Output = Result<V, E>>,
    {
        let role = {
            let mut calls = self.calls.lock().expect("single-flight state poisoned");
            match calls.entry(key.clone()) {
                Entry::Occupied(mut entry) => {
                    let call = entry.get_mut();
                    call.joiners += 1;
                    Role::Joiner(call.done.clone())
                }
                Entry::Vacant(entry) => {
                    let (sender, receiver) = broadcast::channel();
                    entry.insert(Call {
                        done: receiver,
                        joiners: 0,
                    });
                    Role::Owner(sender)
                }
            }
        };

        match role {
            Role::Joiner(done) => {
                drop(work);
                log::trace!("joining in-flight call");
                let result = done.await.unwrap_or(Err(RunError::Abandoned));
                (result, true)
            }
            Role::Owner(sender) => {
                let mut completion = Completion {
                    group: self,
                    key,
                    sender: Some(sender),
                };
                match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(Ok(value)) => {
                        completion.finish(Ok(value.clone()));
                        (Ok(value), false)
                    }
                    Ok(Err(error)) => {
                        completion.finish(Err(RunError::Failed(error.clone())));
                        (Err(RunError::Failed(error)), false)
                    }
                    Err(payload) => {
                        completion.finish(Err(RunError::Panicked(panic_message(payload.as_ref()))));
                        resume_unwind(payload)
                    }
                }
            }
        }
    }
}

/// Publishes the owning call's outcome. If the owning call is dropped before
/// finishing, releases the waiters with [`RunError::Abandoned`] instead of
/// leaving the key in flight forever.
struct Completion<'a, K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    group: &'a Group<K, V, E>,
    key: K,
    sender: Option<broadcast::Sender<CallResult<V, E>>>,
}

impl<K, V, E> Completion<'_, K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    fn finish(&mut self, result: CallResult<V, E>) {
        // the record must leave the map before the result is broadcast, so
        // that a new caller for this key can never join a completed call
        let removed = {
            let mut calls = self.group.calls.lock().expect("single-flight state poisoned");
            calls.remove(&self.key)
        };
        if let Some(call) = removed {
            log::trace!("releasing {} coalesced waiter(s)", call.joiners);
        }
        if let Some(sender) = self.sender.take() {
            sender.send(result);
        }
    }
}

impl<K, V, E> Drop for Completion<'_, K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.finish(Err(RunError::Abandoned));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

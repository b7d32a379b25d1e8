//! Single-slot call scheduling shared by debounce and throttle.
//!
//! A [`Scheduler`] holds at most one pending call plus the timer that will
//! run it. Every reset bumps a generation counter so a timer that already
//! woke up cannot run a call it no longer owns.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::error::AsyncError;

pub(crate) type BoxedCall<A, T, E> =
    Box<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

pub(crate) type Outcome<T, E> = Result<T, AsyncError<E>>;

pub(crate) struct PendingCall<A, T, E> {
    args: A,
    reply: oneshot::Sender<Outcome<T, E>>,
}

impl<A, T, E> PendingCall<A, T, E> {
    /// Reject the waiting caller with `Cancelled(message)`.
    pub(crate) fn reject(self, message: &str) {
        let _ = self.reply.send(Err(AsyncError::Cancelled(message.to_string())));
    }
}

pub(crate) struct Slot<A, T, E> {
    pub(crate) pending: Option<PendingCall<A, T, E>>,
    pub(crate) last_invoke: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

impl<A, T, E> Slot<A, T, E> {
    /// Drop the scheduled timer and hand back whatever call was waiting on it.
    pub(crate) fn clear(&mut self) -> Option<PendingCall<A, T, E>> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
        self.pending.take()
    }

    pub(crate) fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Park `args` in the slot, returning the receiver the caller awaits and
    /// the call it displaced, if any.
    pub(crate) fn park(
        &mut self,
        args: A,
    ) -> (oneshot::Receiver<Outcome<T, E>>, Option<PendingCall<A, T, E>>) {
        let (reply, receiver) = oneshot::channel();
        let displaced = self.pending.replace(PendingCall { args, reply });
        (receiver, displaced)
    }
}

pub(crate) struct Scheduler<A, T, E> {
    call: BoxedCall<A, T, E>,
    slot: Mutex<Slot<A, T, E>>,
}

impl<A, T, E> Scheduler<A, T, E> {
    pub(crate) fn new(call: BoxedCall<A, T, E>) -> Self {
        Self {
            call,
            slot: Mutex::new(Slot {
                pending: None,
                last_invoke: None,
                timer: None,
                generation: 0,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Slot<A, T, E>> {
        self.slot.lock()
    }

    /// Start `args` right away, bypassing the slot.
    pub(crate) fn run_now(&self, args: A) -> BoxFuture<'static, Result<T, E>> {
        (self.call)(args)
    }

    /// Run a call taken out of the slot and deliver its result.
    pub(crate) async fn invoke(&self, pending: PendingCall<A, T, E>) {
        let outcome = (self.call)(pending.args).await;
        let _ = pending.reply.send(outcome.map_err(AsyncError::Failed));
    }

    async fn fire(&self, generation: u64) {
        let pending = {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return;
            }
            slot.timer = None;
            slot.last_invoke = Some(Instant::now());
            slot.pending.take()
        };

        if let Some(pending) = pending {
            self.invoke(pending).await;
        }
    }
}

impl<A, T, E> Scheduler<A, T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Spawn the timer that runs whatever is pending at `deadline`.
    ///
    /// Replaces any timer already armed.
    pub(crate) fn arm(self: &Arc<Self>, slot: &mut Slot<A, T, E>, deadline: Instant) {
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);

        let generation = slot.generation;
        let scheduler = Arc::clone(self);
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            scheduler.fire(generation).await;
        }));
    }
}

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::registry::{BoxedCallback, CallbackId, FrameArgs, IdAllocator, Registration};

/// Deferred registry mutation.
pub(crate) enum Command {
    Register {
        id: CallbackId,
        registration: Registration,
        callback: BoxedCallback,
    },
    Unregister(CallbackId),
    SetEnabled(CallbackId, bool),
}

/// Queue of deferred mutations, owned by the scheduler.
pub(crate) struct CommandQueue {
    tx: Sender<Command>,
    rx: Receiver<Command>,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    #[inline]
    pub(crate) fn sender(&self) -> Sender<Command> {
        self.tx.clone()
    }

    #[inline]
    pub(crate) fn try_recv(&self) -> Option<Command> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn discard(&self) -> usize {
        let mut n = 0usize;
        while self.rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }
}

/// Cloneable, re-entrant way to mutate a scheduler from inside callbacks.
///
/// Mutations are queued and applied at the next tick boundary (start or end of
/// a tick) or before the next direct call on the scheduler. An in-flight frame
/// never sees them.
#[derive(Clone)]
pub struct SchedulerHandle {
    ids: IdAllocator,
    tx: Sender<Command>,
}

impl SchedulerHandle {
    #[inline]
    pub(crate) fn new(ids: IdAllocator, tx: Sender<Command>) -> Self {
        Self { ids, tx }
    }

    /// Queues a registration. The id is valid immediately; the callback joins
    /// dispatch once the queue is applied.
    pub fn register<F>(&self, callback: F, registration: Registration) -> CallbackId
    where
        F: FnMut(&FrameArgs<'_>) -> anyhow::Result<()> + 'static,
    {
        let id = self.ids.next();
        self.send(Command::Register {
            id,
            registration,
            callback: Box::new(callback),
        });
        id
    }

    #[inline]
    pub fn unregister(&self, id: CallbackId) {
        self.send(Command::Unregister(id));
    }

    #[inline]
    pub fn set_enabled(&self, id: CallbackId, enabled: bool) {
        self.send(Command::SetEnabled(id, enabled));
    }

    /// Fire-and-forget: a dropped scheduler simply discards the command.
    #[inline]
    fn send(&self, command: Command) {
        let _ = self.tx.send(command);
    }
}

//! The owner loop behind every [`crate::CountDownLatch`].
//!
//! [`LatchState`] is only ever touched by the service task, which applies one
//! [`LatchCommand`] at a time. Waiters are parked as reply senders and answered
//! together when the count reaches zero or the latch is destroyed.

use std::sync::Arc;

use async_trait::async_trait;
use latchkit_async_service::{Flow, Sender, async_service};

use crate::LatchError;

pub type WaitReply = Sender<Result<(), LatchError>>;

pub enum LatchCommand {
    Wait { reply: WaitReply },
    Signal { reply: Sender<Result<bool, LatchError>> },
    Increase { reply: Sender<()> },
    Reset { count: usize, reply: Sender<()> },
    Count { reply: Sender<usize> },
    WaiterCount { reply: Sender<usize> },
    Destroy,
}

pub struct LatchState {
    label: Arc<str>,
    count: usize,
    waiters: Vec<WaitReply>,
}

impl LatchState {
    pub fn new(label: Arc<str>, count: usize) -> Self {
        Self {
            label,
            count,
            waiters: Vec::new(),
        }
    }

    pub fn wait(&mut self, reply: WaitReply) {
        if self.count == 0 {
            log::trace!("{}: wait on free latch", self.label);
            Self::reply(&self.label, &reply, Ok(()));
        } else {
            self.waiters.push(reply);
            log::trace!(
                "{}: waiter parked ({} waiting, count={})",
                self.label,
                self.waiters.len(),
                self.count
            );
        }
    }

    /// # Errors
    ///
    /// * [`LatchError::AlreadyFree`] if the count is already zero
    pub fn signal(&mut self) -> Result<bool, LatchError> {
        if self.count == 0 {
            log::debug!("{}: signal on free latch", self.label);
            return Err(LatchError::AlreadyFree);
        }

        self.count -= 1;

        if self.count == 0 {
            self.release(Ok(()));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub const fn increase(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn reset(&mut self, count: usize) {
        log::trace!("{}: reset {} -> {count}", self.label, self.count);
        self.count = count;

        if count == 0 {
            self.release(Ok(()));
        }
    }

    pub const fn count(&self) -> usize {
        self.count
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// Answers every parked waiter with `result` and empties the waiter list.
    pub fn release(&mut self, result: Result<(), LatchError>) {
        if self.waiters.is_empty() {
            return;
        }

        log::trace!(
            "{}: releasing {} waiter(s) with {result:?}",
            self.label,
            self.waiters.len()
        );

        for reply in self.waiters.drain(..) {
            Self::reply(&self.label, &reply, result);
        }
    }

    fn reply(label: &str, reply: &WaitReply, result: Result<(), LatchError>) {
        // A waiter that gave up keeps its slot until release; its reply goes nowhere.
        if reply.send(result).is_err() {
            log::trace!("{label}: waiter went away before release");
        }
    }
}

async_service!(LatchCommand, LatchState);

#[async_trait]
impl Processor for Service {
    type Error = Error;

    async fn process_command(
        ctx: &mut LatchState,
        command: LatchCommand,
    ) -> Result<Flow, Self::Error> {
        match command {
            LatchCommand::Wait { reply } => ctx.wait(reply),
            LatchCommand::Signal { reply } => {
                let _ = reply.send(ctx.signal());
            }
            LatchCommand::Increase { reply } => {
                ctx.increase();
                let _ = reply.send(());
            }
            LatchCommand::Reset { count, reply } => {
                ctx.reset(count);
                let _ = reply.send(());
            }
            LatchCommand::Count { reply } => {
                let _ = reply.send(ctx.count());
            }
            LatchCommand::WaiterCount { reply } => {
                let _ = reply.send(ctx.waiter_count());
            }
            LatchCommand::Destroy => {
                log::debug!("{}: destroyed", ctx.label);
                ctx.release(Err(LatchError::Destroyed));
                return Ok(Flow::Stop);
            }
        }

        Ok(Flow::Continue)
    }

    async fn on_shutdown(ctx: &mut LatchState) -> Result<(), Self::Error> {
        ctx.release(Err(LatchError::Destroyed));
        log::debug!("{}: service stopped", ctx.label);
        Ok(())
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Single-owner services driven by a mailbox.
//!
//! [`async_service!`] generates a `Service` that owns a context value and processes commands one
//! at a time, in arrival order, on a spawned Tokio task. Other tasks talk to it through a cloneable
//! `Handle`. Only the service task ever touches the context, so the context needs no locking.
//!
//! Commands that need an answer carry their own reply [`Sender`]. `Handle::request` builds such a
//! command around a fresh one-slot channel and awaits the answer. The service may hold on to the
//! reply sender and answer later, which is how deferred replies are expressed.

pub use async_trait::async_trait;
pub use flume::{Receiver, RecvError, SendError, Sender, bounded, unbounded};
pub use log;
pub use thiserror::Error;
pub use tokio;
pub use tokio::task::{JoinError, JoinHandle};
pub use tokio_util::sync::CancellationToken;

/// Whether a service keeps pulling commands after the one just processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Creates a service mailbox. A `capacity` of `0` means unbounded.
#[must_use]
pub fn mailbox<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    if capacity == 0 {
        unbounded()
    } else {
        bounded(capacity)
    }
}

#[macro_export]
macro_rules! async_service_body {
    ($command:path, $context:path $(,)?) => {
        #[$crate::async_trait]
        pub trait Processor {
            type Error;

            async fn process_command(
                ctx: &mut $context,
                command: $command,
            ) -> Result<$crate::Flow, Self::Error>;

            async fn on_start(&mut self) -> Result<(), Self::Error> {
                Ok(())
            }

            #[allow(unused_variables)]
            async fn on_shutdown(ctx: &mut $context) -> Result<(), Self::Error> {
                Ok(())
            }
        }

        pub struct Service {
            pub ctx: $context,
            pub token: $crate::CancellationToken,
            sender: $crate::Sender<$command>,
            receiver: $crate::Receiver<$command>,
        }

        #[allow(unused)]
        impl Service {
            pub fn new(ctx: $context) -> Self {
                Self::with_capacity(ctx, 0)
            }

            pub fn with_capacity(ctx: $context, capacity: usize) -> Self {
                let (sender, receiver) = $crate::mailbox(capacity);
                Self {
                    ctx,
                    token: $crate::CancellationToken::new(),
                    sender,
                    receiver,
                }
            }

            pub fn start(mut self) -> $crate::JoinHandle<Result<(), Error>> {
                $crate::tokio::spawn(async move {
                    self.on_start().await?;

                    let Self {
                        mut ctx,
                        token,
                        sender,
                        receiver,
                    } = self;

                    // Only handles keep the mailbox open once the loop runs.
                    drop(sender);

                    let result = loop {
                        let command = $crate::tokio::select! {
                            biased;
                            () = token.cancelled() => None,
                            command = receiver.recv_async() => command.ok(),
                        };

                        let Some(command) = command else {
                            if token.is_cancelled() {
                                $crate::log::debug!("Service was cancelled");
                            } else {
                                $crate::log::debug!("Every Service handle was dropped");
                            }
                            break Ok(());
                        };

                        $crate::log::trace!("Received Service command");

                        match Self::process_command(&mut ctx, command).await {
                            Ok($crate::Flow::Continue) => {}
                            Ok($crate::Flow::Stop) => {
                                $crate::log::debug!("Service stopped by command");
                                break Ok(());
                            }
                            Err(e) => break Err(e),
                        }
                    };

                    token.cancel();

                    let shutdown = Self::on_shutdown(&mut ctx).await;

                    let dropped = receiver.drain().count();
                    if dropped > 0 {
                        $crate::log::debug!("Dropped {dropped} unprocessed Service command(s)");
                    }

                    $crate::log::debug!("Stopped Service");

                    result?;
                    shutdown?;

                    Ok(())
                })
            }

            pub fn handle(&self) -> Handle {
                Handle {
                    sender: self.sender.clone(),
                    token: self.token.clone(),
                }
            }
        }

        #[$crate::async_trait]
        pub trait Commander {
            type Error;

            #[allow(unused)]
            fn send_command(&self, command: $command) -> Result<(), Self::Error>;
            #[allow(unused)]
            async fn send_command_async(&self, command: $command) -> Result<(), Self::Error>;
            #[allow(unused)]
            async fn request<T, F>(&self, build: F) -> Result<T, Self::Error>
            where
                T: Send + 'static,
                F: FnOnce($crate::Sender<T>) -> $command + Send;
            #[allow(unused)]
            fn shutdown(&self) -> Result<(), Self::Error>;
            #[allow(unused)]
            fn is_shut_down(&self) -> bool;
        }

        #[derive(Clone)]
        pub struct Handle {
            sender: $crate::Sender<$command>,
            token: $crate::CancellationToken,
        }

        impl From<$crate::SendError<$command>> for CommanderError {
            fn from(_value: $crate::SendError<$command>) -> Self {
                Self::Send
            }
        }

        #[derive(Debug, $crate::Error)]
        pub enum CommanderError {
            #[error("Failed to send")]
            Send,
            #[error(transparent)]
            Recv(#[from] $crate::RecvError),
            #[error("Service is shut down")]
            Shutdown,
        }

        #[$crate::async_trait]
        impl Commander for Handle {
            type Error = CommanderError;

            fn send_command(&self, command: $command) -> Result<(), Self::Error> {
                if self.token.is_cancelled() {
                    return Err(CommanderError::Shutdown);
                }
                Ok(self.sender.send(command)?)
            }

            async fn send_command_async(&self, command: $command) -> Result<(), Self::Error> {
                if self.token.is_cancelled() {
                    return Err(CommanderError::Shutdown);
                }
                Ok(self.sender.send_async(command).await?)
            }

            async fn request<T, F>(&self, build: F) -> Result<T, Self::Error>
            where
                T: Send + 'static,
                F: FnOnce($crate::Sender<T>) -> $command + Send,
            {
                if self.token.is_cancelled() {
                    return Err(CommanderError::Shutdown);
                }

                let (tx, rx) = $crate::bounded(1);
                self.sender.send_async(build(tx)).await?;

                // A reply that is already there wins over a concurrent shutdown.
                $crate::tokio::select! {
                    biased;
                    reply = rx.recv_async() => reply.map_err(CommanderError::from),
                    () = self.token.cancelled() => Err(CommanderError::Shutdown),
                }
            }

            fn shutdown(&self) -> Result<(), Self::Error> {
                $crate::log::debug!("Shutting down Service");
                self.token.cancel();
                Ok(())
            }

            fn is_shut_down(&self) -> bool {
                self.token.is_cancelled()
            }
        }
    };
}

#[macro_export]
macro_rules! async_service {
    ($command:path, $context:path $(,)?) => {
        #[derive(Debug, $crate::Error)]
        pub enum Error {
            #[error(transparent)]
            Join(#[from] $crate::JoinError),
            #[allow(unused)]
            #[error(transparent)]
            IO(#[from] std::io::Error),
        }

        $crate::async_service_body!($command, $context);
    };

    ($command:path, $context:path, $error:path $(,)?) => {
        #[derive(Debug, $crate::Error)]
        pub enum Error {
            #[error(transparent)]
            Join(#[from] $crate::JoinError),
            #[allow(unused)]
            #[error(transparent)]
            IO(#[from] std::io::Error),
            #[error(transparent)]
            Process(#[from] $error),
        }

        $crate::async_service_body!($command, $context);
    };
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::{Flow, Sender};

    pub enum TallyCommand {
        Add { value: u64 },
        Total { reply: Sender<u64> },
        TotalLater { reply: Sender<u64> },
        Flush,
        Stop,
    }

    #[derive(Default)]
    pub struct TallyContext {
        total: u64,
        deferred: Vec<Sender<u64>>,
        on_shutdown: Option<Sender<u64>>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("Tally overflowed")]
    pub struct TallyOverflow;

    mod tally {
        async_service!(
            crate::test::TallyCommand,
            crate::test::TallyContext,
            crate::test::TallyOverflow,
        );
    }

    #[async_trait]
    impl tally::Processor for tally::Service {
        type Error = tally::Error;

        async fn process_command(
            ctx: &mut TallyContext,
            command: TallyCommand,
        ) -> Result<Flow, Self::Error> {
            match command {
                TallyCommand::Add { value } => {
                    ctx.total = ctx.total.checked_add(value).ok_or(TallyOverflow)?;
                }
                TallyCommand::Total { reply } => {
                    let _ = reply.send(ctx.total);
                }
                TallyCommand::TotalLater { reply } => {
                    ctx.deferred.push(reply);
                }
                TallyCommand::Flush => {
                    for reply in ctx.deferred.drain(..) {
                        let _ = reply.send(ctx.total);
                    }
                }
                TallyCommand::Stop => return Ok(Flow::Stop),
            }
            Ok(Flow::Continue)
        }

        async fn on_shutdown(ctx: &mut TallyContext) -> Result<(), Self::Error> {
            if let Some(tx) = ctx.on_shutdown.take() {
                let _ = tx.send(ctx.total);
            }
            Ok(())
        }
    }

    fn start(ctx: TallyContext) -> (tally::Handle, crate::JoinHandle<Result<(), tally::Error>>) {
        let service = tally::Service::new(ctx);
        let handle = service.handle();
        (handle, service.start())
    }

    #[test_log::test(tokio::test)]
    async fn processes_commands_in_arrival_order() {
        use tally::Commander;

        let (handle, join) = start(TallyContext::default());

        handle.send_command(TallyCommand::Add { value: 2 }).unwrap();
        handle
            .send_command_async(TallyCommand::Add { value: 3 })
            .await
            .unwrap();

        let total = handle
            .request(|reply| TallyCommand::Total { reply })
            .await
            .unwrap();
        assert_eq!(total, 5);

        handle.shutdown().unwrap();
        join.await.unwrap().unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn deferred_replies_resolve_when_flushed() {
        use tally::Commander;

        let (handle, join) = start(TallyContext::default());

        let later = {
            let handle = handle.clone();
            crate::tokio::spawn(async move {
                handle
                    .request(|reply| TallyCommand::TotalLater { reply })
                    .await
            })
        };

        crate::tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!later.is_finished());

        handle.send_command(TallyCommand::Add { value: 7 }).unwrap();
        handle.send_command(TallyCommand::Flush).unwrap();

        assert_eq!(later.await.unwrap().unwrap(), 7);

        handle.send_command(TallyCommand::Stop).unwrap();
        join.await.unwrap().unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn stop_runs_shutdown_hook_and_rejects_later_commands() {
        use tally::Commander;

        let (tx, rx) = crate::bounded(1);
        let (handle, join) = start(TallyContext {
            total: 4,
            on_shutdown: Some(tx),
            ..TallyContext::default()
        });

        handle.send_command(TallyCommand::Stop).unwrap();
        join.await.unwrap().unwrap();

        assert_eq!(rx.recv_async().await.unwrap(), 4);
        assert!(handle.is_shut_down());
        assert!(matches!(
            handle.send_command(TallyCommand::Add { value: 1 }),
            Err(tally::CommanderError::Shutdown)
        ));
        assert!(matches!(
            handle.request(|reply| TallyCommand::Total { reply }).await,
            Err(tally::CommanderError::Shutdown)
        ));
    }

    #[test_log::test(tokio::test)]
    async fn pending_deferred_request_fails_when_service_stops() {
        use tally::Commander;

        let (handle, join) = start(TallyContext::default());

        let later = {
            let handle = handle.clone();
            crate::tokio::spawn(async move {
                handle
                    .request(|reply| TallyCommand::TotalLater { reply })
                    .await
            })
        };

        crate::tokio::time::sleep(Duration::from_millis(20)).await;
        handle.send_command(TallyCommand::Stop).unwrap();
        join.await.unwrap().unwrap();

        assert!(later.await.unwrap().is_err());
    }

    #[test_log::test(tokio::test)]
    async fn process_error_ends_service_with_error() {
        use tally::Commander;

        let (handle, join) = start(TallyContext {
            total: u64::MAX,
            ..TallyContext::default()
        });

        handle.send_command(TallyCommand::Add { value: 1 }).unwrap();

        assert!(matches!(
            join.await.unwrap(),
            Err(tally::Error::Process(TallyOverflow))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn service_stops_once_every_handle_is_dropped() {
        let (handle, join) = start(TallyContext::default());
        drop(handle);

        join.await.unwrap().unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn bounded_mailbox_still_processes_everything() {
        use tally::Commander;

        let service = tally::Service::with_capacity(TallyContext::default(), 1);
        let handle = service.handle();
        let join = service.start();

        for value in 1..=10 {
            handle
                .send_command_async(TallyCommand::Add { value })
                .await
                .unwrap();
        }

        let total = handle
            .request(|reply| TallyCommand::Total { reply })
            .await
            .unwrap();
        assert_eq!(total, 55);

        handle.shutdown().unwrap();
        join.await.unwrap().unwrap();
    }
}

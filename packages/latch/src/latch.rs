use std::{
    fmt,
    sync::{
        Arc, LazyLock,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    LatchConfig, LatchError,
    service::{Commander as _, Handle, LatchCommand, LatchState, Service},
};

static LATCH_ID_COUNTER: LazyLock<AtomicU64> = LazyLock::new(|| AtomicU64::new(1));

fn try_count<T: TryInto<usize>>(count: T) -> Result<usize, LatchError> {
    count.try_into().map_err(|_| LatchError::InvalidArgument)
}

/// A countdown latch.
///
/// Created with a count, a latch blocks every caller of [`CountDownLatch::wait`] until the count
/// has been brought down to zero by [`CountDownLatch::signal`] (or [`CountDownLatch::reset`]),
/// then releases all of them together.
///
/// The latch state is owned by a dedicated task; a `CountDownLatch` is only a handle to it and is
/// cheap to clone. Every operation is applied in the order it reaches that task, so operations on
/// one latch are linearizable. Operations on different latches are independent.
///
/// ```rust
/// use latchkit_latch::{CountDownLatch, LatchError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), LatchError> {
/// let latch = CountDownLatch::new(2)?;
///
/// let worker = latch.clone();
/// tokio::spawn(async move {
///     for _ in 0..2 {
///         worker.signal().await?;
///     }
///     Ok::<_, LatchError>(())
/// });
///
/// latch.wait().await?;
/// assert_eq!(latch.count().await?, 0);
/// # Ok(())
/// # }
/// ```
///
/// A waiter whose future is dropped keeps its slot until the next release; the reply it would
/// have received is discarded.
#[derive(Clone)]
pub struct CountDownLatch {
    label: Arc<str>,
    handle: Handle,
}

impl fmt::Debug for CountDownLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountDownLatch")
            .field("label", &self.label)
            .field("destroyed", &self.handle.is_shut_down())
            .finish()
    }
}

impl CountDownLatch {
    /// Creates a latch with the given count and the default [`LatchConfig`].
    ///
    /// # Errors
    ///
    /// * [`LatchError::InvalidArgument`] if `count` is negative or does not fit in a `usize`
    ///
    /// # Panics
    ///
    /// * If called outside of a Tokio runtime
    pub fn new<T: TryInto<usize>>(count: T) -> Result<Self, LatchError> {
        Ok(Self::builder().count(try_count(count)?).build())
    }

    #[must_use]
    pub fn builder() -> LatchBuilder {
        LatchBuilder::new()
    }

    /// Name used for this latch in log output.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Blocks until the count reaches zero. Returns immediately if it already is zero.
    ///
    /// There is no timeout; race this against a timer if bounded waiting is needed.
    ///
    /// # Errors
    ///
    /// * [`LatchError::Destroyed`] if the latch is destroyed before the count reaches zero
    pub async fn wait(&self) -> Result<(), LatchError> {
        self.handle
            .request(|reply| LatchCommand::Wait { reply })
            .await?
    }

    /// Decrements the count. Returns `true` if this brought the count to zero, in which case
    /// every current waiter has been released.
    ///
    /// # Errors
    ///
    /// * [`LatchError::AlreadyFree`] if the count was already zero
    /// * [`LatchError::Destroyed`] if the latch has been destroyed
    pub async fn signal(&self) -> Result<bool, LatchError> {
        self.handle
            .request(|reply| LatchCommand::Signal { reply })
            .await?
    }

    /// Same as [`CountDownLatch::signal`].
    ///
    /// # Errors
    ///
    /// * See [`CountDownLatch::signal`]
    pub async fn count_down(&self) -> Result<bool, LatchError> {
        self.signal().await
    }

    /// Increments the count. Waiters stay blocked and now need one more signal.
    ///
    /// # Errors
    ///
    /// * [`LatchError::Destroyed`] if the latch has been destroyed
    pub async fn increase(&self) -> Result<(), LatchError> {
        Ok(self
            .handle
            .request(|reply| LatchCommand::Increase { reply })
            .await?)
    }

    /// Replaces the count. Resetting to zero releases every waiter; resetting to anything else
    /// leaves them blocked.
    ///
    /// # Errors
    ///
    /// * [`LatchError::InvalidArgument`] if `count` is negative or does not fit in a `usize`
    /// * [`LatchError::Destroyed`] if the latch has been destroyed
    pub async fn reset<T: TryInto<usize>>(&self, count: T) -> Result<(), LatchError> {
        let count = try_count(count)?;
        Ok(self
            .handle
            .request(|reply| LatchCommand::Reset { count, reply })
            .await?)
    }

    /// # Errors
    ///
    /// * [`LatchError::Destroyed`] if the latch has been destroyed
    pub async fn count(&self) -> Result<usize, LatchError> {
        Ok(self
            .handle
            .request(|reply| LatchCommand::Count { reply })
            .await?)
    }

    /// Number of callers currently parked in [`CountDownLatch::wait`], including ones that
    /// have since gone away.
    ///
    /// # Errors
    ///
    /// * [`LatchError::Destroyed`] if the latch has been destroyed
    pub async fn waiter_count(&self) -> Result<usize, LatchError> {
        Ok(self
            .handle
            .request(|reply| LatchCommand::WaiterCount { reply })
            .await?)
    }

    /// # Errors
    ///
    /// * [`LatchError::Destroyed`] if the latch has been destroyed
    pub async fn is_free(&self) -> Result<bool, LatchError> {
        Ok(self.count().await? == 0)
    }

    /// Tears the latch down. Does not wait for the teardown to happen.
    ///
    /// Requests already queued are applied first. Every waiter parked at that point is released
    /// with [`LatchError::Destroyed`], and every later operation fails with the same error.
    ///
    /// # Errors
    ///
    /// * [`LatchError::Destroyed`] if the latch was already torn down
    pub async fn destroy(&self) -> Result<(), LatchError> {
        log::debug!("{}: destroy requested", self.label);
        Ok(self
            .handle
            .send_command_async(LatchCommand::Destroy)
            .await?)
    }

    /// Whether the latch has been torn down.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.handle.is_shut_down()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LatchBuilder {
    count: usize,
    config: LatchConfig,
}

impl LatchBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn count(&mut self, count: usize) -> &mut Self {
        self.count = count;
        self
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.config.name = Some(name.into());
        self
    }

    /// `0` means unbounded.
    pub const fn mailbox_capacity(&mut self, capacity: usize) -> &mut Self {
        self.config.mailbox_capacity = capacity;
        self
    }

    pub fn config(&mut self, config: LatchConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// Spawns the latch's owner task and returns a handle to it.
    ///
    /// # Panics
    ///
    /// * If called outside of a Tokio runtime
    #[must_use]
    pub fn build(&self) -> CountDownLatch {
        let id = LATCH_ID_COUNTER.fetch_add(1, Ordering::SeqCst);
        let label: Arc<str> = self
            .config
            .name
            .as_ref()
            .map_or_else(|| format!("latch-{id}"), Clone::clone)
            .into();

        log::debug!(
            "{label}: created with count={} mailbox_capacity={}",
            self.count,
            self.config.mailbox_capacity
        );

        let service = Service::with_capacity(
            LatchState::new(label.clone(), self.count),
            self.config.mailbox_capacity,
        );
        let handle = service.handle();

        // Detached: the loop ends on destroy or once every handle is dropped.
        drop(service.start());

        CountDownLatch { label, handle }
    }
}

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::{CountDownLatch, LatchError};

/// Something a caller can block on until it becomes free.
///
/// Lets fan-in code wait on any synchronization primitive without knowing which one it is.
#[async_trait]
pub trait Waitable: Send + Sync {
    type Error;

    /// Resolves once the primitive is free.
    async fn wait(&self) -> Result<(), Self::Error>;

    /// Whether a call to [`Waitable::wait`] would return without blocking right now.
    async fn is_free(&self) -> Result<bool, Self::Error>;
}

#[async_trait]
impl Waitable for CountDownLatch {
    type Error = LatchError;

    async fn wait(&self) -> Result<(), Self::Error> {
        Self::wait(self).await
    }

    async fn is_free(&self) -> Result<bool, Self::Error> {
        Self::is_free(self).await
    }
}

/// Waits on every waitable concurrently.
///
/// # Errors
///
/// * The first error returned by any of the waits
pub async fn wait_all<'a, W, I>(waitables: I) -> Result<(), W::Error>
where
    W: Waitable + ?Sized + 'a,
    I: IntoIterator<Item = &'a W>,
{
    try_join_all(waitables.into_iter().map(|waitable| waitable.wait())).await?;
    Ok(())
}

/// # Errors
///
/// * The first error returned by any of the checks
pub async fn all_free<'a, W, I>(waitables: I) -> Result<bool, W::Error>
where
    W: Waitable + ?Sized + 'a,
    I: IntoIterator<Item = &'a W>,
{
    for waitable in waitables {
        if !waitable.is_free().await? {
            return Ok(false);
        }
    }

    Ok(true)
}

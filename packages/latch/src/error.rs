use thiserror::Error;

use crate::service::CommanderError;

/// Failure reported by a [`crate::CountDownLatch`] operation.
///
/// None of these are fatal to the latch itself: an over-signal is answered with
/// [`LatchError::AlreadyFree`] and the latch keeps serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LatchError {
    /// A count was negative or did not fit in a `usize`.
    #[error("Latch count must be a non-negative integer")]
    InvalidArgument,
    /// `signal` was called while the count was already zero.
    #[error("Latch is already free")]
    AlreadyFree,
    /// The latch was destroyed before the operation could complete.
    #[error("Latch was destroyed")]
    Destroyed,
}

impl From<CommanderError> for LatchError {
    fn from(value: CommanderError) -> Self {
        log::trace!("Latch mailbox unavailable: {value}");
        Self::Destroyed
    }
}

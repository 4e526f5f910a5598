use latchkit_env_utils::{DefaultEnvUsizeError, default_env_usize};
use thiserror::Error;

/// Environment variable read by [`LatchConfig::from_env`]. `0` means unbounded.
pub const MAILBOX_CAPACITY_ENV: &str = "LATCHKIT_MAILBOX_CAPACITY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    MailboxCapacity(#[from] DefaultEnvUsizeError),
}

/// Settings applied when a latch is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatchConfig {
    /// Name used in log output instead of the generated `latch-<id>`.
    pub name: Option<String>,
    /// Bound on queued requests. Callers wait for room when it is full. `0` means unbounded.
    pub mailbox_capacity: usize,
}

impl LatchConfig {
    /// # Errors
    ///
    /// * If [`MAILBOX_CAPACITY_ENV`] is set to something other than a non-negative integer
    pub fn from_env() -> Result<Self, ConfigError> {
        let mailbox_capacity = default_env_usize(MAILBOX_CAPACITY_ENV, 0)?;

        log::trace!("LatchConfig::from_env: mailbox_capacity={mailbox_capacity}");

        Ok(Self {
            name: None,
            mailbox_capacity,
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

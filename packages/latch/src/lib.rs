#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Countdown latch for fan-in/fan-out coordination between Tokio tasks.
//!
//! A [`CountDownLatch`] starts with a count. Any number of tasks can [`CountDownLatch::wait`] on
//! it; they are all released together once [`CountDownLatch::signal`] has been called enough times
//! to bring the count to zero. [`CountDownLatch::destroy`] releases them with
//! [`LatchError::Destroyed`] instead.
//!
//! [`Waitable`] abstracts over "something that can be waited on" so fan-in code such as
//! [`wait_all`] does not need to know about latches specifically.

mod config;
mod error;
mod latch;
mod service;
mod waitable;

pub use config::{ConfigError, LatchConfig, MAILBOX_CAPACITY_ENV};
pub use error::LatchError;
pub use latch::{CountDownLatch, LatchBuilder};
pub use waitable::{Waitable, all_free, wait_all};

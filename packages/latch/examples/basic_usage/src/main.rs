#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Basic usage example for `latchkit_latch`.
//!
//! Starts a handful of workers, waits for all of them to check in through a countdown latch, then
//! tears down a second latch nobody will ever finish to show how blocked waiters are failed.

use std::{error::Error, time::Duration};

use latchkit_env_utils::{default_env, default_env_usize};
use latchkit_latch::{CountDownLatch, LatchConfig, LatchError, Waitable, wait_all};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::new()
        .parse_filters(&default_env(
            "LATCHKIT_LOG",
            &default_env("RUST_LOG", "info"),
        ))
        .init();

    let workers = default_env_usize("LATCHKIT_DEMO_WORKERS", 4)?;
    let config = LatchConfig::from_env()?;

    println!("=== Countdown latch example ({workers} workers) ===\n");

    let ready = CountDownLatch::builder()
        .config(config.clone().with_name("ready"))
        .count(workers)
        .build();
    let done = CountDownLatch::builder()
        .config(config.with_name("done"))
        .count(workers)
        .build();

    for id in 0..workers {
        let ready = ready.clone();
        let done = done.clone();
        tokio::spawn(async move {
            log::info!("worker {id}: starting");
            if let Err(e) = ready.signal().await {
                log::error!("worker {id}: failed to check in: {e}");
                return;
            }
            if let Err(e) = ready.wait().await {
                log::error!("worker {id}: start line torn down: {e}");
                return;
            }
            let delay = Duration::from_millis(10)
                .saturating_mul(u32::try_from(id + 1).unwrap_or(u32::MAX));
            tokio::time::sleep(delay).await;
            match done.signal().await {
                Ok(true) => log::info!("worker {id}: finished last"),
                Ok(false) => log::info!("worker {id}: finished"),
                Err(e) => log::error!("worker {id}: failed to finish: {e}"),
            }
        });
    }

    wait_all([&ready, &done]).await?;
    println!("All {workers} workers checked in and finished");
    println!("done is free: {}", Waitable::is_free(&done).await?);

    let never = CountDownLatch::new(1)?;
    let blocked = {
        let never = never.clone();
        tokio::spawn(async move { never.wait().await })
    };

    while never.waiter_count().await? == 0 {
        tokio::task::yield_now().await;
    }
    never.destroy().await?;

    match blocked.await? {
        Err(LatchError::Destroyed) => println!("Blocked waiter was released by destroy"),
        other => println!("Unexpected result from destroyed latch: {other:?}"),
    }

    Ok(())
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Basic usage example for `latchkit_async_service`
//!
//! A ticket dispenser: the service owns the next ticket number, so concurrent callers never get
//! the same ticket even though nothing is locked.

use latchkit_async_service::{Flow, Sender, async_service, async_trait, log};

#[derive(Debug)]
pub enum DispenserCommand {
    /// Hand out the next ticket
    Take { reply: Sender<u64> },
    /// Report how many tickets were handed out
    Issued { reply: Sender<u64> },
    /// Stop the service once everything queued before this is done
    Close,
}

pub struct DispenserContext {
    pub next: u64,
}

async_service!(DispenserCommand, DispenserContext);

#[async_trait]
impl Processor for Service {
    type Error = Error;

    async fn process_command(
        ctx: &mut DispenserContext,
        command: DispenserCommand,
    ) -> Result<Flow, Self::Error> {
        match command {
            DispenserCommand::Take { reply } => {
                let _ = reply.send(ctx.next);
                ctx.next += 1;
            }
            DispenserCommand::Issued { reply } => {
                let _ = reply.send(ctx.next);
            }
            DispenserCommand::Close => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }

    async fn on_shutdown(ctx: &mut DispenserContext) -> Result<(), Self::Error> {
        log::info!("Dispenser closing after {} tickets", ctx.next);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("=== Async Service Example ===\n");

    let service = Service::new(DispenserContext { next: 0 });
    let handle = service.handle();
    let join_handle = service.start();

    let customers: Vec<_> = (0..5)
        .map(|customer| {
            let handle = handle.clone();
            tokio::spawn(async move {
                let ticket = handle
                    .request(|reply| DispenserCommand::Take { reply })
                    .await?;
                println!("customer {customer} got ticket {ticket}");
                Ok::<_, CommanderError>(ticket)
            })
        })
        .collect();

    let mut tickets = Vec::with_capacity(customers.len());
    for customer in customers {
        tickets.push(customer.await??);
    }
    tickets.sort_unstable();
    println!("\nTickets handed out: {tickets:?}");

    let issued = handle
        .request(|reply| DispenserCommand::Issued { reply })
        .await?;
    println!("Issued count: {issued}");

    handle.send_command(DispenserCommand::Close)?;
    join_handle.await??;

    println!(
        "Closed dispenser rejects requests: {}",
        handle
            .request(|reply| DispenserCommand::Take { reply })
            .await
            .is_err()
    );

    Ok(())
}

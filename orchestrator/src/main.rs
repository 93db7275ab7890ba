use std::{env, io};

use comms::specs::DEFAULT_MASTER_PORT;
use log::info;
use orchestrator::SpanningTree;
use tokio::signal;

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let addr = env::var("MASTER_ADDR").unwrap_or_else(|_| format!("0.0.0.0:{DEFAULT_MASTER_PORT}"));

    let master = SpanningTree::bind(&addr).await?;
    info!("listening at {}", master.local_addr()?);

    tokio::select! {
        ret = master.serve(None) => ret?,
        _ = signal::ctrl_c() => info!("received SIGTERM"),
    }

    Ok(())
}

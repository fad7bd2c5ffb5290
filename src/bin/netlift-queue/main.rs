mod args;

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;
use netlift::queue::{server, JobStore};
use netlift::shutdown;
use tracing::{error, info, Level};

use crate::args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging
    if args.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .init();
    } else {
        tracing_subscriber::fmt().json().init();
    }

    let cancel = shutdown::install();
    let addr = SocketAddr::from((args.listen, args.port));

    match server::bind_and_serve(addr, JobStore::new(), cancel).await {
        Ok(()) => {
            info!("queue stopped");
            ExitCode::SUCCESS
        },
        Err(error) => {
            error!(%error, %addr, "encountered runtime error");
            ExitCode::FAILURE
        },
    }
}

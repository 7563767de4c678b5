//! Runs a Sanguo server configured from `SANGUO_*` environment variables.
//!
//! Authentication uses the development token format `id:name[:rank]`.

use std::process::ExitCode;

use sanguo::prelude::*;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    sanguo::logging::init();
    match serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "server failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> Result<(), SanguoError> {
    let config = ServerConfig::from_env()?;
    info!(bind = %config.bind, max_rooms = config.rooms.max_rooms, "configuration loaded");

    let server = SanguoServer::builder()
        .config(config)
        .build(DevAuthenticator)
        .await?;

    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}

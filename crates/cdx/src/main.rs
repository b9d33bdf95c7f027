use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use cdx_api::GameClient;
use cdx_core::{config::Config, runner::AccountRunner};
use cdx_telegram::TelegramConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cdx_core::logging::init("cdx")?;

    let cfg = Arc::new(Config::load()?);
    info!(account = %cfg.account_name, "starting");

    let port = TelegramConnector::new(&cfg);
    let api = Arc::new(GameClient::new(&cfg)?);
    let runner = AccountRunner::new(cfg.clone(), port, api);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_cancel.cancel();
        }
    });

    if let Err(e) = runner.run(cancel).await {
        if e.is_fatal() {
            error!(account = %cfg.account_name, error = %e, "session is invalid, aborting");
        }
        return Err(e.into());
    }

    Ok(())
}

use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    auth::CredentialProvider,
    config::Config,
    domain::{Credential, TaskOutcome, TaskPhase},
    farm::FarmCycle,
    ports::{GameApi, TelegramPort},
    tasks,
    Result,
};

/// One account's whole run: proxy probe, credential acquisition, the three
/// task phases, then the farm cycle until cancelled.
///
/// Everything here is a single cooperative control flow; the only parallelism
/// across accounts would be independent instances of this runner.
pub struct AccountRunner<P: TelegramPort> {
    name: String,
    cfg: Arc<Config>,
    provider: CredentialProvider<P>,
    api: Arc<dyn GameApi>,
}

impl<P: TelegramPort> AccountRunner<P> {
    pub fn new(cfg: Arc<Config>, port: P, api: Arc<dyn GameApi>) -> Self {
        Self {
            name: cfg.account_name.clone(),
            provider: CredentialProvider::new(port, &cfg),
            cfg,
            api,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        if self.cfg.proxy_url.is_some() {
            match self.api.probe_ip().await {
                Ok(ip) => info!(account = %self.name, %ip, "proxy check passed"),
                Err(e) => warn!(account = %self.name, error = %e, "proxy check failed"),
            }
        }

        let Some(cred) = self.acquire_credential(&cancel).await? else {
            return Ok(());
        };

        if !self.cfg.task_ids.is_empty() {
            self.run_task_phases(&cred).await;
        }

        let farm = FarmCycle::new(
            self.name.clone(),
            self.api.clone(),
            self.cfg.farm.clone(),
            self.cfg.backoff.clone(),
        );
        farm.run(&cred, &cancel).await
    }

    /// Retry acquisition on soft errors; abort on the fatal credential error.
    /// Returns `None` when cancelled mid-acquisition.
    async fn acquire_credential(&self, cancel: &CancellationToken) -> Result<Option<Credential>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            match self.provider.acquire().await {
                Ok(cred) => return Ok(Some(cred)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(account = %self.name, error = %e, "credential acquisition failed");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        _ = sleep(self.cfg.backoff.error_pause) => {}
                    }
                }
            }
        }
    }

    async fn run_task_phases(&self, cred: &Credential) {
        for phase in [TaskPhase::Start, TaskPhase::Check, TaskPhase::Claim] {
            let outcomes = tasks::run_phase(
                self.api.as_ref(),
                &self.name,
                cred,
                phase,
                &self.cfg.task_ids,
            )
            .await;

            let accepted = outcomes
                .iter()
                .filter(|o| **o == TaskOutcome::Accepted)
                .count();
            info!(
                account = %self.name,
                op = phase.as_str(),
                accepted,
                total = outcomes.len(),
                "task batch finished"
            );
        }
    }
}

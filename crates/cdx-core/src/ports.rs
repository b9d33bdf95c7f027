use async_trait::async_trait;

use crate::{
    domain::{ClaimOutcome, Credential, ProfileSnapshot},
    Result,
};

/// Failure surface of the Telegram capability.
///
/// `FloodWait` is not treated as an error by callers: it is the server's
/// rate-limit signal and is answered by sleeping the requested duration
/// (plus a margin) and retrying the same step.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("flood wait {0}s")]
    FloodWait(u64),

    /// Unauthorized / deactivated / unregistered account. Fatal upstream.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Other(String),
}

/// Opaque Telegram client capability: resolve the bot peer, open its web
/// view, tell us who we are. Connection lifetime is explicit so the
/// credential provider can disconnect only when it opened the connection
/// itself.
#[async_trait]
pub trait TelegramPort: Send + Sync {
    /// Adapter-specific resolved peer handle.
    type Peer: Send + Sync;

    async fn is_connected(&self) -> bool;
    async fn connect(&self) -> std::result::Result<(), TelegramError>;
    async fn disconnect(&self);

    async fn resolve_bot(&self, username: &str) -> std::result::Result<Self::Peer, TelegramError>;

    /// Issue the web-view request and return the URL it redirects to,
    /// which embeds the `tgWebAppData` credential payload.
    async fn request_web_view(
        &self,
        peer: &Self::Peer,
        url: &str,
        platform: &str,
    ) -> std::result::Result<String, TelegramError>;

    async fn my_id(&self) -> std::result::Result<i64, TelegramError>;
}

/// Port for the game's HTTP API. One method per remote operation; no method
/// sleeps or retries internally, backoff is the caller's job.
#[async_trait]
pub trait GameApi: Send + Sync {
    async fn profile(&self, cred: &Credential) -> Result<ProfileSnapshot>;

    async fn start_farm(&self, cred: &Credential) -> Result<bool>;
    async fn claim_farm(&self, cred: &Credential) -> Result<ClaimOutcome>;

    async fn start_task(&self, cred: &Credential, task_id: &str) -> Result<bool>;
    async fn check_task(&self, cred: &Credential, task_id: &str) -> Result<bool>;
    async fn claim_task(&self, cred: &Credential, task_id: &str) -> Result<bool>;

    /// Best-effort proxy liveness probe against an IP-echo service.
    async fn probe_ip(&self) -> Result<String>;
}

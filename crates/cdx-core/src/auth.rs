use percent_encoding::percent_decode_str;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    config::{BackoffPolicy, Config},
    domain::Credential,
    errors::Error,
    ports::{TelegramError, TelegramPort},
    Result,
};

/// Obtains the short-lived web-app credential from the Telegram capability.
///
/// Peer resolution retries indefinitely on flood waits; an unauthorized /
/// deactivated / unregistered account surfaces as the fatal
/// `Error::InvalidSession`. All other failures are soft and left to the
/// caller's backoff.
pub struct CredentialProvider<P: TelegramPort> {
    name: String,
    port: P,
    bot_username: String,
    web_app_url: String,
    platform: String,
    backoff: BackoffPolicy,
}

impl<P: TelegramPort> CredentialProvider<P> {
    pub fn new(port: P, cfg: &Config) -> Self {
        Self {
            name: cfg.account_name.clone(),
            port,
            bot_username: cfg.bot_username.clone(),
            web_app_url: cfg.web_app_url.clone(),
            platform: cfg.web_view_platform.clone(),
            backoff: cfg.backoff.clone(),
        }
    }

    pub async fn acquire(&self) -> Result<Credential> {
        // If the connection is already up we must not tear it down on exit.
        let opened_here = !self.port.is_connected().await;
        if opened_here {
            self.port.connect().await.map_err(|e| self.lift(e))?;
        }

        let peer = self.resolve_bot_peer().await?;

        let view_url = self
            .port
            .request_web_view(&peer, &self.web_app_url, &self.platform)
            .await
            .map_err(|e| self.lift(e))?;

        let auth_data = decode_twice(extract_web_app_data(&view_url)?)?;
        let account_id = self.port.my_id().await.map_err(|e| self.lift(e))?;

        if opened_here {
            self.port.disconnect().await;
        }

        info!(account = %self.name, "acquired web-app credential");
        Ok(Credential {
            account_id,
            auth_data,
        })
    }

    async fn resolve_bot_peer(&self) -> Result<P::Peer> {
        loop {
            match self.port.resolve_bot(&self.bot_username).await {
                Ok(peer) => return Ok(peer),
                Err(TelegramError::FloodWait(seconds)) => {
                    let delay = self.backoff.flood_delay(seconds);
                    warn!(
                        account = %self.name,
                        seconds,
                        "flood wait while resolving bot peer"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(self.lift(e)),
            }
        }
    }

    fn lift(&self, e: TelegramError) -> Error {
        match e {
            TelegramError::Unauthorized(detail) => Error::InvalidSession(detail),
            other => Error::Telegram(other.to_string()),
        }
    }
}

/// Cut the `tgWebAppData` payload out of the web-view URL.
///
/// The payload sits between `tgWebAppData=` and `&tgWebAppVersion`; the cut
/// is positional on purpose, matching what the server actually emits.
pub fn extract_web_app_data(view_url: &str) -> Result<&str> {
    let Some((_, rest)) = view_url.split_once("tgWebAppData=") else {
        return Err(Error::Telegram(
            "web view url carries no tgWebAppData".to_string(),
        ));
    };
    Ok(rest
        .split_once("&tgWebAppVersion")
        .map(|(payload, _)| payload)
        .unwrap_or(rest))
}

/// The payload is percent-encoded twice by the web view; decode both layers.
/// Decoding a payload with no escapes returns it unchanged.
pub fn decode_twice(payload: &str) -> Result<String> {
    let once = percent_decode_str(payload)
        .decode_utf8()
        .map_err(|e| Error::Telegram(format!("auth payload is not valid utf-8: {e}")))?
        .into_owned();
    let twice = percent_decode_str(&once)
        .decode_utf8()
        .map_err(|e| Error::Telegram(format!("auth payload is not valid utf-8: {e}")))?
        .into_owned();
    Ok(twice)
}

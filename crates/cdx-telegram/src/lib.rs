//! Telegram adapter (grammers, MTProto).
//!
//! Implements the `cdx-core` TelegramPort: connect an authorized user
//! session, resolve the game bot, open its web view, and surface FLOOD_WAIT
//! as the typed rate-limit signal instead of an error.

use std::path::PathBuf;

use async_trait::async_trait;
use grammers_client::{Client, Config as ClientConfig, InitParams, InvocationError};
use grammers_session::{PackedChat, Session};
use grammers_tl_types as tl;
use tokio::sync::Mutex;
use tracing::warn;

use cdx_core::{
    config::Config,
    ports::{TelegramError, TelegramPort},
};

/// RPC error names that mean the account itself is unusable.
const DEAD_SESSION_ERRORS: &[&str] = &[
    "AUTH_KEY_UNREGISTERED",
    "AUTH_KEY_INVALID",
    "USER_DEACTIVATED",
    "USER_DEACTIVATED_BAN",
    "SESSION_REVOKED",
    "SESSION_EXPIRED",
];

/// Lazily-connected grammers client owned by one account's loop.
pub struct TelegramConnector {
    name: String,
    api_id: i32,
    api_hash: String,
    session_file: PathBuf,
    proxy_url: Option<String>,
    client: Mutex<Option<Client>>,
}

impl TelegramConnector {
    pub fn new(cfg: &Config) -> Self {
        Self {
            name: cfg.account_name.clone(),
            api_id: cfg.api_id,
            api_hash: cfg.api_hash.clone(),
            session_file: cfg.session_file.clone(),
            proxy_url: cfg.proxy_url.clone(),
            client: Mutex::new(None),
        }
    }

    fn save_session(&self, client: &Client) {
        if let Err(e) = client.session().save_to_file(&self.session_file) {
            warn!(account = %self.name, error = %e, "failed to save telegram session");
        }
    }
}

#[async_trait]
impl TelegramPort for TelegramConnector {
    type Peer = PackedChat;

    async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    async fn connect(&self) -> Result<(), TelegramError> {
        let mut guard = self.client.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let session = Session::load_file_or_create(&self.session_file)
            .map_err(|e| TelegramError::Other(format!("session file: {e}")))?;

        let params = InitParams {
            proxy_url: self.proxy_url.clone(),
            // Surface every FLOOD_WAIT to the credential provider instead of
            // letting the sender sleep through short ones on its own.
            flood_sleep_threshold: 0,
            ..Default::default()
        };

        let client = Client::connect(ClientConfig {
            session,
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            params,
        })
        .await
        .map_err(|e| TelegramError::Other(format!("connect failed: {e}")))?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(classify_invocation)?;
        if !authorized {
            return Err(TelegramError::Unauthorized(
                "account session is not authorized".to_string(),
            ));
        }

        *guard = Some(client);
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(client) = self.client.lock().await.take() {
            self.save_session(&client);
        }
    }

    async fn resolve_bot(&self, username: &str) -> Result<Self::Peer, TelegramError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| TelegramError::Other("not connected".to_string()))?;

        let chat = client
            .resolve_username(username)
            .await
            .map_err(classify_invocation)?
            .ok_or_else(|| TelegramError::Other(format!("no such username: {username}")))?;

        Ok(chat.pack())
    }

    async fn request_web_view(
        &self,
        peer: &Self::Peer,
        url: &str,
        platform: &str,
    ) -> Result<String, TelegramError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| TelegramError::Other("not connected".to_string()))?;

        let bot = tl::types::InputUser {
            user_id: peer.id,
            access_hash: peer.access_hash.unwrap_or(0),
        };

        let request = tl::functions::messages::RequestWebView {
            from_bot_menu: false,
            silent: false,
            compact: false,
            peer: peer.to_input_peer(),
            bot: bot.into(),
            url: Some(url.to_string()),
            start_param: None,
            theme_params: None,
            platform: platform.to_string(),
            reply_to: None,
            send_as: None,
        };

        let tl::enums::WebViewResult::Url(result) =
            client.invoke(&request).await.map_err(classify_invocation)?;
        Ok(result.url)
    }

    async fn my_id(&self) -> Result<i64, TelegramError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| TelegramError::Other("not connected".to_string()))?;

        let me = client.get_me().await.map_err(classify_invocation)?;
        Ok(me.id())
    }
}

fn classify_invocation(e: InvocationError) -> TelegramError {
    match e {
        InvocationError::Rpc(rpc) => classify_rpc(&rpc.name, rpc.value),
        other => TelegramError::Other(other.to_string()),
    }
}

fn classify_rpc(name: &str, value: Option<u32>) -> TelegramError {
    if name.starts_with("FLOOD_WAIT") || name == "FLOOD_PREMIUM_WAIT" {
        return TelegramError::FloodWait(u64::from(value.unwrap_or(0)));
    }
    if DEAD_SESSION_ERRORS.contains(&name) {
        return TelegramError::Unauthorized(name.to_string());
    }
    TelegramError::Other(match value {
        Some(v) => format!("rpc error {name} ({v})"),
        None => format!("rpc error {name}"),
    })
}

//! Game API adapter (reqwest).
//!
//! Implements the `cdx-core` GameApi port against the Cedex HTTP endpoints.
//! Requests are plain JSON POSTs carrying `{authData, devAuthData, data}`;
//! responses answer with `{status: "ok"|"error", data?}`.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use cdx_core::{
    config::Config,
    domain::{parse_farm_started_at, ClaimOutcome, Credential, ProfileSnapshot},
    errors::Error,
    ports::GameApi,
    Result,
};

/// Platform tag the profile endpoint expects, independent of the web view's.
const PROFILE_PLATFORM: &str = "ios";

const IP_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Browser identities the game frontend is normally loaded under. One is
/// picked per client, not per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8 Pro) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; Redmi Note 10) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Mobile Safari/537.36",
];

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Value,
}

/// Stateless HTTP client for the game API. One instance per account; owns
/// the reqwest session (and through it the proxy, if configured).
pub struct GameClient {
    http: reqwest::Client,
    base_url: String,
    ip_echo_url: String,
}

impl GameClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://cdxp.cedex.io"));
        headers.insert(REFERER, HeaderValue::from_static("https://cdxp.cedex.io/"));

        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(cfg.http_timeout);

        if let Some(proxy_url) = &cfg.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| Error::Config(format!("invalid proxy url: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Http(format!("http client build failed: {e}")))?;

        Ok(Self {
            http,
            base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            ip_echo_url: cfg.ip_echo_url.clone(),
        })
    }

    async fn post(&self, path: &str, cred: &Credential, data: Value) -> Result<ApiResponse> {
        self.post_body(
            path,
            json!({
                "authData": cred.auth_data,
                "devAuthData": cred.account_id,
                "data": data,
            }),
        )
        .await
    }

    async fn post_body(&self, path: &str, body: Value) -> Result<ApiResponse> {
        let url = format!("{}/{path}", self.base_url);
        debug!(%url, "game api request");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{path}: {e}")))?;

        let response = response
            .error_for_status()
            .map_err(|e| Error::Http(format!("{path}: {e}")))?;

        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("{path}: {e}")))?;

        Ok(serde_json::from_str(&text)?)
    }

    /// `status: ok` is the only acceptance signal; everything else is an
    /// unexpected-but-well-formed answer, reported as `false` to the caller.
    async fn post_for_status(&self, path: &str, cred: &Credential, data: Value) -> Result<bool> {
        let response = self.post(path, cred, data).await?;
        Ok(response.status == "ok")
    }
}

#[async_trait]
impl GameApi for GameClient {
    async fn profile(&self, cred: &Credential) -> Result<ProfileSnapshot> {
        let response = self
            .post_body(
                "getUserInfo",
                json!({
                    "authData": cred.auth_data,
                    "devAuthData": cred.account_id,
                    "data": {},
                    "platform": PROFILE_PLATFORM,
                }),
            )
            .await?;
        parse_profile(&response.data)
    }

    async fn start_farm(&self, cred: &Credential) -> Result<bool> {
        self.post_for_status("startFarm", cred, json!({})).await
    }

    async fn claim_farm(&self, cred: &Credential) -> Result<ClaimOutcome> {
        let response = self.post("claimFarm", cred, json!({})).await?;
        Ok(parse_claim(&response))
    }

    async fn start_task(&self, cred: &Credential, task_id: &str) -> Result<bool> {
        self.post_for_status("startTask", cred, json!({ "taskId": task_id }))
            .await
    }

    async fn check_task(&self, cred: &Credential, task_id: &str) -> Result<bool> {
        // The check endpoint really is nested under startTask on the server.
        self.post_for_status("startTask/api/checkTask", cred, json!({ "taskId": task_id }))
            .await
    }

    async fn claim_task(&self, cred: &Credential, task_id: &str) -> Result<bool> {
        self.post_for_status("claimTask", cred, json!({ "taskId": task_id }))
            .await
    }

    async fn probe_ip(&self) -> Result<String> {
        let body: Value = self
            .http
            .get(&self.ip_echo_url)
            .timeout(IP_PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Http(format!("ip probe: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Http(format!("ip probe: {e}")))?;

        body.get("origin")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Api("ip probe response carries no origin".to_string()))
    }
}

fn parse_claim(response: &ApiResponse) -> ClaimOutcome {
    match response.status.as_str() {
        "ok" => ClaimOutcome::Claimed,
        "error" => {
            let reason = response
                .data
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("unspecified")
                .to_string();
            ClaimOutcome::Refused(reason)
        }
        _ => ClaimOutcome::Unexpected,
    }
}

fn parse_profile(data: &Value) -> Result<ProfileSnapshot> {
    if data.is_null() {
        return Err(Error::Api("profile response carries no data".to_string()));
    }

    Ok(ProfileSnapshot {
        available_taps: int_field(data, "availableTaps")?,
        farm_reward: int_field(data, "farmReward")?,
        balance: int_field(data, "balance")?,
        farm_started_at: data
            .get("farmStartedAt")
            .and_then(Value::as_str)
            .and_then(parse_farm_started_at),
    })
}

/// Numeric fields arrive either as JSON numbers or as numeric strings;
/// decimals are truncated toward zero.
fn int_field(data: &Value, key: &str) -> Result<i64> {
    let value = data
        .get(key)
        .ok_or_else(|| Error::Api(format!("profile response missing {key}")))?;

    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .map(|f| f as i64)
        .ok_or_else(|| Error::Api(format!("profile field {key} is not numeric")))
}

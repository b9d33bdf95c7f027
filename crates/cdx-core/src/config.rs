use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration for a single account run.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub account_name: String,
    pub api_id: i32,
    pub api_hash: String,
    pub session_file: PathBuf,
    pub bot_username: String,
    pub web_app_url: String,
    pub web_view_platform: String,

    // Game API
    pub api_base_url: String,
    pub http_timeout: Duration,
    pub proxy_url: Option<String>,
    pub ip_echo_url: String,

    // Control loop
    pub farm: FarmConfig,
    pub backoff: BackoffPolicy,
    pub task_ids: Vec<String>,
}

/// Farm cycle knobs.
#[derive(Clone, Debug)]
pub struct FarmConfig {
    /// Feature flag: when off, the loop only polls the profile.
    pub enabled: bool,
    /// Sleep between polls while waiting for maturity (or idling).
    pub poll_interval: Duration,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(600),
        }
    }
}

/// The single backoff policy applied by every caller on soft errors and
/// rate-limit signals, instead of per-operation sleeps.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    /// Pause after any soft error before the next attempt.
    pub error_pause: Duration,
    /// Safety margin added on top of a server-signaled flood wait.
    pub flood_margin: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            error_pause: Duration::from_secs(3),
            flood_margin: Duration::from_secs(3),
        }
    }
}

impl BackoffPolicy {
    pub fn flood_delay(&self, signaled_secs: u64) -> Duration {
        Duration::from_secs(signaled_secs) + self.flood_margin
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let api_id = env_str("TG_API_ID")
            .and_then(|s| s.trim().parse::<i32>().ok())
            .ok_or_else(|| Error::Config("TG_API_ID environment variable is required".into()))?;
        let api_hash = env_str("TG_API_HASH")
            .and_then(non_empty)
            .ok_or_else(|| Error::Config("TG_API_HASH environment variable is required".into()))?;

        let session_file =
            env_path("TG_SESSION_FILE").unwrap_or_else(|| PathBuf::from("cdx.session"));
        let account_name = env_str("ACCOUNT_NAME")
            .and_then(non_empty)
            .unwrap_or_else(|| session_stem(&session_file));

        let bot_username =
            env_str("BOT_USERNAME").unwrap_or_else(|| "cedex_tap_bot".to_string());
        let web_app_url =
            env_str("WEB_APP_URL").unwrap_or_else(|| "https://cdxp.cedex.io/".to_string());
        let web_view_platform =
            env_str("WEB_VIEW_PLATFORM").unwrap_or_else(|| "android".to_string());

        let api_base_url =
            env_str("API_BASE_URL").unwrap_or_else(|| "https://cdxp.cedex.io/api".to_string());
        let http_timeout = Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS").unwrap_or(30));
        let proxy_url = env_str("PROXY_URL").and_then(non_empty);
        let ip_echo_url =
            env_str("IP_ECHO_URL").unwrap_or_else(|| "https://httpbin.org/ip".to_string());

        let farm = FarmConfig {
            enabled: env_bool("FARM_ENABLED").unwrap_or(true),
            poll_interval: Duration::from_secs(env_u64("POLL_INTERVAL_SECS").unwrap_or(600)),
        };
        let backoff = BackoffPolicy {
            error_pause: Duration::from_secs(env_u64("ERROR_BACKOFF_SECS").unwrap_or(3)),
            flood_margin: Duration::from_secs(env_u64("FLOOD_MARGIN_SECS").unwrap_or(3)),
        };
        let task_ids = parse_csv(env_str("TASK_IDS"));

        Ok(Self {
            account_name,
            api_id,
            api_hash,
            session_file,
            bot_username,
            web_app_url,
            web_view_platform,
            api_base_url,
            http_timeout,
            proxy_url,
            ip_echo_url,
            farm,
            backoff,
            task_ids,
        })
    }
}

fn session_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("account")
        .to_string()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Core error type for the farmer.
///
/// Adapter crates map their specific errors into this type so the control
/// loop can handle failures consistently. Only `InvalidSession` is fatal:
/// it unwinds the whole per-account run. Everything else is a soft error the
/// loop logs, backs off from, and retries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("telegram error: {0}")]
    Telegram(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("api error: {0}")]
    Api(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error terminates the account's run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidSession(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

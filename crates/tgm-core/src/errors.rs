/// Core error type, aligned with the failure taxonomy of the invite/export
/// pipeline.
///
/// Adapter crates map their specific errors into this type so the rest of the
/// system can decide scope: configuration and input errors abort before any
/// work starts, `AuthExpired` ends one account's worker, `RateLimited` ends
/// one worker permanently, `PrivacyRestricted` and `Remote` are per-item.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("stored session for account '{account}' is no longer authorized")]
    AuthExpired { account: String },

    #[error("rate limited by Telegram (flood)")]
    RateLimited,

    #[error("the user's privacy settings do not allow this invite")]
    PrivacyRestricted,

    #[error("login code expired or invalid")]
    CodeInvalid,

    #[error("remote error: {0}")]
    Remote(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

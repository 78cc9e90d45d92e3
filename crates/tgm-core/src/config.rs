use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{errors::Error, Result};

/// Typed configuration, loaded from the environment (with `.env` support).
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    /// Directory holding admins.json / settings.json / accounts.json.
    pub data_dir: PathBuf,
    /// Dialog page size used when listing an account's groups.
    pub dialog_page_size: usize,
    /// Default fixed delay between invites, used until an operator sets one.
    pub default_delay_secs: u64,
    /// Run against the in-process sandbox user-client instead of a real
    /// MTProto backend.
    pub sandbox: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let data_dir = env_path("TGM_DATA_DIR").unwrap_or_else(|| PathBuf::from("./data"));
        fs::create_dir_all(&data_dir)?;

        let dialog_page_size = env_usize("TGM_DIALOG_PAGE_SIZE").unwrap_or(200);
        let default_delay_secs = env_u64("TGM_DEFAULT_DELAY_SECS").unwrap_or(60).max(1);
        let sandbox = env_bool("TGM_SANDBOX").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            data_dir,
            dialog_page_size,
            default_delay_secs,
            sandbox,
        })
    }
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
        // Strip optional surrounding quotes.
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

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

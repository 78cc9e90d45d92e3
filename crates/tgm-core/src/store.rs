//! Persistent record store: three small JSON documents under a data dir.
//!
//! Loads tolerate missing or unreadable files by falling back to defaults so
//! a first run starts from an empty state; saves are write-through on every
//! mutation.

use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{Account, DelayPolicy},
    Result,
};

pub const ADMINS_FILE: &str = "admins.json";
pub const SETTINGS_FILE: &str = "settings.json";
pub const ACCOUNTS_FILE: &str = "accounts.json";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdminsDoc {
    pub admins: Vec<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettingsDoc {
    pub delay: DelayPolicy,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AccountsDoc {
    /// Name of the active inviter account, if any.
    pub active: Option<String>,
    /// Registration order is meaningful: invite partitions are assigned to
    /// inviter accounts in this order.
    pub accounts: Vec<Account>,
}

/// Durable record store consumed by the registry, admin roster, and delay
/// settings. Single-process, immediately consistent.
pub trait RecordStore: Send + Sync {
    fn load_admins(&self) -> AdminsDoc;
    fn save_admins(&self, doc: &AdminsDoc) -> Result<()>;

    fn load_settings(&self) -> Option<SettingsDoc>;
    fn save_settings(&self, doc: &SettingsDoc) -> Result<()>;

    fn load_accounts(&self) -> AccountsDoc;
    fn save_accounts(&self, doc: &AccountsDoc) -> Result<()>;
}

/// JSON-file implementation of [`RecordStore`].
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn read<T: Default + for<'de> Deserialize<'de>>(&self, file: &str) -> T {
        self.read_opt(file).unwrap_or_default()
    }

    fn read_opt<T: for<'de> Deserialize<'de>>(&self, file: &str) -> Option<T> {
        let path = self.dir.join(file);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("ignoring unreadable {file}: {e}");
                None
            }
        }
    }

    fn write<T: Serialize>(&self, file: &str, doc: &T) -> Result<()> {
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl RecordStore for JsonStore {
    fn load_admins(&self) -> AdminsDoc {
        self.read(ADMINS_FILE)
    }

    fn save_admins(&self, doc: &AdminsDoc) -> Result<()> {
        self.write(ADMINS_FILE, doc)
    }

    fn load_settings(&self) -> Option<SettingsDoc> {
        self.read_opt(SETTINGS_FILE)
    }

    fn save_settings(&self, doc: &SettingsDoc) -> Result<()> {
        self.write(SETTINGS_FILE, doc)
    }

    fn load_accounts(&self) -> AccountsDoc {
        self.read(ACCOUNTS_FILE)
    }

    fn save_accounts(&self, doc: &AccountsDoc) -> Result<()> {
        self.write(ACCOUNTS_FILE, doc)
    }
}

#[cfg(test)]
pub(crate) fn temp_store(tag: &str) -> JsonStore {
    let dir = std::path::PathBuf::from(format!("/tmp/tgm-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    JsonStore::new(dir)
}

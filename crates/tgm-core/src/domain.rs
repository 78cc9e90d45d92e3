use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// What a registered account is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Inviter,
    Exporter,
}

impl AccountKind {
    pub fn label(self) -> &'static str {
        match self {
            AccountKind::Inviter => "inviter",
            AccountKind::Exporter => "exporter",
        }
    }
}

/// A registered user account.
///
/// `session_token` is the opaque serialized authentication state produced by
/// the user-client backend at sign-in; the registry never interprets it.
/// Names are unique within a kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub name: String,
    pub phone: String,
    pub api_id: i32,
    pub api_hash: String,
    pub session_token: String,
    pub kind: AccountKind,
}

/// One row of an uploaded invitee list.
///
/// `handle` may be empty; in that case `user_id`/`access_hash` address the
/// user directly and no handle lookup is attempted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InviteeRecord {
    pub handle: String,
    pub user_id: i64,
    pub access_hash: i64,
}

impl InviteeRecord {
    /// Operator-facing label for progress reports.
    pub fn label(&self) -> String {
        if self.handle.is_empty() {
            format!("id:{}", self.user_id)
        } else {
            self.handle.clone()
        }
    }
}

/// One dialog as returned by the user-client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSummary {
    pub id: i64,
    pub access_hash: i64,
    pub title: String,
    /// Telegram's "megagroup" flag: a multi-member supergroup, as opposed to
    /// a basic group or broadcast channel.
    pub megagroup: bool,
}

/// The group selected as the destination of invitation runs.
///
/// Captured once at selection time and reused verbatim; a stale access hash
/// surfaces as a per-item invite error, not a pre-check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetGroup {
    pub id: i64,
    pub access_hash: i64,
    pub title: String,
}

/// One member of an exported chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub handle: Option<String>,
    pub user_id: i64,
    pub access_hash: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Participant {
    pub fn display_name(&self) -> String {
        let mut parts = Vec::new();
        if let Some(f) = self.first_name.as_deref() {
            if !f.is_empty() {
                parts.push(f);
            }
        }
        if let Some(l) = self.last_name.as_deref() {
            if !l.is_empty() {
                parts.push(l);
            }
        }
        parts.join(" ")
    }
}

/// Pacing between invite attempts, process-wide.
///
/// Mutated by operator command; every worker resolves it fresh before each
/// sleep, so a change takes effect on the next sleep, not retroactively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DelayPolicy {
    Fixed { seconds: u64 },
    RandomRange { low_seconds: u64, high_seconds: u64 },
}

impl DelayPolicy {
    pub fn describe(&self) -> String {
        match self {
            DelayPolicy::Fixed { seconds } => format!("{seconds}s between invites"),
            DelayPolicy::RandomRange {
                low_seconds,
                high_seconds,
            } => format!("{low_seconds}-{high_seconds}s (random) between invites"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invitee_label_prefers_handle() {
        let with_handle = InviteeRecord {
            handle: "alice".to_string(),
            user_id: 7,
            access_hash: 1,
        };
        assert_eq!(with_handle.label(), "alice");

        let direct = InviteeRecord {
            handle: String::new(),
            user_id: 7,
            access_hash: 1,
        };
        assert_eq!(direct.label(), "id:7");
    }

    #[test]
    fn display_name_joins_non_empty_parts() {
        let p = Participant {
            handle: None,
            user_id: 1,
            access_hash: 0,
            first_name: Some("Ada".to_string()),
            last_name: None,
        };
        assert_eq!(p.display_name(), "Ada");

        let q = Participant {
            handle: None,
            user_id: 2,
            access_hash: 0,
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
        };
        assert_eq!(q.display_name(), "Ada Lovelace");
    }
}

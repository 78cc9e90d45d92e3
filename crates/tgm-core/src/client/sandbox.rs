//! Deterministic in-process user-client.
//!
//! Backs the test suite and `TGM_SANDBOX=1` dry runs. A shared
//! [`SandboxWorld`] scripts per-phone and per-user behavior (two-factor
//! prompts, dead sessions, privacy rejections, flood quotas) and records
//! everything the connections did so tests can assert on it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    client::{ChatInfo, ClientFactory, CodeToken, PeerRef, SessionToken, SignIn, UserConnection},
    domain::{Account, GroupSummary, Participant},
    Error, Result,
};

#[derive(Clone, Debug)]
pub struct ChatRoster {
    pub title: String,
    pub members: Vec<Participant>,
}

#[derive(Debug, Default)]
pub struct SandboxWorld {
    // Scripting knobs.
    /// When set, any other login code is rejected as invalid.
    pub expected_code: Option<String>,
    pub two_factor_phones: HashSet<String>,
    /// When set, any other two-factor password is rejected.
    pub two_factor_password: Option<String>,
    pub send_code_fail_phones: HashSet<String>,
    /// Phones whose stored session has been revoked server-side.
    pub dead_sessions: HashSet<String>,
    pub dialogs: Vec<GroupSummary>,
    /// handle -> (user_id, access_hash); unknown handles get a synthetic id.
    pub handles: HashMap<String, (i64, i64)>,
    pub privacy_user_ids: HashSet<i64>,
    pub failing_user_ids: HashSet<i64>,
    /// phone -> number of successful invites allowed before flood.
    pub flood_after: HashMap<String, usize>,
    pub chats: HashMap<i64, ChatRoster>,

    // Observations.
    pub sent_codes: Vec<String>,
    pub invited: Vec<(String, i64)>,
    pub logged_out: Vec<String>,
    pub opened: usize,
    pub closed: usize,

    invite_counts: HashMap<String, usize>,
}

#[derive(Clone, Default)]
pub struct SandboxClientFactory {
    world: Arc<Mutex<SandboxWorld>>,
}

impl SandboxClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the shared world (test scripting).
    pub async fn script<F: FnOnce(&mut SandboxWorld)>(&self, f: F) {
        let mut world = self.world.lock().await;
        f(&mut world);
    }

    /// Inspect the shared world (test assertions).
    pub async fn observe<R, F: FnOnce(&SandboxWorld) -> R>(&self, f: F) -> R {
        let world = self.world.lock().await;
        f(&world)
    }
}

#[async_trait]
impl ClientFactory for SandboxClientFactory {
    async fn open_login(&self, _api_id: i32, _api_hash: &str) -> Result<Box<dyn UserConnection>> {
        let mut world = self.world.lock().await;
        world.opened += 1;
        Ok(Box::new(SandboxConnection {
            world: self.world.clone(),
            phone: None,
            authorized: false,
            connected: true,
        }))
    }

    async fn open_session(&self, account: &Account) -> Result<Box<dyn UserConnection>> {
        let mut world = self.world.lock().await;
        world.opened += 1;
        let authorized = !world.dead_sessions.contains(&account.phone);
        Ok(Box::new(SandboxConnection {
            world: self.world.clone(),
            phone: Some(account.phone.clone()),
            authorized,
            connected: true,
        }))
    }
}

struct SandboxConnection {
    world: Arc<Mutex<SandboxWorld>>,
    phone: Option<String>,
    authorized: bool,
    connected: bool,
}

impl SandboxConnection {
    fn phone(&self) -> Result<&str> {
        self.phone
            .as_deref()
            .ok_or_else(|| Error::Remote("sandbox: no phone bound to this connection".to_string()))
    }
}

fn synthetic_id(handle: &str) -> i64 {
    handle
        .bytes()
        .fold(7i64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as i64))
        .abs()
}

#[async_trait]
impl UserConnection for SandboxConnection {
    async fn is_authorized(&mut self) -> Result<bool> {
        Ok(self.authorized)
    }

    async fn send_code(&mut self, phone: &str) -> Result<CodeToken> {
        let mut world = self.world.lock().await;
        if world.send_code_fail_phones.contains(phone) {
            return Err(Error::Remote(format!(
                "sandbox: phone {phone} rejected by platform"
            )));
        }
        world.sent_codes.push(phone.to_string());
        self.phone = Some(phone.to_string());
        Ok(CodeToken(format!("code:{phone}")))
    }

    async fn sign_in_code(
        &mut self,
        phone: &str,
        code: &str,
        token: &CodeToken,
    ) -> Result<SignIn> {
        let world = self.world.lock().await;
        if token.0 != format!("code:{phone}") {
            return Err(Error::Remote("sandbox: stale code token".to_string()));
        }
        if let Some(expected) = &world.expected_code {
            if code != expected {
                return Err(Error::CodeInvalid);
            }
        }
        if world.two_factor_phones.contains(phone) {
            return Ok(SignIn::SecondFactorRequired);
        }
        drop(world);
        self.authorized = true;
        Ok(SignIn::Authorized(SessionToken(phone.to_string())))
    }

    async fn sign_in_password(&mut self, password: &str) -> Result<SessionToken> {
        let phone = self.phone()?.to_string();
        let world = self.world.lock().await;
        if let Some(expected) = &world.two_factor_password {
            if password != expected {
                return Err(Error::Remote("sandbox: bad two-factor password".to_string()));
            }
        }
        drop(world);
        self.authorized = true;
        Ok(SessionToken(phone))
    }

    async fn list_dialogs(&mut self, limit: usize) -> Result<Vec<GroupSummary>> {
        let world = self.world.lock().await;
        Ok(world.dialogs.iter().take(limit).cloned().collect())
    }

    async fn resolve_handle(&mut self, handle: &str) -> Result<PeerRef> {
        let handle = handle.trim_start_matches('@');
        let world = self.world.lock().await;
        let (id, access_hash) = world
            .handles
            .get(handle)
            .copied()
            .unwrap_or_else(|| (synthetic_id(handle), 0));
        Ok(PeerRef::User { id, access_hash })
    }

    async fn resolve_chat(&mut self, chat_id: i64) -> Result<ChatInfo> {
        let world = self.world.lock().await;
        let roster = world
            .chats
            .get(&chat_id)
            .ok_or_else(|| Error::Remote(format!("sandbox: unknown chat {chat_id}")))?;
        Ok(ChatInfo {
            peer: PeerRef::Channel {
                id: chat_id,
                access_hash: 100,
            },
            title: roster.title.clone(),
        })
    }

    async fn invite(&mut self, _group: &PeerRef, user: &PeerRef) -> Result<()> {
        if !self.authorized {
            return Err(Error::Remote("sandbox: connection not authorized".to_string()));
        }
        let phone = self.phone()?.to_string();
        let user_id = match user {
            PeerRef::User { id, .. } => *id,
            PeerRef::Channel { .. } => {
                return Err(Error::Remote("sandbox: invitee is not a user".to_string()))
            }
        };

        let mut world = self.world.lock().await;
        let done = world.invite_counts.get(&phone).copied().unwrap_or(0);
        if let Some(&quota) = world.flood_after.get(&phone) {
            if done >= quota {
                return Err(Error::RateLimited);
            }
        }
        if world.privacy_user_ids.contains(&user_id) {
            return Err(Error::PrivacyRestricted);
        }
        if world.failing_user_ids.contains(&user_id) {
            return Err(Error::Remote("sandbox: internal server error".to_string()));
        }
        world.invited.push((phone.clone(), user_id));
        *world.invite_counts.entry(phone).or_insert(0) += 1;
        Ok(())
    }

    async fn list_participants(
        &mut self,
        chat: &PeerRef,
        _exhaustive: bool,
    ) -> Result<Vec<Participant>> {
        let chat_id = match chat {
            PeerRef::Channel { id, .. } => *id,
            PeerRef::User { .. } => {
                return Err(Error::Remote("sandbox: not a chat".to_string()))
            }
        };
        let world = self.world.lock().await;
        let roster = world
            .chats
            .get(&chat_id)
            .ok_or_else(|| Error::Remote(format!("sandbox: unknown chat {chat_id}")))?;
        Ok(roster.members.clone())
    }

    async fn log_out(&mut self) -> Result<()> {
        let phone = self.phone()?.to_string();
        let mut world = self.world.lock().await;
        world.logged_out.push(phone);
        drop(world);
        self.authorized = false;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            let mut world = self.world.lock().await;
            world.closed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(phone: &str) -> Account {
        Account {
            id: 1,
            name: "a".to_string(),
            phone: phone.to_string(),
            api_id: 1,
            api_hash: "h".to_string(),
            session_token: phone.to_string(),
            kind: crate::domain::AccountKind::Inviter,
        }
    }

    #[tokio::test]
    async fn flood_quota_applies_per_phone() {
        let factory = SandboxClientFactory::new();
        factory
            .script(|w| {
                w.flood_after.insert("+1".to_string(), 1);
            })
            .await;

        let mut conn = factory.open_session(&account("+1")).await.unwrap();
        let group = PeerRef::Channel {
            id: 5,
            access_hash: 0,
        };
        let user = |id| PeerRef::User { id, access_hash: 0 };

        assert!(conn.invite(&group, &user(10)).await.is_ok());
        assert!(matches!(
            conn.invite(&group, &user(11)).await,
            Err(Error::RateLimited)
        ));
        conn.disconnect().await;

        assert_eq!(factory.observe(|w| w.invited.clone()).await, vec![("+1".to_string(), 10)]);
        assert_eq!(factory.observe(|w| (w.opened, w.closed)).await, (1, 1));
    }

    #[tokio::test]
    async fn dead_session_opens_unauthorized() {
        let factory = SandboxClientFactory::new();
        factory
            .script(|w| {
                w.dead_sessions.insert("+2".to_string());
            })
            .await;

        let mut conn = factory.open_session(&account("+2")).await.unwrap();
        assert!(!conn.is_authorized().await.unwrap());
        conn.disconnect().await;
    }
}

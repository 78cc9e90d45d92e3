//! Port for the Telegram *user-client* (MTProto) backend.
//!
//! The orchestration logic only ever talks to these traits; the real wire
//! implementation is an external collaborator. [`sandbox`] provides a
//! deterministic in-process implementation for tests and dry runs.

use async_trait::async_trait;

use crate::{
    domain::{Account, GroupSummary, Participant},
    Result,
};

pub mod sandbox;

/// Correlation token returned by `send_code`, required to submit the code.
#[derive(Clone, Debug)]
pub struct CodeToken(pub String);

/// Opaque serialized authentication state for a signed-in account.
#[derive(Clone, Debug)]
pub struct SessionToken(pub String);

/// A platform-addressable peer reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerRef {
    User { id: i64, access_hash: i64 },
    Channel { id: i64, access_hash: i64 },
}

/// A resolved chat plus its display title.
#[derive(Clone, Debug)]
pub struct ChatInfo {
    pub peer: PeerRef,
    pub title: String,
}

/// Outcome of submitting a login code.
#[derive(Debug)]
pub enum SignIn {
    Authorized(SessionToken),
    SecondFactorRequired,
}

/// One live connection to Telegram on behalf of one account.
///
/// A connection is owned exclusively by whoever opened it (a wizard or a
/// worker) and must be released with `disconnect` on every exit path.
#[async_trait]
pub trait UserConnection: Send {
    async fn is_authorized(&mut self) -> Result<bool>;

    /// Request a one-time login code for `phone`.
    async fn send_code(&mut self, phone: &str) -> Result<CodeToken>;

    /// Submit the login code. Expired/invalid codes surface as
    /// [`crate::Error::CodeInvalid`]; an account with two-factor auth enabled
    /// yields [`SignIn::SecondFactorRequired`] and the connection stays open
    /// for `sign_in_password`.
    async fn sign_in_code(&mut self, phone: &str, code: &str, token: &CodeToken)
        -> Result<SignIn>;

    async fn sign_in_password(&mut self, password: &str) -> Result<SessionToken>;

    /// Most recent dialogs, up to `limit`, in the platform's order.
    async fn list_dialogs(&mut self, limit: usize) -> Result<Vec<GroupSummary>>;

    async fn resolve_handle(&mut self, handle: &str) -> Result<PeerRef>;

    async fn resolve_chat(&mut self, chat_id: i64) -> Result<ChatInfo>;

    /// Invite one user to a group. Flood and privacy rejections surface as
    /// [`crate::Error::RateLimited`] and [`crate::Error::PrivacyRestricted`].
    async fn invite(&mut self, group: &PeerRef, user: &PeerRef) -> Result<()>;

    /// Enumerate a chat's members; `exhaustive` crosses the standard
    /// visibility limit for large chats.
    async fn list_participants(
        &mut self,
        chat: &PeerRef,
        exhaustive: bool,
    ) -> Result<Vec<Participant>>;

    /// Revoke the server-side session (exporter deletion path).
    async fn log_out(&mut self) -> Result<()>;

    async fn disconnect(&mut self);
}

/// Builds connections; the orchestration logic never touches session
/// serialization directly.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Fresh, unauthenticated connection for an onboarding flow.
    async fn open_login(&self, api_id: i32, api_hash: &str) -> Result<Box<dyn UserConnection>>;

    /// Connection rebuilt from an account's stored session token. Opening
    /// succeeds even if the session has been revoked; callers check
    /// `is_authorized` before doing work.
    async fn open_session(&self, account: &Account) -> Result<Box<dyn UserConnection>>;
}

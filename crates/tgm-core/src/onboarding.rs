//! Account onboarding wizard.
//!
//! Drives one account through credential collection, code verification, and
//! an optional two-factor step, ending in a persisted authenticated session.
//! The machine is an explicit step type with one transition per step, so it
//! is unit-testable without any chat transport.
//!
//! Invariant: a wizard holds at most one live unauthenticated connection,
//! and closes it on every terminal path (success, expiry, error, or
//! abandonment via [`WizardTable`]).

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::{
    client::{ClientFactory, CodeToken, SessionToken, SignIn, UserConnection},
    domain::{Account, AccountKind, UserId},
    registry::AccountRegistry,
    Error,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Name,
    ApiId,
    ApiHash,
    Phone,
    Code,
    TwoFactor,
}

/// Result of feeding one operator reply into a wizard.
#[derive(Debug)]
pub enum Advance {
    /// Stay in the wizard; send this prompt to the operator.
    Prompt(String),
    /// Terminal success; the account is registered.
    Done(String),
    /// Terminal failure; the wizard is discarded.
    Aborted(String),
}

pub struct Wizard {
    kind: AccountKind,
    step: Step,
    name: String,
    api_id: i32,
    api_hash: String,
    phone: String,
    conn: Option<Box<dyn UserConnection>>,
    code_token: Option<CodeToken>,
}

impl Wizard {
    pub fn new(kind: AccountKind) -> Self {
        Self {
            kind,
            step: Step::Name,
            name: String::new(),
            api_id: 0,
            api_hash: String::new(),
            phone: String::new(),
            conn: None,
            code_token: None,
        }
    }

    pub fn first_prompt(kind: AccountKind) -> String {
        format!(
            "Adding an {} account. Send a name for it (e.g. main or acc1):",
            kind.label()
        )
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Close the wizard's live connection, if any. Must be called before the
    /// wizard is discarded on any non-`advance` path.
    pub async fn abandon(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.disconnect().await;
        }
    }

    pub async fn advance(
        &mut self,
        text: &str,
        registry: &AccountRegistry,
        factory: &dyn ClientFactory,
    ) -> Advance {
        let text = text.trim();
        match self.step {
            Step::Name => {
                if text.is_empty() {
                    return Advance::Prompt("The name cannot be empty. Send another one:".into());
                }
                if registry.is_name_taken(self.kind, text).await {
                    return Advance::Prompt(
                        "That name is already taken. Send another one:".into(),
                    );
                }
                self.name = text.to_string();
                self.step = Step::ApiId;
                Advance::Prompt("Now send the API_ID (a number):".into())
            }

            Step::ApiId => match text.parse::<i32>() {
                Ok(api_id) => {
                    self.api_id = api_id;
                    self.step = Step::ApiHash;
                    Advance::Prompt("Now send the API_HASH:".into())
                }
                Err(_) => Advance::Prompt("API_ID must be a number. Send it again:".into()),
            },

            Step::ApiHash => {
                self.api_hash = text.to_string();
                self.step = Step::Phone;
                Advance::Prompt(
                    "Send the account's phone number in international format (+1555...):".into(),
                )
            }

            Step::Phone => {
                self.phone = text.to_string();
                let mut conn = match factory.open_login(self.api_id, &self.api_hash).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        return Advance::Aborted(format!("Could not connect to Telegram: {e}"))
                    }
                };
                match conn.send_code(&self.phone).await {
                    Ok(token) => {
                        self.code_token = Some(token);
                        self.conn = Some(conn);
                        self.step = Step::Code;
                        Advance::Prompt(format!(
                            "A login code was sent to {}. Send it here (digits only):",
                            self.phone
                        ))
                    }
                    Err(e) => {
                        conn.disconnect().await;
                        Advance::Aborted(format!("Could not send the login code: {e}"))
                    }
                }
            }

            Step::Code => {
                let outcome = match (self.conn.as_mut(), self.code_token.as_ref()) {
                    (Some(conn), Some(token)) => {
                        conn.sign_in_code(&self.phone, text, token).await
                    }
                    _ => Err(Error::Remote("wizard lost its connection".to_string())),
                };
                match outcome {
                    Ok(SignIn::Authorized(session)) => self.finish(session, registry).await,
                    Ok(SignIn::SecondFactorRequired) => {
                        self.step = Step::TwoFactor;
                        Advance::Prompt(
                            "This account has two-factor auth enabled. Send the password:".into(),
                        )
                    }
                    Err(Error::CodeInvalid) => {
                        self.abandon().await;
                        Advance::Aborted(
                            "The code expired or was invalid. Start the wizard again.".into(),
                        )
                    }
                    Err(e) => {
                        self.abandon().await;
                        Advance::Aborted(format!("Sign-in failed: {e}"))
                    }
                }
            }

            Step::TwoFactor => {
                let outcome = match self.conn.as_mut() {
                    Some(conn) => conn.sign_in_password(text).await,
                    None => Err(Error::Remote("wizard lost its connection".to_string())),
                };
                match outcome {
                    Ok(session) => self.finish(session, registry).await,
                    Err(e) => {
                        self.abandon().await;
                        Advance::Aborted(format!("Two-factor sign-in failed: {e}"))
                    }
                }
            }
        }
    }

    async fn finish(&mut self, session: SessionToken, registry: &AccountRegistry) -> Advance {
        self.abandon().await;
        let account = Account {
            id: 0, // assigned by the registry
            name: self.name.clone(),
            phone: self.phone.clone(),
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            session_token: session.0,
            kind: self.kind,
        };
        match registry.insert(account).await {
            Ok(_) => Advance::Done(format!(
                "✅ Account '{}' is signed in and registered as an {}.",
                self.name,
                self.kind.label()
            )),
            Err(e) => Advance::Aborted(format!(
                "The account signed in but could not be registered: {e}"
            )),
        }
    }
}

/// In-progress wizards, one per operator.
#[derive(Default)]
pub struct WizardTable {
    inner: Mutex<HashMap<i64, Wizard>>,
}

impl WizardTable {
    /// Start (or restart) a wizard for this operator, returning the first
    /// prompt. A replaced wizard's connection is closed.
    pub async fn start(&self, operator: UserId, kind: AccountKind) -> String {
        let previous = {
            let mut map = self.inner.lock().await;
            map.insert(operator.0, Wizard::new(kind))
        };
        if let Some(mut old) = previous {
            old.abandon().await;
        }
        Wizard::first_prompt(kind)
    }

    pub async fn is_active(&self, operator: UserId) -> bool {
        self.inner.lock().await.contains_key(&operator.0)
    }

    /// Discard the operator's wizard, closing its connection.
    pub async fn cancel(&self, operator: UserId) -> bool {
        let taken = { self.inner.lock().await.remove(&operator.0) };
        match taken {
            Some(mut w) => {
                w.abandon().await;
                true
            }
            None => false,
        }
    }

    /// Feed one operator reply into their wizard. `None` when no wizard is
    /// in progress. Terminal advances drop the wizard.
    pub async fn advance(
        &self,
        operator: UserId,
        text: &str,
        registry: &AccountRegistry,
        factory: &dyn ClientFactory,
    ) -> Option<Advance> {
        let mut wizard = { self.inner.lock().await.remove(&operator.0)? };
        let advance = wizard.advance(text, registry, factory).await;
        if matches!(advance, Advance::Prompt(_)) {
            self.inner.lock().await.insert(operator.0, wizard);
        }
        Some(advance)
    }
}

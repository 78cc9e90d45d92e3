//! Account registry: the owned, injected home of all registered accounts.
//!
//! Mutated only by onboarding inserts and explicit delete/logout; workers
//! read credentials and never write. Registration order is preserved because
//! invite partitions are assigned to inviter accounts in that order.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    client::ClientFactory,
    domain::{Account, AccountKind},
    store::{AccountsDoc, RecordStore},
    Error, Result,
};

pub struct AccountRegistry {
    store: Arc<dyn RecordStore>,
    state: Mutex<AccountsDoc>,
}

impl AccountRegistry {
    pub fn load(store: Arc<dyn RecordStore>) -> Self {
        let doc = store.load_accounts();
        Self {
            store,
            state: Mutex::new(doc),
        }
    }

    pub async fn is_name_taken(&self, kind: AccountKind, name: &str) -> bool {
        let st = self.state.lock().await;
        st.accounts.iter().any(|a| a.kind == kind && a.name == name)
    }

    /// Insert a freshly onboarded account. The first successfully onboarded
    /// inviter becomes the active one if none is set. Returns the assigned id.
    pub async fn insert(&self, mut account: Account) -> Result<u64> {
        let mut st = self.state.lock().await;
        if st
            .accounts
            .iter()
            .any(|a| a.kind == account.kind && a.name == account.name)
        {
            return Err(Error::Input(format!(
                "an {} account named '{}' already exists",
                account.kind.label(),
                account.name
            )));
        }

        account.id = st.accounts.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        let id = account.id;
        if account.kind == AccountKind::Inviter && st.active.is_none() {
            st.active = Some(account.name.clone());
        }
        st.accounts.push(account);
        self.store.save_accounts(&st)?;
        Ok(id)
    }

    /// Remove an account from the registry. Does not revoke any server-side
    /// session; see [`AccountRegistry::logout`] for the exporter path.
    pub async fn delete(&self, kind: AccountKind, name: &str) -> Result<Account> {
        let mut st = self.state.lock().await;
        let idx = st
            .accounts
            .iter()
            .position(|a| a.kind == kind && a.name == name)
            .ok_or_else(|| {
                Error::Input(format!("no {} account named '{name}'", kind.label()))
            })?;
        let removed = st.accounts.remove(idx);
        if kind == AccountKind::Inviter && st.active.as_deref() == Some(name) {
            st.active = None;
        }
        self.store.save_accounts(&st)?;
        Ok(removed)
    }

    /// Log an exporter account out server-side, then remove it.
    pub async fn logout(&self, name: &str, factory: &dyn ClientFactory) -> Result<Account> {
        let account = self
            .get(AccountKind::Exporter, name)
            .await
            .ok_or_else(|| Error::Input(format!("no exporter account named '{name}'")))?;

        let mut conn = factory.open_session(&account).await?;
        let logout = conn.log_out().await;
        conn.disconnect().await;
        logout?;

        self.delete(AccountKind::Exporter, name).await
    }

    pub async fn get(&self, kind: AccountKind, name: &str) -> Option<Account> {
        let st = self.state.lock().await;
        st.accounts
            .iter()
            .find(|a| a.kind == kind && a.name == name)
            .cloned()
    }

    /// Accounts of one kind, in registration order.
    pub async fn list(&self, kind: AccountKind) -> Vec<Account> {
        let st = self.state.lock().await;
        st.accounts
            .iter()
            .filter(|a| a.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn active_inviter(&self) -> Option<Account> {
        let st = self.state.lock().await;
        let name = st.active.as_deref()?;
        st.accounts
            .iter()
            .find(|a| a.kind == AccountKind::Inviter && a.name == name)
            .cloned()
    }

    pub async fn set_active(&self, name: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        if !st
            .accounts
            .iter()
            .any(|a| a.kind == AccountKind::Inviter && a.name == name)
        {
            return Err(Error::Input(format!("no inviter account named '{name}'")));
        }
        st.active = Some(name.to_string());
        self.store.save_accounts(&st)?;
        Ok(())
    }
}

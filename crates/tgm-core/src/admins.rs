//! Admin roster: numeric Telegram user ids allowed to drive the bot.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    domain::UserId,
    store::{AdminsDoc, RecordStore},
    Error, Result,
};

pub struct AdminRoster {
    store: Arc<dyn RecordStore>,
    state: Mutex<AdminsDoc>,
}

impl AdminRoster {
    pub fn load(store: Arc<dyn RecordStore>) -> Self {
        let doc = store.load_admins();
        Self {
            store,
            state: Mutex::new(doc),
        }
    }

    pub async fn is_admin(&self, user: UserId) -> bool {
        let st = self.state.lock().await;
        st.admins.contains(&user.0)
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.admins.is_empty()
    }

    /// Self-registration, only allowed while no admin exists yet.
    pub async fn bootstrap(&self, user: UserId) -> Result<()> {
        let mut st = self.state.lock().await;
        if !st.admins.is_empty() {
            return Err(Error::Input(
                "an admin is already registered; ask them to add you".to_string(),
            ));
        }
        st.admins.push(user.0);
        self.store.save_admins(&st)?;
        Ok(())
    }

    pub async fn add(&self, user: UserId) -> Result<()> {
        let mut st = self.state.lock().await;
        if !st.admins.contains(&user.0) {
            st.admins.push(user.0);
            self.store.save_admins(&st)?;
        }
        Ok(())
    }

    pub async fn remove(&self, user: UserId) -> Result<()> {
        let mut st = self.state.lock().await;
        let Some(idx) = st.admins.iter().position(|&a| a == user.0) else {
            return Err(Error::Input("that id is not an admin".to_string()));
        };
        st.admins.remove(idx);
        self.store.save_admins(&st)?;
        Ok(())
    }

    pub async fn list(&self) -> Vec<i64> {
        self.state.lock().await.admins.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::temp_store;

    #[tokio::test]
    async fn bootstrap_only_while_empty() {
        let roster = AdminRoster::load(Arc::new(temp_store("admins-boot")));
        roster.bootstrap(UserId(1)).await.unwrap();
        assert!(roster.is_admin(UserId(1)).await);

        let second = roster.bootstrap(UserId(2)).await;
        assert!(matches!(second, Err(Error::Input(_))));
        assert!(!roster.is_admin(UserId(2)).await);
    }

    #[tokio::test]
    async fn add_and_remove_persist() {
        let store = Arc::new(temp_store("admins-roundtrip"));
        let roster = AdminRoster::load(store.clone());
        roster.add(UserId(10)).await.unwrap();
        roster.add(UserId(11)).await.unwrap();
        roster.remove(UserId(10)).await.unwrap();

        let reloaded = AdminRoster::load(store);
        assert!(!reloaded.is_admin(UserId(10)).await);
        assert!(reloaded.is_admin(UserId(11)).await);
    }
}

//! Destination group discovery and selection.
//!
//! Lists the active inviter's dialogs, keeps the supergroup page cached, and
//! turns a numeric operator reply into the selected target group. The
//! selection survives until the next listing overwrites it.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    client::ClientFactory,
    domain::{Account, GroupSummary, TargetGroup},
    Error, Result,
};

#[derive(Default)]
struct ResolverState {
    cache: Vec<GroupSummary>,
    selected: Option<TargetGroup>,
    awaiting_selection: bool,
}

pub struct TargetResolver {
    factory: Arc<dyn ClientFactory>,
    page_size: usize,
    state: Mutex<ResolverState>,
}

impl TargetResolver {
    pub fn new(factory: Arc<dyn ClientFactory>, page_size: usize) -> Self {
        Self {
            factory,
            page_size,
            state: Mutex::new(ResolverState::default()),
        }
    }

    /// Fetch the account's recent dialogs and cache the supergroups among
    /// them, 0-indexed for the operator. Overwrites any previous listing.
    pub async fn list_groups(&self, account: &Account) -> Result<Vec<GroupSummary>> {
        let mut conn = self.factory.open_session(account).await?;
        if !conn.is_authorized().await? {
            conn.disconnect().await;
            return Err(Error::AuthExpired {
                account: account.name.clone(),
            });
        }
        let dialogs = conn.list_dialogs(self.page_size).await;
        conn.disconnect().await;

        let groups: Vec<GroupSummary> = dialogs?
            .into_iter()
            .filter(|d| d.megagroup)
            .collect();

        let mut st = self.state.lock().await;
        st.cache = groups.clone();
        st.awaiting_selection = !groups.is_empty();
        Ok(groups)
    }

    /// Resolve a 0-based index from the last listing into the target group.
    pub async fn select_group(&self, index: usize) -> Result<TargetGroup> {
        let mut st = self.state.lock().await;
        if st.cache.is_empty() {
            return Err(Error::Input(
                "no group listing to pick from; list the groups first".to_string(),
            ));
        }
        let group = st.cache.get(index).ok_or_else(|| {
            Error::Input(format!(
                "pick a number between 0 and {}",
                st.cache.len() - 1
            ))
        })?;
        let target = TargetGroup {
            id: group.id,
            access_hash: group.access_hash,
            title: group.title.clone(),
        };
        st.selected = Some(target.clone());
        st.awaiting_selection = false;
        Ok(target)
    }

    pub async fn selected(&self) -> Option<TargetGroup> {
        self.state.lock().await.selected.clone()
    }

    /// True between a successful listing and a successful selection; the
    /// conversational layer treats numeric replies as picks while set.
    pub async fn awaiting_selection(&self) -> bool {
        self.state.lock().await.awaiting_selection
    }
}

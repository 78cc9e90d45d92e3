//! Concurrent invitation runs.
//!
//! One run per destination chat: the invitee list is split round-robin
//! across every registered inviter account, one worker task per account,
//! all rate-limited by the shared delay policy and stoppable through a
//! single [`CancellationToken`].
//!
//! Failure isolation: a flood limit stops only the account that hit it,
//! its remaining items are dropped, and sibling workers keep going.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    client::{ClientFactory, PeerRef, UserConnection},
    delay::DelaySettings,
    domain::{Account, ChatId, InviteeRecord, TargetGroup},
    formatting::escape_html,
    groups::TargetResolver,
    messaging::MessagingPort,
    partition::round_robin,
    registry::AccountRegistry,
    Error, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Cancelled,
}

struct JobHandle {
    cancel: CancellationToken,
}

pub struct InviteOrchestrator {
    registry: Arc<AccountRegistry>,
    resolver: Arc<TargetResolver>,
    delay: Arc<DelaySettings>,
    factory: Arc<dyn ClientFactory>,
    jobs: Mutex<HashMap<i64, JobHandle>>,
}

impl InviteOrchestrator {
    pub fn new(
        registry: Arc<AccountRegistry>,
        resolver: Arc<TargetResolver>,
        delay: Arc<DelaySettings>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            registry,
            resolver,
            delay,
            factory,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_active(&self, destination: ChatId) -> bool {
        self.jobs.lock().await.contains_key(&destination.0)
    }

    /// Request cancellation of the destination's run. Returns false when no
    /// run is active. Workers stop at their next check; in-flight invite
    /// calls are never interrupted mid-request.
    pub async fn cancel(&self, destination: ChatId) -> bool {
        let jobs = self.jobs.lock().await;
        match jobs.get(&destination.0) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Run an invitation job to completion (or cancellation), streaming
    /// per-item progress to `messenger`. At most one run per destination.
    pub async fn start(
        &self,
        destination: ChatId,
        items: Vec<InviteeRecord>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Result<JobStatus> {
        let target = self
            .resolver
            .selected()
            .await
            .ok_or_else(|| Error::Config("no destination group selected".to_string()))?;
        let accounts = self.registry.list(crate::domain::AccountKind::Inviter).await;
        if accounts.is_empty() {
            return Err(Error::Config(
                "no inviter accounts registered".to_string(),
            ));
        }
        if items.is_empty() {
            return Err(Error::Input("the invitee list is empty".to_string()));
        }

        let cancel = CancellationToken::new();
        {
            let mut jobs = self.jobs.lock().await;
            if jobs.contains_key(&destination.0) {
                return Err(Error::Input(
                    "a run is already active for this chat; cancel it first".to_string(),
                ));
            }
            jobs.insert(
                destination.0,
                JobHandle {
                    cancel: cancel.clone(),
                },
            );
        }

        report(
            &*messenger,
            destination,
            &format!(
                "🚀 Starting: {} invitees across {} account(s) into <b>{}</b>.",
                items.len(),
                accounts.len(),
                escape_html(&target.title)
            ),
        )
        .await;

        let partitions = round_robin(items, accounts.len());
        let mut handles = Vec::new();
        for (account, bucket) in accounts.into_iter().zip(partitions) {
            if bucket.is_empty() {
                continue;
            }
            let worker = Worker {
                account,
                target: target.clone(),
                cancel: cancel.clone(),
                delay: self.delay.clone(),
                factory: self.factory.clone(),
                messenger: messenger.clone(),
                chat: destination,
            };
            handles.push(tokio::spawn(worker.run(bucket)));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "invite worker panicked");
            }
        }

        self.jobs.lock().await.remove(&destination.0);

        let status = if cancel.is_cancelled() {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        let summary = match status {
            JobStatus::Completed => "🏁 Run finished.",
            JobStatus::Cancelled => "🛑 Run cancelled.",
        };
        report(&*messenger, destination, summary).await;
        Ok(status)
    }
}

struct Worker {
    account: Account,
    target: TargetGroup,
    cancel: CancellationToken,
    delay: Arc<DelaySettings>,
    factory: Arc<dyn ClientFactory>,
    messenger: Arc<dyn MessagingPort>,
    chat: ChatId,
}

impl Worker {
    async fn run(self, bucket: Vec<InviteeRecord>) {
        let mut conn = match self.factory.open_session(&self.account).await {
            Ok(conn) => conn,
            Err(e) => {
                self.report(&format!(
                    "⚠️ [{}] could not connect: {}",
                    escape_html(&self.account.name),
                    escape_html(&e.to_string())
                ))
                .await;
                return;
            }
        };
        self.invite_all(conn.as_mut(), bucket).await;
        conn.disconnect().await;
    }

    async fn invite_all(&self, conn: &mut dyn UserConnection, bucket: Vec<InviteeRecord>) {
        let name = escape_html(&self.account.name);
        match conn.is_authorized().await {
            Ok(true) => {}
            Ok(false) => {
                self.report(&format!(
                    "⚠️ [{name}] session expired; log this account in again. Its items were skipped."
                ))
                .await;
                return;
            }
            Err(e) => {
                self.report(&format!("⚠️ [{name}] authorization check failed: {}", escape_html(&e.to_string())))
                    .await;
                return;
            }
        }

        let group = PeerRef::Channel {
            id: self.target.id,
            access_hash: self.target.access_hash,
        };

        for item in bucket {
            if self.cancel.is_cancelled() {
                self.report(&format!("🛑 [{name}] stopping: run cancelled.")).await;
                return;
            }
            let label = escape_html(&item.label());

            let peer = if item.handle.is_empty() {
                PeerRef::User {
                    id: item.user_id,
                    access_hash: item.access_hash,
                }
            } else {
                match conn.resolve_handle(&item.handle).await {
                    Ok(peer) => peer,
                    Err(e) => {
                        self.report(&format!(
                            "⚠️ [{name}] could not resolve {label}: {}",
                            escape_html(&e.to_string())
                        ))
                        .await;
                        continue;
                    }
                }
            };

            match conn.invite(&group, &peer).await {
                Ok(()) => {
                    self.report(&format!("✅ [{name}] invited {label}.")).await;
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.report(&format!("🛑 [{name}] stopping: run cancelled.")).await;
                            return;
                        }
                        _ = tokio::time::sleep(self.delay.next_delay()) => {}
                    }
                }
                Err(Error::RateLimited) => {
                    self.report(&format!(
                        "⛔ [{name}] hit a flood limit; this account stops here. Remaining items were dropped."
                    ))
                    .await;
                    return;
                }
                Err(Error::PrivacyRestricted) => {
                    self.report(&format!(
                        "🔒 [{name}] skipped {label}: privacy settings forbid invites."
                    ))
                    .await;
                }
                Err(e) => {
                    tracing::warn!(account = %self.account.name, invitee = %item.label(), error = %e, "invite failed");
                    self.report(&format!(
                        "⚠️ [{name}] skipped {label}: {}",
                        escape_html(&e.to_string())
                    ))
                    .await;
                }
            }
        }
    }

    async fn report(&self, text: &str) {
        report(&*self.messenger, self.chat, text).await;
    }
}

async fn report(messenger: &dyn MessagingPort, chat: ChatId, text: &str) {
    if let Err(e) = messenger.send_html(chat, text).await {
        tracing::warn!(error = %e, "progress report failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::client::sandbox::SandboxClientFactory;
    use crate::domain::{AccountKind, GroupSummary};
    use crate::messaging::test_support::RecordingMessenger;
    use crate::store::temp_store;

    struct Fixture {
        orchestrator: Arc<InviteOrchestrator>,
        factory: SandboxClientFactory,
        messenger: Arc<RecordingMessenger>,
    }

    const DEST: ChatId = ChatId(77);

    /// Registry with `names` inviter accounts (phone `+{name}`), a resolver
    /// with group 500 already selected, and a 1s fixed delay.
    async fn fixture(tag: &str, names: &[&str]) -> Fixture {
        let store = Arc::new(temp_store(tag));
        let registry = Arc::new(AccountRegistry::load(store.clone()));
        for name in names {
            registry
                .insert(Account {
                    id: 0,
                    name: name.to_string(),
                    phone: format!("+{name}"),
                    api_id: 1,
                    api_hash: "h".to_string(),
                    session_token: format!("+{name}"),
                    kind: AccountKind::Inviter,
                })
                .await
                .unwrap();
        }

        let factory = SandboxClientFactory::new();
        factory
            .script(|w| {
                w.dialogs = vec![GroupSummary {
                    id: 500,
                    access_hash: 5000,
                    title: "Crew".to_string(),
                    megagroup: true,
                }];
            })
            .await;

        let resolver = Arc::new(TargetResolver::new(Arc::new(factory.clone()), 50));
        if !names.is_empty() {
            let account = registry.list(AccountKind::Inviter).await.remove(0);
            resolver.list_groups(&account).await.unwrap();
            resolver.select_group(0).await.unwrap();
        }

        let delay = Arc::new(DelaySettings::load(store, 1));
        let orchestrator = Arc::new(InviteOrchestrator::new(
            registry,
            resolver,
            delay,
            Arc::new(factory.clone()),
        ));
        Fixture {
            orchestrator,
            factory,
            messenger: Arc::new(RecordingMessenger::default()),
        }
    }

    fn items(n: usize) -> Vec<InviteeRecord> {
        (0..n)
            .map(|i| InviteeRecord {
                handle: format!("u{i}"),
                user_id: 0,
                access_hash: 0,
            })
            .collect()
    }

    /// Map handle u{i} to user id 100 + i so assertions are readable.
    async fn script_handles(factory: &SandboxClientFactory, n: usize) {
        factory
            .script(|w| {
                for i in 0..n {
                    w.handles.insert(format!("u{i}"), (100 + i as i64, 0));
                }
            })
            .await;
    }

    async fn invited_by(factory: &SandboxClientFactory, phone: &str) -> Vec<i64> {
        factory
            .observe(|w| {
                w.invited
                    .iter()
                    .filter(|(p, _)| p == phone)
                    .map(|(_, id)| *id)
                    .collect()
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn seven_items_three_accounts_round_robin() {
        let fx = fixture("invite-rr", &["a", "b", "c"]).await;
        script_handles(&fx.factory, 7).await;

        let status = fx
            .orchestrator
            .start(DEST, items(7), fx.messenger.clone())
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(invited_by(&fx.factory, "+a").await, vec![100, 103, 106]);
        assert_eq!(invited_by(&fx.factory, "+b").await, vec![101, 104]);
        assert_eq!(invited_by(&fx.factory, "+c").await, vec![102, 105]);
        assert!(!fx.orchestrator.is_active(DEST).await);
        // list_groups + three workers, all released.
        assert_eq!(fx.factory.observe(|w| (w.opened, w.closed)).await, (4, 4));
    }

    #[tokio::test(start_paused = true)]
    async fn flood_stops_one_account_without_touching_siblings() {
        let fx = fixture("invite-flood", &["a", "b"]).await;
        script_handles(&fx.factory, 4).await;
        fx.factory
            .script(|w| {
                w.flood_after.insert("+a".to_string(), 1);
            })
            .await;

        let status = fx
            .orchestrator
            .start(DEST, items(4), fx.messenger.clone())
            .await
            .unwrap();

        // Account a invited u0 then dropped u2; b finished its bucket.
        assert_eq!(status, JobStatus::Completed);
        assert_eq!(invited_by(&fx.factory, "+a").await, vec![100]);
        assert_eq!(invited_by(&fx.factory, "+b").await, vec![101, 103]);
        assert!(fx
            .messenger
            .messages()
            .iter()
            .any(|m| m.contains("flood limit")));
    }

    #[tokio::test(start_paused = true)]
    async fn privacy_and_transient_errors_skip_only_that_item() {
        let fx = fixture("invite-skip", &["a"]).await;
        script_handles(&fx.factory, 3).await;
        fx.factory
            .script(|w| {
                w.privacy_user_ids.insert(100);
                w.failing_user_ids.insert(101);
            })
            .await;

        let status = fx
            .orchestrator
            .start(DEST, items(3), fx.messenger.clone())
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(invited_by(&fx.factory, "+a").await, vec![102]);
        let messages = fx.messenger.messages();
        assert!(messages.iter().any(|m| m.contains("privacy")));
        assert!(messages.iter().any(|m| m.contains("skipped u1")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_workers_between_items() {
        let fx = fixture("invite-cancel", &["a"]).await;
        script_handles(&fx.factory, 50).await;

        let orchestrator = fx.orchestrator.clone();
        let messenger = fx.messenger.clone();
        let job = tokio::spawn(async move { orchestrator.start(DEST, items(50), messenger).await });

        // Two invites land (t=0s and t=1s) before the cancel at t=1.5s.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(fx.orchestrator.cancel(DEST).await);

        let status = job.await.unwrap().unwrap();
        assert_eq!(status, JobStatus::Cancelled);
        assert_eq!(invited_by(&fx.factory, "+a").await, vec![100, 101]);
        assert!(!fx.orchestrator.is_active(DEST).await);
        assert!(fx
            .messenger
            .messages()
            .iter()
            .any(|m| m.contains("Run cancelled")));

        // Nothing left to cancel.
        assert!(!fx.orchestrator.cancel(DEST).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_reaches_every_worker_before_its_next_item() {
        let fx = fixture("invite-cancel-all", &["a", "b", "c"]).await;
        script_handles(&fx.factory, 9).await;

        let orchestrator = fx.orchestrator.clone();
        let messenger = fx.messenger.clone();
        let job = tokio::spawn(async move { orchestrator.start(DEST, items(9), messenger).await });

        // All three workers invite their first item at t=0 and then sleep;
        // the cancel at t=0.5s lands before any of them picks a second item.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(fx.orchestrator.cancel(DEST).await);

        let status = job.await.unwrap().unwrap();
        assert_eq!(status, JobStatus::Cancelled);
        assert_eq!(invited_by(&fx.factory, "+a").await, vec![100]);
        assert_eq!(invited_by(&fx.factory, "+b").await, vec![101]);
        assert_eq!(invited_by(&fx.factory, "+c").await, vec![102]);
        // Every worker released its connection (plus the listing one).
        assert_eq!(fx.factory.observe(|w| (w.opened, w.closed)).await, (4, 4));
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_for_the_same_chat_is_rejected_while_active() {
        let fx = fixture("invite-dup", &["a"]).await;
        script_handles(&fx.factory, 20).await;

        let orchestrator = fx.orchestrator.clone();
        let messenger = fx.messenger.clone();
        let job = tokio::spawn(async move { orchestrator.start(DEST, items(20), messenger).await });
        tokio::task::yield_now().await;
        assert!(fx.orchestrator.is_active(DEST).await);

        let dup = fx
            .orchestrator
            .start(DEST, items(1), fx.messenger.clone())
            .await;
        assert!(matches!(dup, Err(Error::Input(_))));

        fx.orchestrator.cancel(DEST).await;
        job.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_skips_that_partition() {
        let fx = fixture("invite-expired", &["a", "b"]).await;
        script_handles(&fx.factory, 4).await;
        fx.factory
            .script(|w| {
                w.dead_sessions.insert("+a".to_string());
            })
            .await;

        let status = fx
            .orchestrator
            .start(DEST, items(4), fx.messenger.clone())
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Completed);
        assert!(invited_by(&fx.factory, "+a").await.is_empty());
        assert_eq!(invited_by(&fx.factory, "+b").await, vec![101, 103]);
        assert!(fx
            .messenger
            .messages()
            .iter()
            .any(|m| m.contains("session expired")));
    }

    #[tokio::test]
    async fn preconditions_are_checked_before_spawning() {
        let fx = fixture("invite-empty", &["a"]).await;
        let err = fx
            .orchestrator
            .start(DEST, Vec::new(), fx.messenger.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));

        let no_accounts = fixture("invite-noacc", &[]).await;
        let err = no_accounts
            .orchestrator
            .start(DEST, items(1), no_accounts.messenger.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

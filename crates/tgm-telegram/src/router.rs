use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::Mutex;

use tgm_core::{
    admins::AdminRoster,
    client::ClientFactory,
    config::Config,
    delay::DelaySettings,
    groups::TargetResolver,
    invite::InviteOrchestrator,
    messaging::MessagingPort,
    onboarding::WizardTable,
    registry::AccountRegistry,
    store::{JsonStore, RecordStore},
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub messenger: Arc<dyn MessagingPort>,
    pub factory: Arc<dyn ClientFactory>,
    pub admins: Arc<AdminRoster>,
    pub registry: Arc<AccountRegistry>,
    pub delay: Arc<DelaySettings>,
    pub resolver: Arc<TargetResolver>,
    pub orchestrator: Arc<InviteOrchestrator>,
    pub wizards: Arc<WizardTable>,
    pub prompts: Arc<Prompts>,
}

/// What a bare (non-command, non-wizard) text reply from this chat means.
#[derive(Clone, Debug)]
pub enum PendingInput {
    SetDelay,
    ExportAccount,
    ExportChat { account: String },
}

#[derive(Default)]
pub struct Prompts {
    inner: Mutex<HashMap<i64, PendingInput>>,
}

impl Prompts {
    pub async fn set(&self, chat_id: i64, pending: PendingInput) {
        self.inner.lock().await.insert(chat_id, pending);
    }

    pub async fn take(&self, chat_id: i64) -> Option<PendingInput> {
        self.inner.lock().await.remove(&chat_id)
    }

    pub async fn clear(&self, chat_id: i64) -> bool {
        self.inner.lock().await.remove(&chat_id).is_some()
    }
}

pub async fn run_polling(cfg: Arc<Config>, factory: Arc<dyn ClientFactory>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!(username = %me.username(), "bot started");
    }
    tracing::info!(data_dir = %cfg.data_dir.display(), sandbox = cfg.sandbox, "configuration loaded");

    let store: Arc<dyn RecordStore> = Arc::new(JsonStore::new(cfg.data_dir.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let admins = Arc::new(AdminRoster::load(store.clone()));
    let registry = Arc::new(AccountRegistry::load(store.clone()));
    let delay = Arc::new(DelaySettings::load(store, cfg.default_delay_secs));
    let resolver = Arc::new(TargetResolver::new(factory.clone(), cfg.dialog_page_size));
    let orchestrator = Arc::new(InviteOrchestrator::new(
        registry.clone(),
        resolver.clone(),
        delay.clone(),
        factory.clone(),
    ));

    let state = Arc::new(AppState {
        messenger,
        factory,
        admins,
        registry,
        delay,
        resolver,
        orchestrator,
        wizards: Arc::new(WizardTable::default()),
        prompts: Arc::new(Prompts::default()),
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

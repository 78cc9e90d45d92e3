use std::sync::Arc;

use teloxide::prelude::*;

use tgm_core::{
    domain::{AccountKind, ChatId, UserId},
    export::export_members,
    formatting::escape_html,
    onboarding::Advance,
};

use crate::router::{AppState, PendingInput};

use super::commands;

pub async fn handle_text(
    _msg: Message,
    user_id: UserId,
    chat_id: ChatId,
    text: &str,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    // Wizard replies take priority over everything else.
    if state.wizards.is_active(user_id).await {
        if let Some(advance) = state
            .wizards
            .advance(user_id, text, &state.registry, &*state.factory)
            .await
        {
            let reply = match advance {
                Advance::Prompt(s) | Advance::Done(s) | Advance::Aborted(s) => s,
            };
            let _ = state.messenger.send_html(chat_id, &reply).await;
        }
        return Ok(());
    }

    if let Some(pending) = state.prompts.take(chat_id.0).await {
        resolve_prompt(pending, chat_id, text, &state).await;
        return Ok(());
    }

    // A bare number right after /groups picks the destination.
    if state.resolver.awaiting_selection().await {
        if let Ok(index) = text.trim().parse::<usize>() {
            let reply = match state.resolver.select_group(index).await {
                Ok(target) => format!(
                    "✅ Destination group: <b>{}</b>. Upload a CSV invitee list to start a run.",
                    escape_html(&target.title)
                ),
                Err(e) => format!("⚠️ {}", escape_html(&e.to_string())),
            };
            let _ = state.messenger.send_html(chat_id, &reply).await;
            return Ok(());
        }
    }

    let outcome = match text.trim() {
        commands::BTN_ADD_INVITER => {
            commands::start_wizard(&state, user_id, chat_id, AccountKind::Inviter).await
        }
        commands::BTN_ADD_EXPORTER => {
            commands::start_wizard(&state, user_id, chat_id, AccountKind::Exporter).await
        }
        commands::BTN_ACCOUNTS => commands::list_accounts(&state, chat_id).await,
        commands::BTN_GROUPS => commands::list_groups(&state, chat_id).await,
        commands::BTN_DELAY => commands::set_delay(&state, chat_id, "").await,
        commands::BTN_EXPORT => commands::begin_export(&state, chat_id).await,
        commands::BTN_CANCEL => commands::do_cancel(&state, user_id, chat_id).await,
        _ => {
            state
                .messenger
                .send_html(chat_id, "Use the menu buttons or /help.")
                .await
        }
    };

    if let Err(e) = outcome {
        let _ = state
            .messenger
            .send_html(chat_id, &format!("⚠️ {}", escape_html(&e.to_string())))
            .await;
    }
    Ok(())
}

async fn resolve_prompt(pending: PendingInput, chat_id: ChatId, text: &str, state: &AppState) {
    match pending {
        PendingInput::SetDelay => {
            let reply = match commands::parse_delay(text).and_then(|p| state.delay.set(p)) {
                Ok(applied) => format!("✅ Delay set: {}.", applied.describe()),
                Err(e) => {
                    state.prompts.set(chat_id.0, PendingInput::SetDelay).await;
                    format!("⚠️ {}. Try again:", escape_html(&e.to_string()))
                }
            };
            let _ = state.messenger.send_html(chat_id, &reply).await;
        }

        PendingInput::ExportAccount => {
            let name = text.trim();
            match state.registry.get(AccountKind::Exporter, name).await {
                Some(account) => {
                    state
                        .prompts
                        .set(
                            chat_id.0,
                            PendingInput::ExportChat {
                                account: account.name,
                            },
                        )
                        .await;
                    let _ = state
                        .messenger
                        .send_html(
                            chat_id,
                            "Send the id of the chat to export (e.g. <code>-1001234567890</code>):",
                        )
                        .await;
                }
                None => {
                    state
                        .prompts
                        .set(chat_id.0, PendingInput::ExportAccount)
                        .await;
                    let _ = state
                        .messenger
                        .send_html(
                            chat_id,
                            &format!(
                                "⚠️ No exporter account named <b>{}</b>. Send one of the names listed:",
                                escape_html(name)
                            ),
                        )
                        .await;
                }
            }
        }

        PendingInput::ExportChat { account } => {
            let Ok(target_chat) = text.trim().parse::<i64>() else {
                state
                    .prompts
                    .set(chat_id.0, PendingInput::ExportChat { account })
                    .await;
                let _ = state
                    .messenger
                    .send_html(chat_id, "⚠️ Send a numeric chat id:")
                    .await;
                return;
            };
            let Some(account) = state.registry.get(AccountKind::Exporter, &account).await else {
                let _ = state
                    .messenger
                    .send_html(chat_id, "⚠️ That exporter account no longer exists.")
                    .await;
                return;
            };

            let _ = state
                .messenger
                .send_html(chat_id, "⏳ Exporting members, this can take a while...")
                .await;

            let factory = state.factory.clone();
            let messenger = state.messenger.clone();
            tokio::spawn(async move {
                match export_members(&*factory, &account, target_chat).await {
                    Ok(artifact) => {
                        if let Err(e) = messenger
                            .send_document(
                                chat_id,
                                &artifact.filename,
                                artifact.bytes,
                                &artifact.caption,
                            )
                            .await
                        {
                            tracing::warn!(error = %e, "export delivery failed");
                            let _ = messenger
                                .send_html(
                                    chat_id,
                                    &format!(
                                        "⚠️ Could not deliver the export: {}",
                                        escape_html(&e.to_string())
                                    ),
                                )
                                .await;
                        }
                    }
                    Err(e) => {
                        let _ = messenger
                            .send_html(
                                chat_id,
                                &format!("⚠️ Export failed: {}", escape_html(&e.to_string())),
                            )
                            .await;
                    }
                }
            });
        }
    }
}

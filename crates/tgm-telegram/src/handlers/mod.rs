//! Telegram update handlers.
//!
//! Each handler validates the sender against the admin roster, then calls
//! into the `tgm-core` services held by [`AppState`]. Long-running work
//! (invitation runs, exports) is spawned so the dispatcher stays responsive
//! and `/cancel` keeps working.

use std::sync::Arc;

use teloxide::prelude::*;

use tgm_core::domain::{ChatId, UserId};

use crate::router::AppState;

mod commands;
mod document;
mod text;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);

    // Commands do their own gating: /me and /setmeadmin work pre-admin.
    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(msg.clone(), user_id, chat_id, state).await;
        }
    }

    if !state.admins.is_admin(user_id).await {
        let hint = if state.admins.is_empty().await {
            "No admin is registered yet. Send /setmeadmin to claim this bot."
        } else {
            "Unauthorized. Ask an existing admin to add you."
        };
        let _ = bot.send_message(msg.chat.id, hint).await;
        return Ok(());
    }

    if let Some(text) = msg.text() {
        let text = text.to_string();
        return text::handle_text(msg, user_id, chat_id, &text, state).await;
    }

    if msg.document().is_some() {
        return document::handle_document(bot, msg, chat_id, state).await;
    }

    let _ = bot
        .send_message(
            msg.chat.id,
            "Send a command, a menu button, or upload a CSV invitee list.",
        )
        .await;
    Ok(())
}

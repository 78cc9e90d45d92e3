use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use teloxide::{net::Download, prelude::*};

use tgm_core::{csv::parse_invitees, domain::ChatId, formatting::escape_html};

use crate::router::AppState;

static DOC_COUNTER: AtomicUsize = AtomicUsize::new(1);

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// A `.csv` upload is the trigger for an invitation run: parse it and start
/// the orchestrator against the selected destination group.
pub async fn handle_document(
    bot: Bot,
    msg: Message,
    chat_id: ChatId,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(doc) = msg.document() else {
        return Ok(());
    };

    let file_name = doc.file_name.clone().unwrap_or_default();
    if !file_name.to_lowercase().ends_with(".csv") {
        let _ = state
            .messenger
            .send_html(chat_id, "Send the invitee list as a <b>.csv</b> file.")
            .await;
        return Ok(());
    }
    if doc.file.size as u64 > MAX_FILE_SIZE {
        let _ = state
            .messenger
            .send_html(chat_id, "⚠️ File too large (max 10MB).")
            .await;
        return Ok(());
    }
    if state.orchestrator.is_active(chat_id).await {
        let _ = state
            .messenger
            .send_html(
                chat_id,
                "⚠️ A run is already active for this chat. /cancel it first.",
            )
            .await;
        return Ok(());
    }

    let contents = match download_csv(&bot, doc).await {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(error = %e, "invitee list download failed");
            let _ = state
                .messenger
                .send_html(chat_id, "⚠️ Could not download the file, try again.")
                .await;
            return Ok(());
        }
    };

    let items = match parse_invitees(&contents) {
        Ok(items) => items,
        Err(e) => {
            let _ = state
                .messenger
                .send_html(
                    chat_id,
                    &format!("⚠️ Malformed invitee list: {}", escape_html(&e.to_string())),
                )
                .await;
            return Ok(());
        }
    };

    // Run in the background so the dispatcher (and /cancel) stays live.
    let orchestrator = state.orchestrator.clone();
    let messenger = state.messenger.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.start(chat_id, items, messenger.clone()).await {
            let _ = messenger
                .send_html(chat_id, &format!("⚠️ {}", escape_html(&e.to_string())))
                .await;
        }
    });

    Ok(())
}

async fn download_csv(bot: &Bot, doc: &teloxide::types::Document) -> anyhow::Result<String> {
    let file = bot.get_file(doc.file.id.clone()).await?;

    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let n = DOC_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!("tgm_upload_{ts}_{n}.csv"));

    let mut dst = tokio::fs::File::create(&path).await?;
    bot.download_file(&file.path, &mut dst).await?;
    drop(dst);

    let contents = tokio::fs::read_to_string(&path).await?;
    let _ = tokio::fs::remove_file(&path).await;
    Ok(contents)
}

use std::sync::Arc;

use teloxide::prelude::*;

use tgm_core::{
    domain::{AccountKind, ChatId, DelayPolicy, UserId},
    formatting::escape_html,
    Error, Result,
};

use crate::router::{AppState, PendingInput};

pub(super) const BTN_ADD_INVITER: &str = "➕ Add inviter";
pub(super) const BTN_ADD_EXPORTER: &str = "➕ Add exporter";
pub(super) const BTN_ACCOUNTS: &str = "👤 Accounts";
pub(super) const BTN_GROUPS: &str = "📁 Groups";
pub(super) const BTN_DELAY: &str = "⏱ Delay";
pub(super) const BTN_EXPORT: &str = "📤 Export members";
pub(super) const BTN_CANCEL: &str = "🛑 Cancel";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(
    msg: Message,
    user_id: UserId,
    chat_id: ChatId,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let (cmd, args) = parse_command(msg.text().unwrap_or(""));

    // Open to everyone: identity and first-admin bootstrap.
    match cmd.as_str() {
        "me" => {
            let _ = state
                .messenger
                .send_html(chat_id, &format!("Your id: <code>{}</code>", user_id.0))
                .await;
            return Ok(());
        }
        "setmeadmin" => {
            let reply = match state.admins.bootstrap(user_id).await {
                Ok(()) => "✅ You are now the admin of this bot.".to_string(),
                Err(e) => format!("⚠️ {}", escape_html(&e.to_string())),
            };
            let _ = state.messenger.send_html(chat_id, &reply).await;
            return Ok(());
        }
        _ => {}
    }

    if !state.admins.is_admin(user_id).await {
        let hint = if state.admins.is_empty().await {
            "No admin is registered yet. Send /setmeadmin to claim this bot."
        } else {
            "Unauthorized. Ask an existing admin to add you."
        };
        let _ = state.messenger.send_html(chat_id, hint).await;
        return Ok(());
    }

    let outcome = match cmd.as_str() {
        "start" | "help" | "menu" => show_menu(&state, chat_id).await,
        "admins" => list_admins(&state, chat_id).await,
        "addadmin" => add_admin(&state, chat_id, &args).await,
        "deladmin" => del_admin(&state, chat_id, &args).await,
        "setdelay" => set_delay(&state, chat_id, &args).await,
        "delay" => show_delay(&state, chat_id).await,
        "addacc" => start_wizard(&state, user_id, chat_id, AccountKind::Inviter).await,
        "addexporter" => start_wizard(&state, user_id, chat_id, AccountKind::Exporter).await,
        "accounts" => list_accounts(&state, chat_id).await,
        "useacc" => use_account(&state, chat_id, &args).await,
        "delacc" => delete_account(&state, chat_id, &args).await,
        "logout" => logout_exporter(&state, chat_id, &args).await,
        "groups" => list_groups(&state, chat_id).await,
        "target" => show_target(&state, chat_id).await,
        "export" => begin_export(&state, chat_id).await,
        "cancel" => do_cancel(&state, user_id, chat_id).await,
        _ => {
            state
                .messenger
                .send_html(chat_id, "Unknown command. Send /help for the menu.")
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

pub(super) async fn show_menu(state: &AppState, chat_id: ChatId) -> Result<()> {
    let rows = vec![
        vec![BTN_ADD_INVITER.to_string(), BTN_ADD_EXPORTER.to_string()],
        vec![BTN_ACCOUNTS.to_string(), BTN_GROUPS.to_string()],
        vec![BTN_DELAY.to_string(), BTN_EXPORT.to_string()],
        vec![BTN_CANCEL.to_string()],
    ];
    let help = "<b>Member bot</b>\n\
        Pick a group with /groups, then upload a CSV invitee list to start a run.\n\n\
        /accounts — registered accounts\n\
        /useacc &lt;name&gt; — switch the active inviter\n\
        /delacc &lt;name&gt; — remove an inviter\n\
        /logout &lt;name&gt; — log an exporter out and remove it\n\
        /setdelay &lt;secs&gt; or /setdelay &lt;low&gt; &lt;high&gt; — invite pacing\n\
        /export — export a chat's members to CSV\n\
        /cancel — stop the active run or wizard\n\
        /admins, /addadmin &lt;id&gt;, /deladmin &lt;id&gt;";
    state.messenger.send_menu(chat_id, help, &rows).await
}

async fn list_admins(state: &AppState, chat_id: ChatId) -> Result<()> {
    let admins = state.admins.list().await;
    let lines: Vec<String> = admins
        .iter()
        .map(|id| format!("• <code>{id}</code>"))
        .collect();
    state
        .messenger
        .send_html(chat_id, &format!("<b>Admins</b>\n{}", lines.join("\n")))
        .await
}

fn parse_user_id(args: &str) -> Result<UserId> {
    args.trim()
        .parse::<i64>()
        .map(UserId)
        .map_err(|_| Error::Input("send a numeric Telegram user id".to_string()))
}

async fn add_admin(state: &AppState, chat_id: ChatId, args: &str) -> Result<()> {
    let id = parse_user_id(args)?;
    state.admins.add(id).await?;
    state
        .messenger
        .send_html(chat_id, &format!("✅ <code>{}</code> is now an admin.", id.0))
        .await
}

async fn del_admin(state: &AppState, chat_id: ChatId, args: &str) -> Result<()> {
    let id = parse_user_id(args)?;
    state.admins.remove(id).await?;
    state
        .messenger
        .send_html(chat_id, &format!("✅ <code>{}</code> removed.", id.0))
        .await
}

/// `30` → fixed, `20 60` → uniform random per invite.
pub(super) fn parse_delay(text: &str) -> Result<DelayPolicy> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let numbers: Vec<u64> = parts
        .iter()
        .map(|p| {
            p.parse::<u64>()
                .map_err(|_| Error::Input(format!("'{p}' is not a number of seconds")))
        })
        .collect::<Result<_>>()?;
    match numbers.as_slice() {
        [seconds] => Ok(DelayPolicy::Fixed { seconds: *seconds }),
        [low, high] => Ok(DelayPolicy::RandomRange {
            low_seconds: *low,
            high_seconds: *high,
        }),
        _ => Err(Error::Input(
            "send one number (fixed) or two (random range)".to_string(),
        )),
    }
}

pub(super) async fn set_delay(state: &AppState, chat_id: ChatId, args: &str) -> Result<()> {
    if args.trim().is_empty() {
        state.prompts.set(chat_id.0, PendingInput::SetDelay).await;
        return state
            .messenger
            .send_html(
                chat_id,
                "Send the delay in seconds, either one number (fixed) or two (random range, e.g. <code>20 60</code>):",
            )
            .await;
    }
    let applied = state.delay.set(parse_delay(args)?)?;
    state
        .messenger
        .send_html(chat_id, &format!("✅ Delay set: {}.", applied.describe()))
        .await
}

async fn show_delay(state: &AppState, chat_id: ChatId) -> Result<()> {
    state
        .messenger
        .send_html(
            chat_id,
            &format!("Current delay: {}.", state.delay.current().describe()),
        )
        .await
}

pub(super) async fn start_wizard(
    state: &AppState,
    user_id: UserId,
    chat_id: ChatId,
    kind: AccountKind,
) -> Result<()> {
    let prompt = state.wizards.start(user_id, kind).await;
    state.messenger.send_html(chat_id, &prompt).await
}

pub(super) async fn list_accounts(state: &AppState, chat_id: ChatId) -> Result<()> {
    let inviters = state.registry.list(AccountKind::Inviter).await;
    let exporters = state.registry.list(AccountKind::Exporter).await;
    let active = state.registry.active_inviter().await.map(|a| a.name);

    let mut out = String::from("<b>Inviter accounts</b>\n");
    if inviters.is_empty() {
        out.push_str("(none)\n");
    }
    for a in &inviters {
        let marker = if active.as_deref() == Some(a.name.as_str()) {
            "▶ "
        } else {
            "• "
        };
        out.push_str(&format!(
            "{marker}{} — {}\n",
            escape_html(&a.name),
            escape_html(&a.phone)
        ));
    }
    out.push_str("\n<b>Exporter accounts</b>\n");
    if exporters.is_empty() {
        out.push_str("(none)\n");
    }
    for a in &exporters {
        out.push_str(&format!(
            "• {} — {}\n",
            escape_html(&a.name),
            escape_html(&a.phone)
        ));
    }
    state.messenger.send_html(chat_id, &out).await
}

async fn use_account(state: &AppState, chat_id: ChatId, args: &str) -> Result<()> {
    let name = args.trim();
    if name.is_empty() {
        return Err(Error::Input("usage: /useacc <name>".to_string()));
    }
    state.registry.set_active(name).await?;
    state
        .messenger
        .send_html(
            chat_id,
            &format!("✅ Active inviter is now <b>{}</b>.", escape_html(name)),
        )
        .await
}

async fn delete_account(state: &AppState, chat_id: ChatId, args: &str) -> Result<()> {
    let name = args.trim();
    if name.is_empty() {
        return Err(Error::Input("usage: /delacc <name>".to_string()));
    }
    state.registry.delete(AccountKind::Inviter, name).await?;
    state
        .messenger
        .send_html(
            chat_id,
            &format!("✅ Inviter <b>{}</b> removed.", escape_html(name)),
        )
        .await
}

async fn logout_exporter(state: &AppState, chat_id: ChatId, args: &str) -> Result<()> {
    let name = args.trim();
    if name.is_empty() {
        return Err(Error::Input("usage: /logout <name>".to_string()));
    }
    state.registry.logout(name, &*state.factory).await?;
    state
        .messenger
        .send_html(
            chat_id,
            &format!(
                "✅ Exporter <b>{}</b> logged out and removed.",
                escape_html(name)
            ),
        )
        .await
}

pub(super) async fn list_groups(state: &AppState, chat_id: ChatId) -> Result<()> {
    let account = state
        .registry
        .active_inviter()
        .await
        .ok_or_else(|| Error::Config("register an inviter account first (/addacc)".to_string()))?;
    let groups = state.resolver.list_groups(&account).await?;
    if groups.is_empty() {
        return state
            .messenger
            .send_html(
                chat_id,
                &format!(
                    "No groups found among <b>{}</b>'s recent chats.",
                    escape_html(&account.name)
                ),
            )
            .await;
    }
    let mut out = format!("<b>{}</b>'s groups:\n", escape_html(&account.name));
    for (i, g) in groups.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i, escape_html(&g.title)));
    }
    out.push_str("\nSend the number of the destination group:");
    state.messenger.send_html(chat_id, &out).await
}

async fn show_target(state: &AppState, chat_id: ChatId) -> Result<()> {
    let reply = match state.resolver.selected().await {
        Some(t) => format!("Destination group: <b>{}</b>.", escape_html(&t.title)),
        None => "No destination group selected. Use /groups to pick one.".to_string(),
    };
    state.messenger.send_html(chat_id, &reply).await
}

pub(super) async fn begin_export(state: &AppState, chat_id: ChatId) -> Result<()> {
    let exporters = state.registry.list(AccountKind::Exporter).await;
    if exporters.is_empty() {
        return Err(Error::Config(
            "add an exporter account first (/addexporter)".to_string(),
        ));
    }
    let names: Vec<String> = exporters.iter().map(|a| escape_html(&a.name)).collect();
    state
        .prompts
        .set(chat_id.0, PendingInput::ExportAccount)
        .await;
    state
        .messenger
        .send_html(
            chat_id,
            &format!(
                "Which exporter account? ({})\nSend its name:",
                names.join(", ")
            ),
        )
        .await
}

pub(super) async fn do_cancel(state: &AppState, user_id: UserId, chat_id: ChatId) -> Result<()> {
    let run = state.orchestrator.cancel(chat_id).await;
    let wizard = state.wizards.cancel(user_id).await;
    let prompt = state.prompts.clear(chat_id.0).await;

    let reply = if run {
        "🛑 Cancelling the run; workers stop after their current item."
    } else if wizard {
        "🛑 Wizard cancelled."
    } else if prompt {
        "🛑 Cancelled."
    } else {
        "Nothing to cancel."
    };
    state.messenger.send_html(chat_id, reply).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_parsed_with_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/setdelay@member_bot 20 60"),
            ("setdelay".to_string(), "20 60".to_string())
        );
        assert_eq!(parse_command("/Start"), ("start".to_string(), String::new()));
        assert_eq!(
            parse_command("  /useacc main "),
            ("useacc".to_string(), "main".to_string())
        );
    }

    #[test]
    fn delay_arguments_parse_into_policies() {
        assert_eq!(parse_delay("30").unwrap(), DelayPolicy::Fixed { seconds: 30 });
        assert_eq!(
            parse_delay("20 60").unwrap(),
            DelayPolicy::RandomRange {
                low_seconds: 20,
                high_seconds: 60
            }
        );
        assert!(parse_delay("").is_err());
        assert!(parse_delay("a b").is_err());
        assert!(parse_delay("1 2 3").is_err());
    }
}

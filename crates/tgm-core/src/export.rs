//! Member export: snapshot a chat's participants into a CSV artifact.

use regex::Regex;

use crate::{
    client::{ClientFactory, UserConnection},
    csv,
    domain::Account,
    Error, Result,
};

/// A finished export, ready to hand to the messaging port.
#[derive(Debug)]
pub struct ExportArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub caption: String,
    pub member_count: usize,
}

/// Export every participant of `chat_id` using the given exporter account.
/// The session is opened for the duration of the export and always released.
pub async fn export_members(
    factory: &dyn ClientFactory,
    account: &Account,
    chat_id: i64,
) -> Result<ExportArtifact> {
    let mut conn = factory.open_session(account).await?;
    let result = run(conn.as_mut(), account, chat_id).await;
    conn.disconnect().await;
    result
}

async fn run(
    conn: &mut dyn UserConnection,
    account: &Account,
    chat_id: i64,
) -> Result<ExportArtifact> {
    if !conn.is_authorized().await? {
        return Err(Error::AuthExpired {
            account: account.name.clone(),
        });
    }

    let info = conn.resolve_chat(chat_id).await?;
    let members = conn.list_participants(&info.peer, true).await?;
    tracing::info!(chat_id, count = members.len(), "exported chat members");

    let bytes = csv::write_members(&members, &info.title, chat_id);
    Ok(ExportArtifact {
        filename: export_filename(&info.title),
        caption: format!("Members exported: {}", members.len()),
        member_count: members.len(),
        bytes,
    })
}

/// `members-<slug>.csv`, slug derived from the chat title.
fn export_filename(title: &str) -> String {
    let re = Regex::new(r"[^a-z0-9]+").expect("valid regex");
    let slug = re
        .replace_all(&title.to_lowercase(), "-")
        .trim_matches('-')
        .to_string();
    if slug.is_empty() {
        "members.csv".to_string()
    } else {
        format!("members-{slug}.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sandbox::{ChatRoster, SandboxClientFactory};
    use crate::domain::{AccountKind, Participant};

    fn account() -> Account {
        Account {
            id: 1,
            name: "exp".to_string(),
            phone: "+9".to_string(),
            api_id: 1,
            api_hash: "h".to_string(),
            session_token: "+9".to_string(),
            kind: AccountKind::Exporter,
        }
    }

    fn member(id: i64, handle: Option<&str>, first: &str) -> Participant {
        Participant {
            handle: handle.map(str::to_string),
            user_id: id,
            access_hash: id * 7,
            first_name: Some(first.to_string()),
            last_name: None,
        }
    }

    #[tokio::test]
    async fn exports_every_participant_and_releases_the_session() {
        let factory = SandboxClientFactory::new();
        factory
            .script(|w| {
                w.chats.insert(
                    42,
                    ChatRoster {
                        title: "Night Crew".to_string(),
                        members: vec![member(1, Some("alice"), "Alice"), member(2, None, "Bob")],
                    },
                );
            })
            .await;

        let artifact = export_members(&factory, &account(), 42).await.unwrap();
        assert_eq!(artifact.member_count, 2);
        assert_eq!(artifact.filename, "members-night-crew.csv");
        assert_eq!(artifact.caption, "Members exported: 2");

        let body = String::from_utf8(artifact.bytes).unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines[0], csv::MEMBER_EXPORT_HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("alice"));

        assert_eq!(factory.observe(|w| (w.opened, w.closed)).await, (1, 1));
    }

    #[tokio::test]
    async fn empty_chat_yields_a_header_only_file() {
        let factory = SandboxClientFactory::new();
        factory
            .script(|w| {
                w.chats.insert(
                    7,
                    ChatRoster {
                        title: "Ghost Town".to_string(),
                        members: Vec::new(),
                    },
                );
            })
            .await;

        let artifact = export_members(&factory, &account(), 7).await.unwrap();
        assert_eq!(artifact.member_count, 0);
        assert_eq!(
            String::from_utf8(artifact.bytes).unwrap(),
            format!("{}\n", csv::MEMBER_EXPORT_HEADER)
        );
    }

    #[tokio::test]
    async fn dead_session_surfaces_auth_expired_and_disconnects() {
        let factory = SandboxClientFactory::new();
        factory
            .script(|w| {
                w.dead_sessions.insert("+9".to_string());
            })
            .await;

        let err = export_members(&factory, &account(), 42).await.unwrap_err();
        assert!(matches!(err, Error::AuthExpired { .. }));
        assert_eq!(factory.observe(|w| (w.opened, w.closed)).await, (1, 1));
    }

    #[test]
    fn filenames_are_slugged_from_the_title() {
        assert_eq!(export_filename("Night Crew"), "members-night-crew.csv");
        assert_eq!(export_filename("  ¡Fiesta! 2024  "), "members-fiesta-2024.csv");
        assert_eq!(export_filename("---"), "members.csv");
    }
}

//! Port for the operator-facing bot transport.

use async_trait::async_trait;

use crate::{domain::ChatId, Result};

/// Hexagonal port for messaging the operator.
///
/// Implemented over the Telegram Bot API in the adapter crate; workers and
/// services only hold `Arc<dyn MessagingPort>`.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;

    /// Send a message together with a persistent reply-keyboard menu.
    async fn send_menu(&self, chat_id: ChatId, html: &str, rows: &[Vec<String>]) -> Result<()>;

    /// Deliver a downloadable artifact with a caption.
    async fn send_document(
        &self,
        chat_id: ChatId,
        filename: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Records everything sent so tests can assert on report streams.
    #[derive(Default)]
    pub struct RecordingMessenger {
        pub sent: Mutex<Vec<String>>,
        pub documents: Mutex<Vec<(String, Vec<u8>, String)>>,
    }

    impl RecordingMessenger {
        pub fn messages(&self) -> Vec<String> {
            self.sent.lock().expect("recording lock").clone()
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_html(&self, _chat_id: ChatId, html: &str) -> Result<()> {
            self.sent.lock().expect("recording lock").push(html.to_string());
            Ok(())
        }

        async fn send_menu(&self, chat_id: ChatId, html: &str, _rows: &[Vec<String>]) -> Result<()> {
            self.send_html(chat_id, html).await
        }

        async fn send_document(
            &self,
            _chat_id: ChatId,
            filename: &str,
            bytes: Vec<u8>,
            caption: &str,
        ) -> Result<()> {
            self.documents
                .lock()
                .expect("recording lock")
                .push((filename.to_string(), bytes, caption.to_string()));
            Ok(())
        }
    }
}

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::consts::{ASSISTANT_PERSONA, CHAT_FALLBACK_REPLY, CHAT_GREETING};
use crate::error::StudioError;
use crate::remote::{ChatBackend, ChatSession};

/// The prompt assistant conversation.
///
/// Holds at most one session. It is created on demand and thrown away after
/// any failed turn, so the next turn starts fresh.
pub struct Conversation {
    backend: Arc<dyn ChatBackend>,
    persona: String,
    slot: Mutex<Option<ChatSession>>,
}

impl Conversation {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            persona: ASSISTANT_PERSONA.to_string(),
            slot: Mutex::new(None),
        }
    }

    pub fn greeting(&self) -> &'static str {
        CHAT_GREETING
    }

    /// Returns the id of the live session, creating one if needed
    pub async fn ensure(&self) -> Uuid {
        let mut slot = self.slot.lock().await;
        self.session_in(&mut slot).id
    }

    #[cfg(test)]
    pub async fn session_id(&self) -> Option<Uuid> {
        self.slot.lock().await.as_ref().map(|session| session.id)
    }

    /// Sends one turn. Failures are not surfaced: the fallback reply is
    /// returned instead.
    pub async fn send(&self, text: &str) -> String {
        self.try_send(text)
            .await
            .unwrap_or_else(|_| CHAT_FALLBACK_REPLY.to_string())
    }

    /// A failed turn discards the session
    async fn try_send(&self, text: &str) -> Result<String, StudioError> {
        let mut slot = self.slot.lock().await;
        let session = self.session_in(&mut slot);
        debug!("Sending chat turn on session {}", session.id);

        let reply = self.backend.send(session, text).await;
        reply.map_err(|e| {
            error!("Chat turn failed: {}", e);
            *slot = None;
            StudioError::ChatFailure
        })
    }

    pub async fn reset(&self) {
        if let Some(session) = self.slot.lock().await.take() {
            info!("Discarded chat session {}", session.id);
        }
    }

    fn session_in<'a>(&self, slot: &'a mut Option<ChatSession>) -> &'a mut ChatSession {
        slot.get_or_insert_with(|| {
            let session = self.backend.create_session(&self.persona);
            info!("Started chat session {}", session.id);
            session
        })
    }
}

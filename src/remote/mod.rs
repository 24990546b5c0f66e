//! Contracts for the remote generative capabilities.
//!
//! The studio only talks to these traits; `gemini` is the production
//! implementation and tests substitute in-memory fakes.

pub mod gemini;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RemoteError;

pub use gemini::GeminiClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGenerationParams {
    pub model: String,
    pub prompt: String,
    pub count: u8,
    pub output_mime_type: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoGenerationParams<'a> {
    pub model: String,
    pub prompt: String,
    pub image_bytes: &'a [u8],
    pub mime_type: String,
    pub video_count: u8,
    pub resolution: String,
    pub aspect_ratio: String,
}

/// One asynchronous video request as reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    /// Opaque operation name assigned by the service
    pub name: String,
    pub done: bool,
    /// Fetchable locators of the generated videos, in service order
    pub video_uris: Vec<String>,
    pub failure: Option<RemoteError>,
}

impl GenerationJob {
    #[cfg(test)]
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            video_uris: Vec::new(),
            failure: None,
        }
    }

    pub fn first_artifact(&self) -> Option<&str> {
        self.video_uris
            .first()
            .map(String::as_str)
            .filter(|uri| !uri.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

/// A conversation with the assistant: persona plus the turns so far.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: Uuid,
    pub persona: String,
    pub history: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            persona: persona.into(),
            history: Vec::new(),
        }
    }

    pub(crate) fn record_exchange(&mut self, message: &str, reply: &str) {
        self.history.push(ChatTurn {
            role: ChatRole::User,
            text: message.to_string(),
        });
        self.history.push(ChatTurn {
            role: ChatRole::Model,
            text: reply.to_string(),
        });
    }
}

#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Returns the raw bytes of each generated image, in order
    async fn generate_images(
        &self,
        params: &ImageGenerationParams,
    ) -> Result<Vec<Vec<u8>>, RemoteError>;

    async fn generate_video(
        &self,
        params: &VideoGenerationParams<'_>,
    ) -> Result<GenerationJob, RemoteError>;

    async fn video_status(&self, job: &GenerationJob) -> Result<GenerationJob, RemoteError>;

    async fn fetch_artifact(&self, uri: &str) -> Result<Vec<u8>, RemoteError>;
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn create_session(&self, persona: &str) -> ChatSession {
        ChatSession::new(persona)
    }

    /// Sends one turn; on success the exchange is appended to the session
    async fn send(&self, session: &mut ChatSession, message: &str) -> Result<String, RemoteError>;
}

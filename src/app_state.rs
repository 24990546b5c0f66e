use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::conversation::Conversation;
use crate::key_gate::{AmbientKeyHost, Credential, KeyGate, KeyHost, PromptKeyHost};
use crate::remote::GeminiClient;
use crate::studio::{Studio, StudioSettings};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub studio: Arc<Studio>,
    pub conversation: Arc<Conversation>,
}

impl AppState {
    /// `interactive` selects a terminal prompt for missing keys
    pub fn new(app_config: AppConfig, interactive: bool) -> Result<Self> {
        let credential = Credential::from_config_or_env(app_config.api_key.clone());
        let gate = Arc::new(KeyGate::new(init_key_host(&credential, interactive)));
        let gemini = Arc::new(init_gemini_client(&app_config, credential.clone())?);

        let studio = Arc::new(Studio::new(
            gemini.clone(),
            gate,
            StudioSettings::from(&app_config),
        ));
        let conversation = Arc::new(Conversation::new(gemini));

        Ok(AppState {
            config: app_config,
            studio,
            conversation,
        })
    }
}

fn init_key_host(credential: &Credential, interactive: bool) -> Arc<dyn KeyHost> {
    if interactive {
        Arc::new(PromptKeyHost::new(credential.clone()))
    } else {
        log::info!("Non-interactive session, expecting the API key from config or environment");
        Arc::new(AmbientKeyHost)
    }
}

fn init_gemini_client(app_config: &AppConfig, credential: Credential) -> Result<GeminiClient> {
    let client = GeminiClient::new(
        &app_config.api_base_url,
        credential,
        app_config.request_timeout(),
    )
    .context("Failed to build Gemini client")?;

    Ok(client.with_chat_model(app_config.chat_model.clone()))
}

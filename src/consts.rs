use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const API_VERSION: &str = "v1beta";
pub const API_KEY_HEADER: &str = "x-goog-api-key";

pub const DEFAULT_CONFIG_FILE: &str = "genstudio";
pub const ENV_PREFIX: &str = "GENSTUDIO";
/// Fallback variables checked when no key is configured
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

// Models
pub const IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
pub const CHAT_MODEL: &str = "gemini-2.5-flash";

pub const IMAGE_OUTPUT_MIME: &str = "image/png";
pub const VIDEO_RESOLUTION: &str = "720p";
pub const VIDEO_COUNT: u8 = 1;

pub const MIN_IMAGE_COUNT: u8 = 1;
pub const MAX_IMAGE_COUNT: u8 = 4;
pub const MAX_SOURCE_IMAGE_BYTES: usize = 4 * 1024 * 1024; // 4MB

// Polling
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub const VIDEO_PROGRESS_MESSAGES: &[&str] = &[
    "Warming up the AI director...",
    "Choreographing the pixels...",
    "Setting up the virtual cameras...",
    "Rendering cinematic magic...",
    "Applying digital makeup...",
    "Final touches on the masterpiece...",
    "This can take a few minutes...",
];
pub const IMAGE_PROGRESS_MESSAGE: &str = "Conjuring images from the digital ether...";
pub const FETCHING_VIDEO_MESSAGE: &str = "Fetching your masterpiece...";

// User facing failure texts
pub const AUTH_FAILURE_SIGNATURE: &str = "Requested entity was not found";
pub const AUTH_FAILURE_MESSAGE: &str =
    "API Key is invalid or not found. Please select a valid API key and try again.";
pub const IMAGE_FAILURE_MESSAGE: &str =
    "Failed to generate image. Please check your prompt and try again.";
pub const VIDEO_FAILURE_MESSAGE: &str =
    "Failed to start video generation. Please check your inputs and try again.";
pub const POLLING_FAILURE_MESSAGE: &str = "Failed to check video status.";
pub const MISSING_ARTIFACT_MESSAGE: &str =
    "Video generation completed, but no video URL was returned.";
pub const SOURCE_IMAGE_TOO_LARGE_MESSAGE: &str =
    "File size exceeds 4MB. Please choose a smaller image.";

// Assistant
pub const ASSISTANT_PERSONA: &str = "You are a helpful assistant for the genstudio AI Video Generator. \
You can help users rewrite, expand, or optimize their prompts. \
You can also offer real-time style, camera, and lighting suggestions.";
pub const CHAT_GREETING: &str = "Hello! How can I help you optimize your prompt today?";
pub const CHAT_FALLBACK_REPLY: &str = "Sorry, I encountered an error. Please try again.";
pub const CHAT_FAILURE_MESSAGE: &str = "Failed to get a response from the chatbot.";

// Form defaults
pub const DEFAULT_IMAGE_PROMPT: &str = "A majestic lion wearing a crown, cinematic lighting";
pub const DEFAULT_NEGATIVE_PROMPT: &str = "blurry, text, watermark";
pub const DEFAULT_VIDEO_PROMPT: &str =
    "The lion slowly opens its eyes, and a magical glow emanates from the crown.";

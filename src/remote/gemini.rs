use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    ChatBackend, ChatRole, ChatSession, GenerationJob, ImageGenerationParams, MediaBackend,
    VideoGenerationParams,
};
use crate::consts::{API_KEY_HEADER, API_VERSION, CHAT_MODEL};
use crate::error::RemoteError;
use crate::key_gate::Credential;

#[derive(Serialize)]
struct PredictRequest<I, P> {
    instances: Vec<I>,
    parameters: P,
}

#[derive(Serialize)]
struct ImagenInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagenParameters<'a> {
    sample_count: u8,
    aspect_ratio: &'a str,
    output_options: ImagenOutputOptions<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagenOutputOptions<'a> {
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct ImagenResponse {
    #[serde(default)]
    predictions: Vec<ImagenPrediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagenPrediction {
    bytes_base64_encoded: Option<String>,
}

#[derive(Serialize)]
struct VeoInstance<'a> {
    prompt: &'a str,
    image: VeoImage<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoImage<'a> {
    bytes_base64_encoded: String,
    mime_type: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoParameters<'a> {
    sample_count: u8,
    resolution: &'a str,
    aspect_ratio: &'a str,
}

#[derive(Deserialize, Debug)]
struct OperationResponse {
    name: String,
    #[serde(default)]
    done: bool,
    response: Option<OperationResult>,
    error: Option<ApiStatus>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Deserialize, Debug)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Deserialize, Debug)]
struct VideoRef {
    uri: Option<String>,
}

/// `google.rpc.Status` as found in error envelopes and failed operations
#[derive(Deserialize, Debug)]
struct ApiStatus {
    code: Option<i64>,
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ApiStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Canonical names for the gRPC codes carried by failed operations
fn grpc_code_name(code: i64) -> Option<&'static str> {
    match code {
        3 => Some("INVALID_ARGUMENT"),
        5 => Some("NOT_FOUND"),
        7 => Some("PERMISSION_DENIED"),
        8 => Some("RESOURCE_EXHAUSTED"),
        13 => Some("INTERNAL"),
        14 => Some("UNAVAILABLE"),
        16 => Some("UNAUTHENTICATED"),
        _ => None,
    }
}

impl ApiStatus {
    fn into_operation_error(self) -> RemoteError {
        let code = self
            .status
            .or_else(|| self.code.and_then(grpc_code_name).map(str::to_string));
        let err = RemoteError::new(self.message);
        match code {
            Some(code) => err.with_code(code),
            None => err,
        }
    }
}

impl From<OperationResponse> for GenerationJob {
    fn from(op: OperationResponse) -> Self {
        let video_uris = op
            .response
            .and_then(|r| r.generate_video_response)
            .map(|r| {
                r.generated_samples
                    .into_iter()
                    .filter_map(|sample| sample.video.and_then(|v| v.uri))
                    .collect()
            })
            .unwrap_or_default();

        GenerationJob {
            name: op.name,
            done: op.done,
            video_uris,
            failure: op.error.map(ApiStatus::into_operation_error),
        }
    }
}

fn api_error(status: StatusCode, body: &str) -> RemoteError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let err = RemoteError::new(envelope.error.message).with_status(status.as_u16());
            match envelope.error.status {
                Some(code) => err.with_code(code),
                None => err,
            }
        }
        Err(_) => RemoteError::new(format!("{status}: {body}")).with_status(status.as_u16()),
    }
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Model => "model",
    }
}

fn build_chat_request<'a>(session: &'a ChatSession, message: &'a str) -> GenerateContentRequest<'a> {
    let mut contents: Vec<Content<'a>> = session
        .history
        .iter()
        .map(|turn| Content {
            role: Some(role_name(turn.role)),
            parts: vec![Part { text: &turn.text }],
        })
        .collect();
    contents.push(Content {
        role: Some("user"),
        parts: vec![Part { text: message }],
    });

    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: &session.persona,
            }],
        },
        contents,
    }
}

/// Gemini API client covering image, video, and chat generation.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    chat_model: String,
    credential: Credential,
    http: Client,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        credential: Credential,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model: CHAT_MODEL.to_string(),
            credential,
            http,
        })
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/{API_VERSION}/models/{model}:{method}", self.base_url)
    }

    fn operation_url(&self, name: &str) -> String {
        format!(
            "{}/{API_VERSION}/{}",
            self.base_url,
            name.trim_start_matches('/')
        )
    }

    async fn api_key(&self) -> Result<String, RemoteError> {
        self.credential
            .get()
            .await
            .ok_or_else(|| RemoteError::new("No API key configured").with_status(401))
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let key = self.api_key().await?;
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, key)
            .json(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn get_json<R: DeserializeOwned>(&self, url: &str) -> Result<R, RemoteError> {
        let key = self.api_key().await?;
        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, key)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn parse_response<R: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<R, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(api_error(status, &error_text));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| RemoteError::new(format!("Failed to parse response: {e}")))
    }
}

#[async_trait]
impl MediaBackend for GeminiClient {
    async fn generate_images(
        &self,
        params: &ImageGenerationParams,
    ) -> Result<Vec<Vec<u8>>, RemoteError> {
        let request = PredictRequest {
            instances: vec![ImagenInstance {
                prompt: &params.prompt,
            }],
            parameters: ImagenParameters {
                sample_count: params.count,
                aspect_ratio: &params.aspect_ratio,
                output_options: ImagenOutputOptions {
                    mime_type: &params.output_mime_type,
                },
            },
        };

        let response: ImagenResponse = self
            .post_json(&self.model_url(&params.model, "predict"), &request)
            .await?;

        let images = response
            .predictions
            .into_iter()
            .filter_map(|p| p.bytes_base64_encoded)
            .map(|encoded| {
                BASE64
                    .decode(encoded)
                    .map_err(|e| RemoteError::new(format!("Invalid image payload: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if images.is_empty() {
            return Err(RemoteError::new("No images were returned"));
        }

        info!("Imagen returned {} image(s)", images.len());
        Ok(images)
    }

    async fn generate_video(
        &self,
        params: &VideoGenerationParams<'_>,
    ) -> Result<GenerationJob, RemoteError> {
        let request = PredictRequest {
            instances: vec![VeoInstance {
                prompt: &params.prompt,
                image: VeoImage {
                    bytes_base64_encoded: BASE64.encode(params.image_bytes),
                    mime_type: &params.mime_type,
                },
            }],
            parameters: VeoParameters {
                sample_count: params.video_count,
                resolution: &params.resolution,
                aspect_ratio: &params.aspect_ratio,
            },
        };

        let operation: OperationResponse = self
            .post_json(
                &self.model_url(&params.model, "predictLongRunning"),
                &request,
            )
            .await?;

        info!("Video generation started with operation: {}", operation.name);
        Ok(operation.into())
    }

    async fn video_status(&self, job: &GenerationJob) -> Result<GenerationJob, RemoteError> {
        let operation: OperationResponse = self.get_json(&self.operation_url(&job.name)).await?;
        debug!(
            "Operation {} status: done={}",
            operation.name, operation.done
        );
        Ok(operation.into())
    }

    async fn fetch_artifact(&self, uri: &str) -> Result<Vec<u8>, RemoteError> {
        let key = self.api_key().await?;
        let response = self
            .http
            .get(uri)
            .header(API_KEY_HEADER, key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or(status.as_str());
            return Err(RemoteError::new(reason).with_status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        info!("Fetched video artifact ({} bytes)", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ChatBackend for GeminiClient {
    async fn send(&self, session: &mut ChatSession, message: &str) -> Result<String, RemoteError> {
        let request = build_chat_request(session, message);
        let response: GenerateContentResponse = self
            .post_json(&self.model_url(&self.chat_model, "generateContent"), &request)
            .await?;

        let reply: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if reply.is_empty() {
            return Err(RemoteError::new("Empty response from chat model"));
        }

        session.record_exchange(message, &reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ChatTurn;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client() -> GeminiClient {
        GeminiClient::new(
            "https://example.com/",
            Credential::new(Some("test-key".to_string())),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        let client = client();
        assert_eq!(
            client.model_url("imagen-4.0-generate-001", "predict"),
            "https://example.com/v1beta/models/imagen-4.0-generate-001:predict"
        );
        assert_eq!(
            client.operation_url("models/veo/operations/abc"),
            "https://example.com/v1beta/models/veo/operations/abc"
        );
    }

    #[test]
    fn test_imagen_request_shape() {
        let request = PredictRequest {
            instances: vec![ImagenInstance {
                prompt: "Style: Noir. A cat",
            }],
            parameters: ImagenParameters {
                sample_count: 2,
                aspect_ratio: "16:9",
                output_options: ImagenOutputOptions {
                    mime_type: "image/png",
                },
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["instances"][0]["prompt"], "Style: Noir. A cat");
        assert_eq!(value["parameters"]["sampleCount"], 2);
        assert_eq!(value["parameters"]["aspectRatio"], "16:9");
        assert_eq!(value["parameters"]["outputOptions"]["mimeType"], "image/png");
    }

    #[test]
    fn test_veo_request_shape() {
        let request = PredictRequest {
            instances: vec![VeoInstance {
                prompt: "P",
                image: VeoImage {
                    bytes_base64_encoded: BASE64.encode(b"png"),
                    mime_type: "image/png",
                },
            }],
            parameters: VeoParameters {
                sample_count: 1,
                resolution: "720p",
                aspect_ratio: "9:16",
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["instances"][0]["image"]["bytesBase64Encoded"], "cG5n");
        assert_eq!(value["instances"][0]["image"]["mimeType"], "image/png");
        assert_eq!(value["parameters"]["resolution"], "720p");
        assert_eq!(value["parameters"]["aspectRatio"], "9:16");
    }

    #[test]
    fn test_completed_operation_conversion() {
        let op: OperationResponse = serde_json::from_value(json!({
            "name": "models/veo/operations/abc",
            "done": true,
            "response": {
                "@type": "type.googleapis.com/google.ai.generativelanguage.v1beta.PredictLongRunningResponse",
                "generateVideoResponse": {
                    "generatedSamples": [
                        { "video": { "uri": "https://example.com/files/v1:download?alt=media" } }
                    ]
                }
            }
        }))
        .unwrap();

        let job = GenerationJob::from(op);
        assert!(job.done);
        assert!(job.failure.is_none());
        assert_eq!(
            job.first_artifact(),
            Some("https://example.com/files/v1:download?alt=media")
        );
    }

    #[test]
    fn test_pending_operation_conversion() {
        let op: OperationResponse =
            serde_json::from_value(json!({ "name": "operations/1" })).unwrap();
        let job = GenerationJob::from(op);
        assert!(!job.done);
        assert!(job.video_uris.is_empty());
    }

    #[test]
    fn test_failed_operation_maps_grpc_code() {
        let op: OperationResponse = serde_json::from_value(json!({
            "name": "operations/1",
            "done": true,
            "error": { "code": 16, "message": "API key not valid" }
        }))
        .unwrap();

        let job = GenerationJob::from(op);
        let failure = job.failure.unwrap();
        assert_eq!(failure.code.as_deref(), Some("UNAUTHENTICATED"));
        assert!(failure.is_auth());
    }

    #[test]
    fn test_error_envelope_parsing() {
        let body = r#"{
            "error": {
                "code": 404,
                "message": "Requested entity was not found.",
                "status": "NOT_FOUND"
            }
        }"#;

        let err = api_error(StatusCode::NOT_FOUND, body);
        assert_eq!(err.status, Some(404));
        assert_eq!(err.code.as_deref(), Some("NOT_FOUND"));
        assert!(err.is_auth());

        let err = api_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.status, Some(502));
        assert!(err.message.contains("upstream down"));
        assert!(!err.is_auth());
    }

    #[test]
    fn test_chat_request_replays_history() {
        let mut session = ChatSession::new("persona text");
        session.history.push(ChatTurn {
            role: ChatRole::User,
            text: "hi".to_string(),
        });
        session.history.push(ChatTurn {
            role: ChatRole::Model,
            text: "hello".to_string(),
        });

        let value = serde_json::to_value(build_chat_request(&session, "make it moody")).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "persona text");
        assert!(value["systemInstruction"].get("role").is_none());

        let contents = value["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "make it moody");
    }

    #[test]
    fn test_chat_reply_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "role": "model", "parts": [ { "text": "Try " }, { "text": "golden hour." } ] } }
            ]
        }))
        .unwrap();

        let reply: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        assert_eq!(reply, "Try golden hour.");
    }

    /// Serves one canned HTTP response and returns the captured request head
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&head).to_lowercase()
        });

        (base_url, server)
    }

    fn local_client(base_url: &str) -> GeminiClient {
        GeminiClient::new(
            base_url,
            Credential::new(Some("test-key".to_string())),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces_status_text() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 403 Forbidden\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                .to_string(),
        )
        .await;
        let client = local_client(&base_url);

        let err = client
            .fetch_artifact(&format!("{base_url}/v1beta/files/abc:download?alt=media"))
            .await
            .unwrap_err();
        assert_eq!(err.message, "Forbidden");
        assert_eq!(err.status, Some(403));

        let head = server.await.unwrap();
        assert!(head.starts_with("get /v1beta/files/abc:download?alt=media "));
        assert!(head.contains("x-goog-api-key: test-key"));
        assert!(!head.contains("key=test-key"));
    }

    #[tokio::test]
    async fn test_status_error_envelope_over_http() {
        let body = r#"{"error":{"code":401,"message":"API key not valid.","status":"UNAUTHENTICATED"}}"#;
        let (base_url, server) = serve_once(format!(
            "HTTP/1.1 401 Unauthorized\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        ))
        .await;
        let client = local_client(&base_url);

        let err = client
            .video_status(&GenerationJob::pending("operations/42"))
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(401));
        assert_eq!(err.code.as_deref(), Some("UNAUTHENTICATED"));
        assert_eq!(err.message, "API key not valid.");
        assert!(err.is_auth());

        let head = server.await.unwrap();
        assert!(head.starts_with("get /v1beta/operations/42 "));
    }
}

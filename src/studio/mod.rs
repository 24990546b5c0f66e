//! Image and video request orchestration.
//!
//! `Studio` owns the observable [`StudioView`] and drives each request from
//! submission to a published result or banner. Every job takes a fresh
//! generation from the [`JobTracker`]; a job whose generation is no longer
//! current never writes to the view again.

pub mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::consts::{
    FETCHING_VIDEO_MESSAGE, IMAGE_FAILURE_MESSAGE, IMAGE_MODEL, IMAGE_OUTPUT_MIME,
    IMAGE_PROGRESS_MESSAGE, POLLING_FAILURE_MESSAGE, POLL_INTERVAL, PROGRESS_INTERVAL,
    VIDEO_COUNT, VIDEO_FAILURE_MESSAGE, VIDEO_MODEL, VIDEO_PROGRESS_MESSAGES, VIDEO_RESOLUTION,
};
use crate::error::{RemoteError, StudioError};
use crate::key_gate::KeyGate;
use crate::poller::{JobPoller, JobToken, JobTracker, PollOutcome, ProgressTask, ProgressTicker};
use crate::remote::{GenerationJob, ImageGenerationParams, MediaBackend, VideoGenerationParams};

pub use types::{
    AspectRatio, GenerationResult, ImageArtifact, ImageRequest, SourceImage, StudioView, Style,
    VideoArtifact, VideoAspectRatio, VideoRequest,
};

#[derive(Debug, Clone)]
pub struct StudioSettings {
    pub image_model: String,
    pub video_model: String,
    pub video_resolution: String,
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    /// Where finished videos are written
    pub output_dir: PathBuf,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            image_model: IMAGE_MODEL.to_string(),
            video_model: VIDEO_MODEL.to_string(),
            video_resolution: VIDEO_RESOLUTION.to_string(),
            poll_interval: POLL_INTERVAL,
            progress_interval: PROGRESS_INTERVAL,
            output_dir: PathBuf::from("generated"),
        }
    }
}

impl From<&AppConfig> for StudioSettings {
    fn from(conf: &AppConfig) -> Self {
        Self {
            image_model: conf.image_model.clone(),
            video_model: conf.video_model.clone(),
            video_resolution: conf.video_resolution.clone(),
            poll_interval: conf.poll_interval(),
            progress_interval: conf.progress_interval(),
            output_dir: conf.output_dir.clone(),
        }
    }
}

/// Clears `busy` when the owning job ends, including when its future is
/// dropped mid-flight. Does nothing once the job is superseded.
struct BusyGuard<'a> {
    view: &'a watch::Sender<StudioView>,
    token: &'a JobToken,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.token.is_current() {
            self.view.send_if_modified(|view| std::mem::replace(&mut view.busy, false));
        }
    }
}

/// Publishes a progress message unless `token` was superseded. The check runs
/// under the view lock, so a newer job's first message is never overwritten.
fn publish_progress(view: &watch::Sender<StudioView>, token: &JobToken, message: &str) -> bool {
    view.send_if_modified(|v| {
        if !token.is_current() {
            return false;
        }
        v.progress_message = message.to_string();
        true
    })
}

fn ensure_current(token: &JobToken) -> Result<(), StudioError> {
    if token.is_current() {
        Ok(())
    } else {
        Err(StudioError::Superseded)
    }
}

pub struct Studio {
    media: Arc<dyn MediaBackend>,
    gate: Arc<KeyGate>,
    tracker: Arc<JobTracker>,
    view: Arc<watch::Sender<StudioView>>,
    settings: StudioSettings,
}

impl Studio {
    pub fn new(media: Arc<dyn MediaBackend>, gate: Arc<KeyGate>, settings: StudioSettings) -> Self {
        let (view, _) = watch::channel(StudioView::default());
        Self {
            media,
            gate,
            tracker: Arc::new(JobTracker::default()),
            view: Arc::new(view),
            settings,
        }
    }

    #[cfg(test)]
    pub fn view(&self) -> StudioView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StudioView> {
        self.view.subscribe()
    }

    #[cfg(test)]
    pub fn dismiss_banner(&self) {
        self.view.send_modify(|view| view.banner = None);
    }

    pub async fn probe_credential(&self) -> bool {
        let selected = self.gate.probe().await;
        self.view
            .send_modify(|view| view.credential_selected = selected);
        selected
    }

    pub async fn request_credential(&self) {
        self.gate.request_selection().await;
        self.view.send_modify(|view| view.credential_selected = true);
    }

    /// Generates images without touching the view.
    pub async fn request_images(
        &self,
        request: &ImageRequest,
    ) -> Result<Vec<ImageArtifact>, StudioError> {
        request.validate()?;

        let params = ImageGenerationParams {
            model: self.settings.image_model.clone(),
            prompt: request.composed_prompt(),
            count: request.count,
            output_mime_type: IMAGE_OUTPUT_MIME.to_string(),
            aspect_ratio: request.aspect_ratio.to_string(),
        };
        info!(
            "Requesting {} image(s) at {} from {}",
            params.count, params.aspect_ratio, params.model
        );

        let images = self.media.generate_images(&params).await.map_err(|e| {
            error!("Image generation failed: {}", e);
            StudioError::GenerationFailure(IMAGE_FAILURE_MESSAGE.to_string())
        })?;

        Ok(images
            .iter()
            .map(|bytes| ImageArtifact::from_bytes(IMAGE_OUTPUT_MIME, bytes))
            .collect())
    }

    /// Starts a video job without touching the view.
    pub async fn submit_video(&self, request: &VideoRequest) -> Result<GenerationJob, StudioError> {
        self.check_video_request(request)?;

        self.media
            .generate_video(&self.video_params(request))
            .await
            .map_err(|e| {
                self.classify(
                    &e,
                    StudioError::GenerationFailure(VIDEO_FAILURE_MESSAGE.to_string()),
                )
            })
    }

    /// Full image workflow: publishes busy state, then the images or a banner.
    pub async fn generate_images(
        &self,
        request: &ImageRequest,
    ) -> Result<Vec<ImageArtifact>, StudioError> {
        if let Err(e) = request.validate() {
            self.show_banner(&e);
            return Err(e);
        }

        let token = self.tracker.begin();
        let _busy = BusyGuard {
            view: &self.view,
            token: &token,
        };
        self.start_job(IMAGE_PROGRESS_MESSAGE);

        let result = self.request_images(request).await;
        ensure_current(&token)?;

        self.view.send_modify(|view| match &result {
            Ok(images) => view.result = GenerationResult::Images(images.clone()),
            Err(e) => view.banner = Some(e.to_string()),
        });
        result
    }

    /// Full video workflow: submit, poll with a progress ticker, fetch the
    /// artifact into the output directory, publish.
    ///
    /// Returns `Superseded` when a newer request started in the meantime; in
    /// that case nothing of this job reaches the view.
    pub async fn generate_video(&self, request: &VideoRequest) -> Result<VideoArtifact, StudioError> {
        if let Err(e) = self.check_video_request(request) {
            self.show_banner(&e);
            return Err(e);
        }

        let token = self.tracker.begin();
        let _busy = BusyGuard {
            view: &self.view,
            token: &token,
        };
        info!("Starting video job {}", token.id());
        self.start_job(ProgressTicker::new(VIDEO_PROGRESS_MESSAGES).current());

        let result = self.run_video_job(request, &token).await;
        ensure_current(&token)?;

        self.view.send_modify(|view| match &result {
            Ok(video) => view.result = GenerationResult::Video(video.clone()),
            Err(e) => view.banner = Some(e.to_string()),
        });
        result
    }

    async fn run_video_job(
        &self,
        request: &VideoRequest,
        token: &JobToken,
    ) -> Result<VideoArtifact, StudioError> {
        // Step 1: submit
        let submitted = self.media.generate_video(&self.video_params(request)).await;
        ensure_current(token)?;
        let job = submitted.map_err(|e| {
            self.classify(
                &e,
                StudioError::GenerationFailure(VIDEO_FAILURE_MESSAGE.to_string()),
            )
        })?;
        info!("Video job {} submitted as {}", token.id(), job.name);

        // Step 2: poll, rotating progress messages meanwhile
        let ticker = {
            let view = self.view.clone();
            let token = token.clone();
            ProgressTask::spawn(
                VIDEO_PROGRESS_MESSAGES,
                self.settings.progress_interval,
                move |message| {
                    publish_progress(&view, &token, message);
                },
            )
        };
        let poller = JobPoller::new(self.media.clone()).with_interval(self.settings.poll_interval);
        let polled = poller.run(job, token).await;
        ticker.stop();

        let job = match polled {
            Ok(PollOutcome::Complete(job)) => job,
            Ok(PollOutcome::Superseded) => return Err(StudioError::Superseded),
            Err(e) => {
                ensure_current(token)?;
                return Err(self.classify(
                    &e,
                    StudioError::PollingFailure(POLLING_FAILURE_MESSAGE.to_string()),
                ));
            }
        };
        ensure_current(token)?;

        if let Some(failure) = &job.failure {
            let message = if failure.message.is_empty() {
                POLLING_FAILURE_MESSAGE.to_string()
            } else {
                failure.message.clone()
            };
            return Err(self.classify(failure, StudioError::PollingFailure(message)));
        }

        // Step 3: fetch the first artifact
        let uri = match job.first_artifact() {
            Some(uri) => uri.to_string(),
            None => {
                warn!("Job {} completed without a video locator", job.name);
                return Err(StudioError::ArtifactMissing);
            }
        };

        self.view
            .send_modify(|view| view.progress_message = FETCHING_VIDEO_MESSAGE.to_string());
        let fetched = self.media.fetch_artifact(&uri).await;
        ensure_current(token)?;
        let bytes = fetched.map_err(|e| {
            error!("Failed to fetch video {}: {}", uri, e);
            StudioError::ArtifactFetchFailure(e.message)
        })?;

        self.store_video(uri, &bytes).await
    }

    async fn store_video(&self, uri: String, bytes: &[u8]) -> Result<VideoArtifact, StudioError> {
        let dir = &self.settings.output_dir;
        let path = dir.join(format!(
            "video-{}-{}.mp4",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ));

        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, bytes).await
        }
        .await;
        if let Err(e) = written {
            error!("Failed to write video to {}: {}", path.display(), e);
            return Err(StudioError::ArtifactFetchFailure(e.to_string()));
        }

        info!("Saved video ({} bytes) to {}", bytes.len(), path.display());
        Ok(VideoArtifact {
            source_uri: uri,
            path,
            size_bytes: bytes.len(),
        })
    }

    fn check_video_request(&self, request: &VideoRequest) -> Result<(), StudioError> {
        if !self.gate.is_selected() {
            return Err(StudioError::CredentialRequired);
        }
        request.validate()
    }

    fn video_params<'a>(&self, request: &'a VideoRequest) -> VideoGenerationParams<'a> {
        VideoGenerationParams {
            model: self.settings.video_model.clone(),
            prompt: request.prompt.clone(),
            image_bytes: &request.image.bytes,
            mime_type: request.image.mime_type.clone(),
            video_count: VIDEO_COUNT,
            resolution: self.settings.video_resolution.clone(),
            aspect_ratio: request.aspect_ratio.to_string(),
        }
    }

    /// Maps a remote failure to its banner error. Auth-shaped failures also
    /// drop the credential-selected state.
    fn classify(&self, err: &RemoteError, fallback: StudioError) -> StudioError {
        if err.is_auth() {
            warn!("Remote call rejected the credential: {}", err);
            self.gate.invalidate();
            self.view.send_modify(|view| view.credential_selected = false);
            return StudioError::AuthFailure;
        }

        error!("Remote call failed: {}", err);
        fallback
    }

    fn start_job(&self, message: &str) {
        self.view.send_modify(|view| {
            view.busy = true;
            view.banner = None;
            view.result = GenerationResult::None;
            view.progress_message = message.to_string();
        });
    }

    fn show_banner(&self, err: &StudioError) {
        self.view.send_modify(|view| view.banner = Some(err.to_string()));
    }
}

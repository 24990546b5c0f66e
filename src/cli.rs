use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::app_state::AppState;
use crate::consts::{
    DEFAULT_IMAGE_PROMPT, DEFAULT_NEGATIVE_PROMPT, DEFAULT_VIDEO_PROMPT, MAX_IMAGE_COUNT,
    MIN_IMAGE_COUNT,
};
use crate::studio::{
    AspectRatio, ImageRequest, SourceImage, Style, VideoAspectRatio, VideoRequest,
};

#[derive(Parser)]
#[command(name = "genstudio")]
#[command(about = "Generate images and image-to-video clips, and get help with prompts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./genstudio.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate still images from a prompt
    Image {
        #[arg(short, long, default_value = DEFAULT_IMAGE_PROMPT)]
        prompt: String,

        /// Things the image should not contain
        #[arg(long, default_value = DEFAULT_NEGATIVE_PROMPT)]
        negative_prompt: String,

        /// Realistic, Anime, Cyberpunk, Noir or Documentary
        #[arg(short, long, default_value_t = Style::Realistic)]
        style: Style,

        /// Number of images (1-4)
        #[arg(short = 'n', long, default_value_t = 1,
              value_parser = clap::value_parser!(u8).range(MIN_IMAGE_COUNT as i64..=MAX_IMAGE_COUNT as i64))]
        count: u8,

        /// 1:1, 16:9, 9:16, 4:3 or 3:4
        #[arg(short, long, default_value_t = AspectRatio::Square)]
        aspect_ratio: AspectRatio,

        /// Output directory (defaults to the configured output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Animate a still image into a short video
    Video {
        /// Source image (png, jpg, webp or gif, at most 4MB)
        image: PathBuf,

        #[arg(short, long, default_value = DEFAULT_VIDEO_PROMPT)]
        prompt: String,

        /// 16:9 or 9:16
        #[arg(short, long, default_value_t = VideoAspectRatio::Landscape)]
        aspect_ratio: VideoAspectRatio,

        /// Print the operation name and exit without waiting for the video
        #[arg(long)]
        submit_only: bool,
    },

    /// Chat with the prompt assistant
    Chat,
}

pub async fn run(command: Commands, state: &AppState) -> Result<()> {
    if !state.studio.probe_credential().await {
        state.studio.request_credential().await;
    }

    match command {
        Commands::Image {
            prompt,
            negative_prompt,
            style,
            count,
            aspect_ratio,
            output,
        } => {
            let request = ImageRequest {
                prompt,
                negative_prompt,
                style,
                count,
                aspect_ratio,
            };
            let output = output.unwrap_or_else(|| state.config.output_dir.clone());
            image_command(state, request, output).await
        }
        Commands::Video {
            image,
            prompt,
            aspect_ratio,
            submit_only,
        } => video_command(state, image, prompt, aspect_ratio, submit_only).await,
        Commands::Chat => chat_command(state).await,
    }
}

async fn image_command(state: &AppState, request: ImageRequest, output: PathBuf) -> Result<()> {
    let images = state.studio.generate_images(&request).await?;

    tokio::fs::create_dir_all(&output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let stamp = Utc::now().timestamp_millis();
    for (i, image) in images.iter().enumerate() {
        let bytes = image.decode().context("Generated image is not valid base64")?;
        let extension = image.mime_type().map_or("png", extension_for);
        let path = output.join(format!("image-{}-{}.{}", stamp, i + 1, extension));
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{}", path.display());
    }

    info!("Saved {} image(s) to {}", images.len(), output.display());
    Ok(())
}

async fn video_command(
    state: &AppState,
    image: PathBuf,
    prompt: String,
    aspect_ratio: VideoAspectRatio,
    submit_only: bool,
) -> Result<()> {
    let mime_type = mime_type_for(&image)
        .with_context(|| format!("Unsupported image type: {}", image.display()))?;
    let bytes = tokio::fs::read(&image)
        .await
        .with_context(|| format!("Failed to read {}", image.display()))?;

    let request = VideoRequest {
        prompt,
        image: SourceImage {
            bytes,
            mime_type: mime_type.to_string(),
        },
        aspect_ratio,
    };

    if submit_only {
        let job = state.studio.submit_video(&request).await?;
        info!("Submitted video job {}", job.name);
        println!("{}", job.name);
        return Ok(());
    }

    let mut updates = state.studio.subscribe();
    let progress = tokio::spawn(async move {
        let mut last = String::new();
        while updates.changed().await.is_ok() {
            let message = {
                let view = updates.borrow_and_update();
                if !view.busy || view.progress_message == last {
                    continue;
                }
                view.progress_message.clone()
            };
            eprintln!("{message}");
            last = message;
        }
    });

    let result = state.studio.generate_video(&request).await;
    progress.abort();

    let video = result?;
    println!("{}", video.path.display());
    Ok(())
}

async fn chat_command(state: &AppState) -> Result<()> {
    let conversation = &state.conversation;
    conversation.reset().await;
    conversation.ensure().await;
    println!("{}", conversation.greeting());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        std::io::stderr().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                conversation.reset().await;
                println!("{}", conversation.greeting());
            }
            text => println!("{}", conversation.send(text).await),
        }
    }

    Ok(())
}

fn mime_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_image_defaults() {
        let cli = Cli::parse_from(["genstudio", "image"]);
        match cli.command {
            Commands::Image {
                prompt,
                negative_prompt,
                style,
                count,
                aspect_ratio,
                output,
            } => {
                assert_eq!(prompt, DEFAULT_IMAGE_PROMPT);
                assert_eq!(negative_prompt, DEFAULT_NEGATIVE_PROMPT);
                assert_eq!(style, Style::Realistic);
                assert_eq!(count, 1);
                assert_eq!(aspect_ratio, AspectRatio::Square);
                assert!(output.is_none());
            }
            _ => panic!("expected image command"),
        }
    }

    #[test]
    fn test_video_arguments() {
        let cli = Cli::parse_from([
            "genstudio",
            "--verbose",
            "video",
            "lion.png",
            "--aspect-ratio",
            "9:16",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Video {
                image,
                prompt,
                aspect_ratio,
                submit_only,
            } => {
                assert_eq!(image, PathBuf::from("lion.png"));
                assert_eq!(prompt, DEFAULT_VIDEO_PROMPT);
                assert_eq!(aspect_ratio, VideoAspectRatio::Portrait);
                assert!(!submit_only);
            }
            _ => panic!("expected video command"),
        }
    }

    #[test]
    fn test_image_count_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["genstudio", "image", "-n", "5"]).is_err());
        assert!(Cli::try_parse_from(["genstudio", "image", "--style", "noir"]).is_ok());
    }

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(mime_type_for(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(mime_type_for(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_type_for(Path::new("dir/a.webp")), Some("image/webp"));
        assert_eq!(mime_type_for(Path::new("a.mp4")), None);
        assert_eq!(mime_type_for(Path::new("noext")), None);
    }

    #[test]
    fn test_image_extension_from_data_uri() {
        let png = crate::studio::ImageArtifact::from_bytes("image/png", b"x");
        let jpeg = crate::studio::ImageArtifact::from_bytes("image/jpeg", b"x");
        assert_eq!(png.mime_type().map_or("png", extension_for), "png");
        assert_eq!(jpeg.mime_type().map_or("png", extension_for), "jpg");
        assert_eq!(extension_for("application/octet-stream"), "png");
    }

    #[test]
    fn test_video_submit_only_flag() {
        let cli = Cli::parse_from(["genstudio", "video", "lion.png", "--submit-only"]);
        assert!(matches!(
            cli.command,
            Commands::Video {
                submit_only: true,
                ..
            }
        ));
    }
}

//! pilive - live HLS/DASH streaming for Raspberry Pi cameras.
//!
//! Pipes the camera capture binary into ffmpeg, which repackages the raw
//! H.264 stream into rotating segments, and serves the output directory
//! over HTTP.

use anyhow::{anyhow, Context};
use camera_stream::{CameraCommand, CameraOptions};
use clap::{Args, Parser, Subcommand};
use live_pipeline::{Pipeline, PipelineConfig, PipelineStatus};
use segment_mux::{ContainerFormat, SegmentType};
use static_server::ServerConfig;
use std::path::PathBuf;
use stream_encryption::EncryptionConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pilive")]
#[command(about = "Livestreaming tool for the Raspberry Pi Camera Module")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream video using HLS
    Hls(HlsArgs),
    /// Stream video using DASH
    Dash(DashArgs),
}

#[derive(Args)]
struct StreamArgs {
    /// Streaming video file hosting location (default: $HOME/camera)
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Video resolution width
    #[arg(short = 'w', long, default_value_t = 1280)]
    width: u32,

    /// Video resolution height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Video frames per second
    #[arg(short = 'r', long, default_value_t = 25)]
    framerate: u32,

    /// Flip the camera horizontally
    #[arg(short = 'x', long)]
    horizontal_flip: bool,

    /// Flip the camera vertically
    #[arg(short = 'y', long)]
    vertical_flip: bool,

    /// Camera capture command [raspivid, libcamera-vid]
    #[arg(long, default_value = "raspivid")]
    camera: String,

    /// Target segment duration in seconds
    #[arg(short = 't', long, default_value_t = 2)]
    segment_time: u32,

    /// Maximum number of playlist entries
    #[arg(short = 'l', long, default_value_t = 10)]
    playlist_size: u32,

    /// Number of segments kept on disk before removal
    #[arg(short = 's', long, default_value_t = 10)]
    storage_size: u32,

    /// Static file server port (0 picks the next available port)
    #[arg(short = 'p', long, default_value_t = 8080)]
    port: u16,

    /// Response compression level [0-9]
    #[arg(short = 'c', long, default_value_t = 9)]
    compression_level: u32,

    /// Load pipeline settings from a TOML file instead of the tuning flags
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct HlsArgs {
    #[command(flatten)]
    stream: StreamArgs,

    /// Format of the video segments [mpegts, fmp4]
    #[arg(long, default_value = "mpegts")]
    segment_type: String,

    /// Encrypt segments with an AES-128 key served next to the playlist
    #[arg(long)]
    encrypt: bool,

    /// Public base URL the key file is fetched from
    #[arg(long)]
    key_url: Option<String>,

    /// Key file name
    #[arg(long, default_value = "enc.key")]
    key_file: String,

    /// Key-info file name
    #[arg(long, default_value = "enc.keyinfo")]
    key_info_file: String,
}

#[derive(Args)]
struct DashArgs {
    #[command(flatten)]
    stream: StreamArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (pipeline_config, server_config) = match cli.command {
        Command::Hls(args) => hls_config(args)?,
        Command::Dash(args) => dash_config(args)?,
    };

    if !segment_mux::ffmpeg_available().await {
        return Err(anyhow!("ffmpeg not found - is it installed?"));
    }

    tracing::info!(
        format = %pipeline_config.format,
        directory = %pipeline_config.directory.display(),
        "starting camera stream"
    );

    let pipeline = Pipeline::start(pipeline_config).await?;
    let mut status = pipeline.status();

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(static_server::serve(server_config, shutdown.clone()));
    let mut server_done = false;

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
        changed = status.wait_for(PipelineStatus::is_terminal) => {
            match changed {
                Ok(status) => match &*status {
                    PipelineStatus::Failed(reason) => Err(anyhow!("pipeline failed: {reason}")),
                    _ => Ok(()),
                },
                Err(_) => Err(anyhow!("pipeline monitor went away")),
            }
        }
        served = &mut server => {
            server_done = true;
            match served {
                Ok(result) => result.context("file server failed"),
                Err(e) => Err(anyhow!("file server panicked: {e}")),
            }
        }
    };

    // Reverse of startup order: the muxer goes first inside the pipeline,
    // then the capture process, then the file server.
    pipeline.stop().await;
    shutdown.cancel();
    if !server_done {
        let _ = server.await;
    }

    result
}

fn hls_config(args: HlsArgs) -> anyhow::Result<(PipelineConfig, ServerConfig)> {
    let from_file = args.stream.config.is_some();
    let (mut pipeline, server) = stream_config(args.stream, ContainerFormat::Hls)?;

    // A config file carries its own segment type and encryption settings.
    if !from_file {
        pipeline.segment_type = args.segment_type.parse()?;
        pipeline.encryption = if args.encrypt {
            Some(EncryptionConfig {
                public_base_url: args.key_url,
                key_file_name: args.key_file,
                key_info_file_name: args.key_info_file,
            })
        } else {
            None
        };
    }
    Ok((pipeline, server))
}

fn dash_config(args: DashArgs) -> anyhow::Result<(PipelineConfig, ServerConfig)> {
    stream_config(args.stream, ContainerFormat::Dash)
}

fn stream_config(
    args: StreamArgs,
    format: ContainerFormat,
) -> anyhow::Result<(PipelineConfig, ServerConfig)> {
    let pipeline = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let directory = args
                .directory
                .clone()
                .unwrap_or_else(|| home_directory().join("camera"));
            let camera: CameraCommand = args.camera.parse()?;
            let mut config = PipelineConfig::new(directory, format);
            config.camera = CameraOptions {
                width: args.width,
                height: args.height,
                fps: args.framerate,
                horizontal_flip: args.horizontal_flip,
                vertical_flip: args.vertical_flip,
                camera,
            };
            config.segment_time = args.segment_time;
            config.playlist_size = args.playlist_size;
            config.storage_size = args.storage_size;
            config
        }
    };

    let server = ServerConfig {
        port: args.port,
        directory: pipeline.directory.clone(),
        compression_level: args.compression_level,
    };

    Ok((pipeline, server))
}

fn home_directory() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_the_documented_surface() {
        let cli = Cli::parse_from(["pilive", "hls"]);
        let Command::Hls(args) = cli.command else {
            panic!("expected hls subcommand");
        };
        assert_eq!(args.stream.width, 1280);
        assert_eq!(args.stream.height, 720);
        assert_eq!(args.stream.framerate, 25);
        assert_eq!(args.stream.segment_time, 2);
        assert_eq!(args.stream.playlist_size, 10);
        assert_eq!(args.stream.storage_size, 10);
        assert_eq!(args.stream.port, 8080);
        assert_eq!(args.segment_type, "mpegts");
        assert!(!args.encrypt);
    }

    #[test]
    fn hls_flags_build_an_encrypted_config() {
        let cli = Cli::parse_from([
            "pilive",
            "hls",
            "--directory",
            "/tmp/cam",
            "--encrypt",
            "--key-url",
            "https://cam.example.com",
            "--segment-type",
            "fmp4",
        ]);
        let Command::Hls(args) = cli.command else {
            panic!("expected hls subcommand");
        };
        let (pipeline, server) = hls_config(args).unwrap();

        assert_eq!(pipeline.format, ContainerFormat::Hls);
        assert_eq!(pipeline.segment_type, SegmentType::Fmp4);
        assert_eq!(pipeline.directory, PathBuf::from("/tmp/cam"));
        assert_eq!(server.directory, PathBuf::from("/tmp/cam"));
        let enc = pipeline.encryption.expect("encryption enabled");
        assert_eq!(
            enc.public_base_url.as_deref(),
            Some("https://cam.example.com")
        );
        assert_eq!(enc.key_file_name, "enc.key");
    }

    #[test]
    fn dash_flags_build_a_dash_config() {
        let cli = Cli::parse_from(["pilive", "dash", "--storage-size", "15"]);
        let Command::Dash(args) = cli.command else {
            panic!("expected dash subcommand");
        };
        let (pipeline, _) = dash_config(args).unwrap();
        assert_eq!(pipeline.format, ContainerFormat::Dash);
        assert_eq!(pipeline.storage_size, 15);
        assert!(pipeline.encryption.is_none());
    }

    #[test]
    fn unknown_camera_command_is_rejected() {
        let cli = Cli::parse_from(["pilive", "dash", "--camera", "gstreamer"]);
        let Command::Dash(args) = cli.command else {
            panic!("expected dash subcommand");
        };
        assert!(dash_config(args).is_err());
    }
}

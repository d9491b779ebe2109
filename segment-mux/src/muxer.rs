use crate::format::{ContainerFormat, SegmentType};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// How long a stopped process gets to exit on SIGTERM before SIGKILL.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the lifecycle event channel.
const EVENT_BUFFER: usize = 64;

/// Ways that ffmpeg may be configured to mux video into segments.
///
/// ffmpeg will step in and use its own defaults if a value is left at zero.
#[derive(Debug, Clone)]
pub struct MuxerOptions {
    /// Output container format
    pub format: ContainerFormat,
    /// Framerate of the output video
    pub fps: u32,
    /// Segment length target duration in seconds
    pub segment_time: u32,
    /// Maximum number of playlist entries
    pub playlist_size: u32,
    /// Number of segments kept on disk before removal
    pub storage_size: u32,
    /// Segment container for HLS output
    pub segment_type: SegmentType,
    /// Key-info file for HLS encryption, provisioned before the muxer starts
    pub key_info_file: Option<PathBuf>,
}

/// Lifecycle events emitted by a running muxer.
///
/// `Started` is always delivered before the first `Diagnostic` for the same
/// process. Exit is not an event; observe it with [`Muxer::wait`].
#[derive(Debug, Clone)]
pub enum MuxEvent {
    /// The muxer process has been spawned with the given resolved command.
    Started { command: String },
    /// One human-readable line from the muxer's error stream.
    Diagnostic(String),
}

/// Handle to a running ffmpeg muxer process.
///
/// The handle owns the process exclusively and is inert after exit; a new
/// pipeline start constructs a new muxer.
#[derive(Debug)]
pub struct Muxer {
    child: Child,
    stopped: bool,
}

impl Muxer {
    /// Launch ffmpeg consuming `video` on stdin and writing segments plus a
    /// manifest into `directory`.
    ///
    /// Returns the handle and the lifecycle event receiver. The caller is
    /// responsible for `directory` existing before the spawn.
    pub fn spawn(
        video: Stdio,
        directory: &Path,
        options: &MuxerOptions,
    ) -> Result<(Self, mpsc::Receiver<MuxEvent>), MuxError> {
        let args = build_args(directory, options);
        spawn_process("ffmpeg", &args, video)
    }

    /// Wait for the process to exit.
    ///
    /// Safe to call from a `select!` branch; resolving again after exit
    /// returns the same status.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Stop the muxer: SIGTERM, bounded wait, then SIGKILL.
    ///
    /// Stopping an already-stopped muxer is a no-op.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Some(id) = self.child.id() {
            let _ = kill(Pid::from_raw(id as i32), Signal::SIGTERM);
        }

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(%status, "muxer exited");
            }
            Ok(Err(e)) => {
                tracing::warn!("error waiting for muxer to exit: {e}");
            }
            Err(_) => {
                tracing::warn!("muxer ignored SIGTERM, killing");
                let _ = self.child.kill().await;
            }
        }
    }
}

impl Drop for Muxer {
    fn drop(&mut self) {
        if !self.stopped {
            let _ = self.child.start_kill();
        }
    }
}

fn spawn_process(
    program: &str,
    args: &[String],
    video: Stdio,
) -> Result<(Muxer, mpsc::Receiver<MuxEvent>), MuxError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(video)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MuxError::FfmpegNotFound
            } else {
                MuxError::Io(e)
            }
        })?;

    let stderr = child.stderr.take().ok_or(MuxError::MissingStderr)?;

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    // The channel is fresh, so the start announcement cannot be rejected
    // and is guaranteed to precede every diagnostic line.
    let command = format!("{} {}", program, args.join(" "));
    let _ = tx.try_send(MuxEvent::Started { command });

    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(MuxEvent::Diagnostic(line)).await.is_err() {
                // Receiver gone; keep draining so the pipe never fills.
                break;
            }
        }
    });

    Ok((
        Muxer {
            child,
            stopped: false,
        },
        rx,
    ))
}

/// Derive the ffmpeg argument list for the configured format.
fn build_args(directory: &Path, options: &MuxerOptions) -> Vec<String> {
    match options.format {
        ContainerFormat::Hls => hls_args(directory, options),
        ContainerFormat::Dash => dash_args(directory, options),
    }
}

fn hls_args(directory: &Path, options: &MuxerOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "-re", "-i", "pipe:0", "-codec", "copy", "-f", "hls", "-an", "-strftime", "1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let mut hls_flags = vec!["second_level_segment_index"];

    args.push("-hls_segment_type".to_string());
    args.push(options.segment_type.ffmpeg_name().to_string());
    args.push("-hls_segment_filename".to_string());
    args.push(
        directory
            .join(format!("%s-%%d.{}", options.segment_type.extension()))
            .to_string_lossy()
            .to_string(),
    );

    if options.fps != 0 {
        args.push("-r".to_string());
        args.push(options.fps.to_string());
    }

    if options.segment_time != 0 {
        args.push("-hls_time".to_string());
        args.push(options.segment_time.to_string());
        hls_flags.push("split_by_time");
    }

    if options.playlist_size != 0 {
        args.push("-hls_list_size".to_string());
        args.push(options.playlist_size.to_string());
    }

    if options.storage_size != 0 {
        args.push("-hls_delete_threshold".to_string());
        args.push(options.storage_size.to_string());
        hls_flags.push("delete_segments");
    }

    if let Some(key_info) = &options.key_info_file {
        args.push("-hls_key_info_file".to_string());
        args.push(key_info.to_string_lossy().to_string());
    }

    args.push("-hls_flags".to_string());
    args.push(hls_flags.join("+"));
    args.push(
        directory
            .join(ContainerFormat::Hls.manifest_name())
            .to_string_lossy()
            .to_string(),
    );

    args
}

fn dash_args(directory: &Path, options: &MuxerOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "-re",
        "-i",
        "pipe:0",
        "-codec",
        "copy",
        "-f",
        "dash",
        "-an",
        "-dash_segment_type",
        "mp4",
        "-media_seg_name",
        "livestream-$Number$.m4s",
        "-init_seg_name",
        "init.m4s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if options.fps != 0 {
        args.push("-r".to_string());
        args.push(options.fps.to_string());
    }

    if options.segment_time != 0 {
        args.push("-seg_duration".to_string());
        args.push(options.segment_time.to_string());
    }

    if options.playlist_size != 0 {
        args.push("-window_size".to_string());
        args.push(options.playlist_size.to_string());
    }

    // Segments beyond the playlist window stay on disk until the retention
    // count is reached, so ffmpeg gets the difference.
    let extra_window = options.storage_size.saturating_sub(options.playlist_size);
    if extra_window != 0 {
        args.push("-extra_window_size".to_string());
        args.push(extra_window.to_string());
    }

    args.push(
        directory
            .join(ContainerFormat::Dash.manifest_name())
            .to_string_lossy()
            .to_string(),
    );

    args
}

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("unsupported container format: {0} (valid: \"hls\", \"dash\")")]
    UnsupportedFormat(String),
    #[error("unsupported segment type: {0} (valid: \"mpegts\", \"fmp4\")")]
    UnsupportedSegmentType(String),
    #[error("ffmpeg not found - is it installed?")]
    FfmpegNotFound,
    #[error("ffmpeg diagnostic pipe unavailable")]
    MissingStderr,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//! Segment muxer process handle.
//!
//! Owns the ffmpeg process that repackages a raw video byte stream into a
//! rotating set of HLS or DASH segments plus a manifest, without
//! re-encoding (`-codec copy`). Input arrives on ffmpeg's stdin through an
//! OS pipe, so a slow muxer applies back-pressure to the producer through
//! the kernel's pipe buffer rather than through any userspace queue.
//!
//! Lifecycle events (the resolved command on start, then one event per
//! diagnostic line) are delivered over a bounded channel; process exit is
//! observed with [`Muxer::wait`].

pub mod format;
pub mod muxer;

pub use format::{ContainerFormat, SegmentType};
pub use muxer::{MuxError, MuxEvent, Muxer, MuxerOptions};

/// Check if ffmpeg is available on the system.
pub async fn ffmpeg_available() -> bool {
    tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

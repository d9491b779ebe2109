//! Live transcoding pipeline supervisor.
//!
//! Composes the camera capture process and the segment muxer into one
//! supervised unit:
//!
//! ```text
//! camera binary --raw H.264--> ffmpeg --segments--> output directory
//!       ^                         |
//!       '----- failure propagation'
//! ```
//!
//! The supervisor ensures the output directory exists, provisions
//! encryption key material when configured, starts the capture process,
//! attaches its stdout to the muxer's stdin, and watches both processes.
//! Failure propagation is directional: a dead muxer always takes the
//! capture process down with it, so a camera is never left streaming into
//! a broken pipe.
//!
//! Failures after startup are reported through the [`PipelineStatus`]
//! watch channel, never through the original `start` call. A failed
//! pipeline is not restarted; the owner decides whether to start a fresh
//! one.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod status;

pub use config::{ConfigError, PipelineConfig};
pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use status::{FailureReason, PipelineStatus};

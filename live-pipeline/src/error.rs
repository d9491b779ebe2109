use crate::config::ConfigError;
use camera_stream::CaptureError;
use segment_mux::MuxError;
use stream_encryption::EncryptionError;
use thiserror::Error;

/// Startup errors for one pipeline run.
///
/// Every variant is fatal: `Pipeline::start` aborts synchronously and
/// leaves no process running. Failures after a successful start are
/// reported through the status channel instead (see
/// [`FailureReason`](crate::FailureReason)).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("output directory unavailable: {0}")]
    DirectoryUnavailable(std::io::Error),

    #[error("encryption setup failed: {0}")]
    EncryptionSetupFailed(#[from] EncryptionError),

    #[error("capture unavailable: {0}")]
    CaptureUnavailable(#[from] CaptureError),

    #[error("transcoder unavailable: {0}")]
    TranscoderUnavailable(#[from] MuxError),
}

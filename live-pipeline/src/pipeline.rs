use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::status::{FailureReason, PipelineStatus, StatusCell};
use camera_stream::{CaptureError, CaptureStream};
use segment_mux::{MuxEvent, Muxer};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a supervised capture-to-segments pipeline.
///
/// Created by [`Pipeline::start`]. Dropping the handle does not stop the
/// pipeline's processes immediately; call [`Pipeline::stop`] for an orderly
/// shutdown.
#[derive(Debug)]
pub struct Pipeline {
    status: Arc<StatusCell>,
    cancel: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    /// Start a pipeline run: ensure the output directory, provision key
    /// material if configured, launch the capture process, and attach the
    /// muxer to its output.
    ///
    /// Errors here are startup errors; nothing is left running when this
    /// returns `Err`. Once it returns `Ok` the run is supervised and any
    /// later failure arrives through [`Pipeline::status`].
    pub async fn start(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.directory)
            .await
            .map_err(PipelineError::DirectoryUnavailable)?;

        // Key material must be on disk before ffmpeg launches; it reads the
        // key-info path as an argument, not as a stream.
        let key_info_file = match &config.encryption {
            Some(enc) => Some(
                stream_encryption::provision(&config.directory, enc)
                    .await?
                    .key_info_path,
            ),
            None => None,
        };

        let mut capture = CaptureStream::spawn(&config.camera)?;

        let video = match capture.take_video() {
            Some(video) => video,
            None => {
                capture.stop().await;
                return Err(PipelineError::CaptureUnavailable(
                    CaptureError::MissingStdout,
                ));
            }
        };
        let video: Stdio = match video.try_into() {
            Ok(video) => video,
            Err(e) => {
                capture.stop().await;
                return Err(PipelineError::CaptureUnavailable(CaptureError::Io(e)));
            }
        };

        // A capture process must never outlive its consumer, so a muxer
        // launch failure tears the capture down before surfacing.
        let options = config.muxer_options(key_info_file);
        let (muxer, events) = match Muxer::spawn(video, &config.directory, &options) {
            Ok(spawned) => spawned,
            Err(e) => {
                capture.stop().await;
                return Err(PipelineError::TranscoderUnavailable(e));
            }
        };

        let status = Arc::new(StatusCell::new());
        let cancel = CancellationToken::new();
        let monitor = tokio::spawn(monitor(
            capture,
            muxer,
            events,
            status.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            status,
            cancel,
            monitor: Mutex::new(Some(monitor)),
        })
    }

    /// Subscribe to status updates for this run.
    pub fn status(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    /// Stop the pipeline: muxer first, then the capture process, the
    /// reverse of startup order, so the producer is never left without its
    /// consumer mid-shutdown.
    ///
    /// Calling `stop` again after the pipeline has already stopped (or
    /// failed) is a no-op that resolves immediately.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let monitor = self.monitor.lock().expect("monitor lock poisoned").take();
        if let Some(monitor) = monitor {
            let _ = monitor.await;
        }
    }
}

async fn monitor(
    mut capture: CaptureStream,
    mut muxer: Muxer,
    mut events: mpsc::Receiver<MuxEvent>,
    status: Arc<StatusCell>,
    cancel: CancellationToken,
) {
    let mut events_open = true;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("stopping pipeline");
                muxer.stop().await;
                capture.stop().await;
                status.transition(PipelineStatus::Stopped);
                break;
            }
            exit = muxer.wait() => {
                let code = exit.ok().and_then(|status| status.code());
                tracing::error!(?code, "transcoder terminated, stopping capture");
                status.transition(PipelineStatus::Failed(
                    FailureReason::TranscoderTerminated { code },
                ));
                capture.stop().await;
                break;
            }
            exit = capture.wait() => {
                let code = exit.ok().and_then(|status| status.code());
                tracing::error!(?code, "capture terminated, stopping transcoder");
                status.transition(PipelineStatus::Failed(
                    FailureReason::CaptureTerminated { code },
                ));
                muxer.stop().await;
                break;
            }
            event = events.recv(), if events_open => {
                match event {
                    Some(MuxEvent::Started { command }) => {
                        tracing::info!(%command, "started video muxer");
                        status.transition(PipelineStatus::Live);
                    }
                    Some(MuxEvent::Diagnostic(line)) => {
                        tracing::debug!(target: "transcoder", "{line}");
                    }
                    None => events_open = false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use segment_mux::ContainerFormat;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn camera_installed() -> bool {
        std::process::Command::new("raspivid")
            .arg("--help")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok()
    }

    #[tokio::test]
    async fn unwritable_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let config = PipelineConfig::new(blocker.join("camera"), ContainerFormat::Hls);
        let err = Pipeline::start(config).await.unwrap_err();
        assert!(matches!(err, PipelineError::DirectoryUnavailable(_)));
    }

    #[tokio::test]
    async fn invalid_config_fails_before_any_side_effect() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("camera");
        let mut config = PipelineConfig::new(output.clone(), ContainerFormat::Hls);
        config.storage_size = 1;

        let err = Pipeline::start(config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn key_material_lands_before_any_process() {
        // Needs an environment without the camera stack; on a real device
        // the capture would start successfully instead.
        if camera_installed() {
            eprintln!("camera stack present, skipping");
            return;
        }

        let dir = tempdir().unwrap();
        let output = dir.path().join("camera");
        let mut config = PipelineConfig::new(output.clone(), ContainerFormat::Hls);
        config.encryption = Some(stream_encryption::EncryptionConfig::default());

        let err = Pipeline::start(config).await.unwrap_err();
        assert!(matches!(err, PipelineError::CaptureUnavailable(_)));

        // Capture launch failed, but the directory and key files were
        // already provisioned in startup order.
        assert!(output.join("enc.key").exists());
        assert!(output.join("enc.keyinfo").exists());
    }

    #[tokio::test]
    async fn missing_camera_reports_capture_unavailable() {
        if camera_installed() {
            eprintln!("camera stack present, skipping");
            return;
        }

        let dir = tempdir().unwrap();
        let config = PipelineConfig::new(
            PathBuf::from(dir.path().join("camera")),
            ContainerFormat::Dash,
        );
        let err = Pipeline::start(config).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::CaptureUnavailable(CaptureError::CameraNotFound(_))
        ));
    }
}

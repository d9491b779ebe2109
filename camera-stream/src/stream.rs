use crate::options::CameraOptions;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStdout, Command};

/// How long a stopped process gets to exit on SIGTERM before SIGKILL.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to a running camera capture process.
///
/// The handle owns the process exclusively. Once the process has exited the
/// handle is inert; a new stream means a new `spawn`.
pub struct CaptureStream {
    child: Child,
    stopped: bool,
}

impl CaptureStream {
    /// Launch the capture binary with stdout piped.
    ///
    /// Fails fast with [`CaptureError::CameraNotFound`] when the binary is
    /// not installed, before any video is produced.
    pub fn spawn(options: &CameraOptions) -> Result<Self, CaptureError> {
        let binary = options.camera.binary();
        let args = options.to_args();

        tracing::debug!(binary, ?args, "spawning camera capture");

        let child = spawn_binary(binary, &args)?;

        Ok(Self {
            child,
            stopped: false,
        })
    }

    /// Take the raw video pipe. Yields `Some` exactly once.
    pub fn take_video(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Wait for the process to exit.
    ///
    /// Safe to call from a `select!` branch; resolving again after exit
    /// returns the same status.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Stop the capture process: SIGTERM, bounded wait, then SIGKILL.
    ///
    /// Stopping an already-stopped stream is a no-op.
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
                tracing::debug!(%status, "camera capture exited");
            }
            Ok(Err(e)) => {
                tracing::warn!("error waiting for camera capture to exit: {e}");
            }
            Err(_) => {
                tracing::warn!("camera capture ignored SIGTERM, killing");
                let _ = self.child.kill().await;
            }
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        if !self.stopped {
            let _ = self.child.start_kill();
        }
    }
}

fn spawn_binary(binary: &'static str, args: &[String]) -> Result<Child, CaptureError> {
    Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CaptureError::CameraNotFound(binary)
            } else {
                CaptureError::Io(e)
            }
        })
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("{0} not found - is the camera stack installed?")]
    CameraNotFound(&'static str),
    #[error("capture stdout pipe unavailable")]
    MissingStdout,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

use std::fmt;
use tokio::sync::watch;

/// Why a live pipeline stopped producing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The camera capture process exited while the pipeline was running.
    CaptureTerminated { code: Option<i32> },
    /// The muxer process exited while the pipeline was running.
    TranscoderTerminated { code: Option<i32> },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (process, code) = match self {
            FailureReason::CaptureTerminated { code } => ("capture process", code),
            FailureReason::TranscoderTerminated { code } => ("transcoder process", code),
        };
        match code {
            Some(code) => write!(f, "{process} exited with code {code}"),
            None => write!(f, "{process} was terminated by a signal"),
        }
    }
}

/// Observable state of one pipeline run.
///
/// `Failed` and `Stopped` are terminal except that an explicit shutdown may
/// move a failed pipeline to `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    Starting,
    Live,
    Failed(FailureReason),
    Stopped,
}

impl PipelineStatus {
    /// True once the pipeline can no longer become live.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Failed(_) | PipelineStatus::Stopped)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Starting => f.write_str("starting"),
            PipelineStatus::Live => f.write_str("live"),
            PipelineStatus::Failed(reason) => write!(f, "failed: {reason}"),
            PipelineStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// Single-writer status cell on a watch channel.
///
/// The supervisor and its monitor task are the only writers; every
/// transition goes through [`StatusCell::transition`], which rejects
/// anything that would move backwards out of a terminal state.
#[derive(Debug)]
pub(crate) struct StatusCell {
    tx: watch::Sender<PipelineStatus>,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(PipelineStatus::Starting);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.tx.subscribe()
    }

    /// Apply a transition if it is legal; returns whether it was applied.
    pub(crate) fn transition(&self, next: PipelineStatus) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|current| {
            if allowed(current, &next) {
                *current = next.clone();
                applied = true;
                true
            } else {
                false
            }
        });
        applied
    }
}

fn allowed(from: &PipelineStatus, to: &PipelineStatus) -> bool {
    match from {
        PipelineStatus::Starting => !matches!(to, PipelineStatus::Starting),
        PipelineStatus::Live => to.is_terminal(),
        PipelineStatus::Failed(_) => matches!(to, PipelineStatus::Stopped),
        PipelineStatus::Stopped => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_becomes_live() {
        let cell = StatusCell::new();
        assert!(cell.transition(PipelineStatus::Live));
        assert_eq!(*cell.subscribe().borrow(), PipelineStatus::Live);
    }

    #[test]
    fn live_never_goes_back_to_starting() {
        let cell = StatusCell::new();
        cell.transition(PipelineStatus::Live);
        assert!(!cell.transition(PipelineStatus::Starting));
        assert_eq!(*cell.subscribe().borrow(), PipelineStatus::Live);
    }

    #[test]
    fn failure_is_sticky() {
        let cell = StatusCell::new();
        cell.transition(PipelineStatus::Live);
        let reason = FailureReason::TranscoderTerminated { code: Some(1) };
        assert!(cell.transition(PipelineStatus::Failed(reason.clone())));
        assert!(!cell.transition(PipelineStatus::Live));
        assert!(!cell.transition(PipelineStatus::Failed(
            FailureReason::CaptureTerminated { code: None }
        )));
        assert_eq!(*cell.subscribe().borrow(), PipelineStatus::Failed(reason));
    }

    #[test]
    fn stop_reachable_from_anywhere_but_final() {
        let cell = StatusCell::new();
        assert!(cell.transition(PipelineStatus::Stopped));
        // A second stop has nothing to change.
        assert!(!cell.transition(PipelineStatus::Stopped));
        assert!(!cell.transition(PipelineStatus::Live));
        assert_eq!(*cell.subscribe().borrow(), PipelineStatus::Stopped);
    }

    #[test]
    fn explicit_stop_supersedes_failure() {
        let cell = StatusCell::new();
        cell.transition(PipelineStatus::Failed(FailureReason::CaptureTerminated {
            code: Some(137),
        }));
        assert!(cell.transition(PipelineStatus::Stopped));
    }

    #[test]
    fn failure_reason_formatting() {
        let by_code = FailureReason::TranscoderTerminated { code: Some(1) };
        assert_eq!(by_code.to_string(), "transcoder process exited with code 1");
        let by_signal = FailureReason::CaptureTerminated { code: None };
        assert_eq!(
            by_signal.to_string(),
            "capture process was terminated by a signal"
        );
    }
}

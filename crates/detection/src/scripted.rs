//! Detector that replays canned responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::{DetectionError, Detector, DetectorOutput};

/// One canned reply: a successful output or an unavailability message.
pub type ScriptedReply = Result<DetectorOutput, String>;

/// Returns queued replies in order, then repeats the fallback.
pub struct ScriptedDetector {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: ScriptedReply,
    calls: AtomicUsize,
    stalls: AtomicUsize,
}

impl ScriptedDetector {
    /// A detector that always answers with `output`.
    pub fn always(output: DetectorOutput) -> Self {
        Self::new(Vec::new(), Ok(output))
    }

    /// A detector that always reports itself unavailable.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(Vec::new(), Err(reason.into()))
    }

    /// Replay `replies` in order, then keep answering with `fallback`.
    pub fn new(replies: Vec<ScriptedReply>, fallback: ScriptedReply) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback,
            calls: AtomicUsize::new(0),
            stalls: AtomicUsize::new(0),
        }
    }

    /// Make the first `calls` detections never answer, like a hung model server.
    pub fn stalling(self, calls: usize) -> Self {
        self.stalls.store(calls, Ordering::SeqCst);
        self
    }

    /// Number of `detect` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, _image: &[u8]) -> Result<DetectorOutput, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stalled = self
            .stalls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            std::future::pending::<()>().await;
        }
        let reply = self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        reply.map_err(DetectionError::Unavailable)
    }
}

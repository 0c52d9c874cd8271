use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::error::EtlResult;
use crate::source::EventSource;

/// [`EventSource`] replaying a fixed list of frames.
///
/// By default the source ends once every frame was returned. With
/// [`VecSource::pending_when_exhausted`] it instead stays silent forever, like an idle live
/// stream.
#[derive(Debug)]
pub struct VecSource {
    frames: VecDeque<Bytes>,
    pending_when_exhausted: bool,
    exhausted: Arc<Notify>,
}

impl VecSource {
    pub fn new(frames: Vec<Bytes>) -> Self {
        Self {
            frames: frames.into(),
            pending_when_exhausted: false,
            exhausted: Arc::new(Notify::new()),
        }
    }

    pub fn pending_when_exhausted(mut self) -> Self {
        self.pending_when_exhausted = true;
        self
    }

    /// Returns a notification fired once every frame was handed out.
    ///
    /// Since frames are processed before the next one is requested, the notification also
    /// means every frame was fully processed.
    pub fn exhausted(&self) -> Arc<Notify> {
        self.exhausted.clone()
    }
}

impl EventSource for VecSource {
    fn name() -> &'static str {
        "vec"
    }

    async fn next_frame(&mut self) -> EtlResult<Option<Bytes>> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }

        self.exhausted.notify_one();
        if self.pending_when_exhausted {
            std::future::pending::<()>().await;
        }

        Ok(None)
    }
}

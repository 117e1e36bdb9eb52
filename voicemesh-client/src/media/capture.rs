use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// One 20 ms µ-law frame, see [`crate::media::mulaw`].
pub type AudioFrame = Bytes;

/// Releases the hardware behind a capture stream when dropped.
pub struct CaptureGuard(Option<Box<dyn FnOnce() + Send>>);

impl CaptureGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(release)))
    }

    pub fn noop() -> Self {
        Self(None)
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

pub struct CaptureStream {
    pub label: String,
    pub frames: mpsc::Receiver<AudioFrame>,
    pub guard: CaptureGuard,
}

/// Platform audio input.
///
/// `open` fails when permission is denied or no input device exists.
#[async_trait]
pub trait AudioCapture: Send + Sync + 'static {
    async fn open(&self) -> anyhow::Result<CaptureStream>;
}

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};
use voicemesh_client::media::{AudioCapture, CaptureGuard, CaptureStream};

/// Capture backend that tracks how many streams are open.
#[derive(Clone, Default)]
pub struct MockCapture {
    state: Arc<MockCaptureState>,
}

#[derive(Default)]
struct MockCaptureState {
    deny: AtomicBool,
    hold: AtomicBool,
    gate: Notify,
    opens: AtomicUsize,
    active: Arc<AtomicUsize>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `open` fails as if permission was denied.
    pub fn denying() -> Self {
        let capture = Self::default();
        capture.state.deny.store(true, Ordering::SeqCst);
        capture
    }

    /// `open` blocks until [`release_gate`](Self::release_gate) is called.
    pub fn gated() -> Self {
        let capture = Self::default();
        capture.state.hold.store(true, Ordering::SeqCst);
        capture
    }

    pub fn release_gate(&self) {
        self.state.hold.store(false, Ordering::SeqCst);
        self.state.gate.notify_one();
    }

    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Number of streams opened and not yet released.
    pub fn active_count(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active_count() > 0
    }
}

#[async_trait]
impl AudioCapture for MockCapture {
    async fn open(&self) -> anyhow::Result<CaptureStream> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        if self.state.hold.load(Ordering::SeqCst) {
            self.state.gate.notified().await;
        }
        if self.state.deny.load(Ordering::SeqCst) {
            anyhow::bail!("permission denied");
        }

        let (tx, frames) = mpsc::channel(8);
        let active = self.state.active.clone();
        active.fetch_add(1, Ordering::SeqCst);

        Ok(CaptureStream {
            label: "mock microphone".to_owned(),
            frames,
            guard: CaptureGuard::new(move || {
                drop(tx);
                active.fetch_sub(1, Ordering::SeqCst);
            }),
        })
    }
}

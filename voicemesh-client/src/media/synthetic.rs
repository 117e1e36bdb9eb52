use crate::media::capture::{AudioCapture, CaptureGuard, CaptureStream};
use crate::media::mulaw::{FRAME_DURATION, FRAME_SAMPLES, PcmFrameEncoder, SAMPLE_RATE};
use async_trait::async_trait;
use std::f32::consts::TAU;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Capture backend that generates audio instead of reading a device.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticCapture {
    tone_hz: Option<f32>,
}

impl SyntheticCapture {
    pub fn silence() -> Self {
        Self { tone_hz: None }
    }

    pub fn tone(hz: f32) -> Self {
        Self { tone_hz: Some(hz) }
    }

    fn label(&self) -> String {
        match self.tone_hz {
            Some(hz) => format!("synthetic tone {hz} Hz"),
            None => "synthetic silence".to_owned(),
        }
    }
}

#[async_trait]
impl AudioCapture for SyntheticCapture {
    async fn open(&self) -> anyhow::Result<CaptureStream> {
        let (tx, frames) = mpsc::channel(50);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let tone_hz = self.tone_hz;

        tokio::spawn(async move {
            let mut encoder = PcmFrameEncoder::new(SAMPLE_RATE, 1);
            let mut ticker = tokio::time::interval(FRAME_DURATION);
            let mut n: u64 = 0;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }

                let pcm: Vec<f32> = (0..FRAME_SAMPLES)
                    .map(|i| match tone_hz {
                        Some(hz) => {
                            let t = (n + i as u64) as f32 / SAMPLE_RATE as f32;
                            0.3 * (TAU * hz * t).sin()
                        }
                        None => 0.0,
                    })
                    .collect();
                n += FRAME_SAMPLES as u64;

                for frame in encoder.push_f32(&pcm) {
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
            }
            debug!("Synthetic capture stopped");
        });

        Ok(CaptureStream {
            label: self.label(),
            frames,
            guard: CaptureGuard::new(move || {
                let _ = stop_tx.send(());
            }),
        })
    }
}

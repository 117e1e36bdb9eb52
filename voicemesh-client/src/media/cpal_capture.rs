use crate::media::capture::{AudioCapture, AudioFrame, CaptureGuard, CaptureStream};
use crate::media::mulaw::PcmFrameEncoder;
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Default input device of the default host.
///
/// `cpal` streams are not `Send`, so each capture lives on its own thread
/// until the guard flips the stop flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalCapture;

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn open(&self) -> anyhow::Result<CaptureStream> {
        let (tx, frames) = mpsc::channel::<AudioFrame>(50);
        let (ready_tx, ready_rx) = oneshot::channel::<anyhow::Result<String>>();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        std::thread::Builder::new()
            .name("voicemesh-capture".into())
            .spawn(move || run_capture(tx, ready_tx, thread_stop))
            .context("failed to spawn capture thread")?;

        let label = ready_rx
            .await
            .map_err(|_| anyhow!("capture thread exited before the device opened"))??;

        info!("Microphone '{}' opened", label);
        Ok(CaptureStream {
            label,
            frames,
            guard: CaptureGuard::new(move || stop.store(true, Ordering::SeqCst)),
        })
    }
}

fn run_capture(
    tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<anyhow::Result<String>>,
    stop: Arc<AtomicBool>,
) {
    let stream = match build_stream(tx.clone()) {
        Ok((stream, label)) => {
            let _ = ready_tx.send(Ok(label));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    while !stop.load(Ordering::SeqCst) && !tx.is_closed() {
        std::thread::sleep(Duration::from_millis(50));
    }
    drop(stream);
    info!("Microphone released");
}

fn build_stream(tx: mpsc::Sender<AudioFrame>) -> anyhow::Result<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no input device available"))?;
    let label = device.name().unwrap_or_else(|_| "default input".to_owned());

    let supported = device
        .default_input_config()
        .context("failed to query input format")?;
    let format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let mut encoder = PcmFrameEncoder::new(config.sample_rate.0, config.channels);

    let on_error = |err| warn!("Capture stream error: {}", err);
    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| {
                for frame in encoder.push_f32(data) {
                    let _ = tx.try_send(frame);
                }
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| {
                for frame in encoder.push_i16(data) {
                    let _ = tx.try_send(frame);
                }
            },
            on_error,
            None,
        ),
        other => return Err(anyhow!("unsupported sample format {other:?}")),
    }
    .context("permission denied or device busy")?;

    stream.play().context("failed to start capture")?;
    Ok((stream, label))
}

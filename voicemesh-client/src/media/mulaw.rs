//! G.711 µ-law framing for the outgoing audio track.
//!
//! Every connection carries `audio/PCMU` at 8 kHz mono, 20 ms per packet.

use bytes::Bytes;
use std::time::Duration;

pub const SAMPLE_RATE: u32 = 8000;
pub const FRAME_SAMPLES: usize = 160;
pub const FRAME_DURATION: Duration = Duration::from_millis(20);
/// Encoded digital silence.
pub const SILENCE: u8 = 0xFF;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

pub fn encode_sample(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0
    };
    let pcm = pcm.min(CLIP) + BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}

pub fn decode_sample(byte: u8) -> i16 {
    let b = !byte;
    let exponent = ((b >> 4) & 0x07) as i32;
    let mantissa = (b & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if b & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

pub fn silence_frame() -> Bytes {
    Bytes::from_static(&[SILENCE; FRAME_SAMPLES])
}

/// Turns interleaved PCM at any rate into 160-byte µ-law frames.
///
/// Channels are averaged to mono and the signal is decimated by averaging
/// every input sample that falls into one 8 kHz output period.
pub struct PcmFrameEncoder {
    input_rate: u32,
    channels: usize,
    phase: u32,
    acc: f32,
    acc_len: u32,
    frame: Vec<u8>,
}

impl PcmFrameEncoder {
    pub fn new(input_rate: u32, channels: u16) -> Self {
        Self {
            input_rate: input_rate.max(1),
            channels: channels.max(1) as usize,
            phase: 0,
            acc: 0.0,
            acc_len: 0,
            frame: Vec::with_capacity(FRAME_SAMPLES),
        }
    }

    pub fn push_f32(&mut self, interleaved: &[f32]) -> Vec<Bytes> {
        let mut out = Vec::new();
        for chunk in interleaved.chunks_exact(self.channels) {
            let mono = chunk.iter().sum::<f32>() / self.channels as f32;
            self.push_mono(mono, &mut out);
        }
        out
    }

    pub fn push_i16(&mut self, interleaved: &[i16]) -> Vec<Bytes> {
        let mut out = Vec::new();
        for chunk in interleaved.chunks_exact(self.channels) {
            let mono = chunk.iter().map(|s| *s as f32 / 32768.0).sum::<f32>()
                / self.channels as f32;
            self.push_mono(mono, &mut out);
        }
        out
    }

    fn push_mono(&mut self, sample: f32, out: &mut Vec<Bytes>) {
        self.acc += sample;
        self.acc_len += 1;
        self.phase += SAMPLE_RATE;
        if self.phase < self.input_rate {
            return;
        }
        self.phase -= self.input_rate;

        let avg = self.acc / self.acc_len as f32;
        self.acc = 0.0;
        self.acc_len = 0;

        let pcm = (avg.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        self.frame.push(encode_sample(pcm));
        if self.frame.len() == FRAME_SAMPLES {
            let frame = std::mem::replace(&mut self.frame, Vec::with_capacity(FRAME_SAMPLES));
            out.push(Bytes::from(frame));
        }
    }
}

//! # WAV → Opus Pipeline
//!
//! Sequences the transcoding stages and surfaces the first failure to the caller.
//!
//! ## Stages:
//! 1. **Validate / Extract**: 44-byte header stripped, payload decoded to mono PCM
//! 2. **Resample**: mono PCM converted to the Opus sample rate
//! 3. **Upmix**: mono duplicated into interleaved stereo
//! 4. **Encode**: stereo split into 20 ms frames, each encoded and sent
//!
//! There is no branching and no retry: any stage failure ends the run. Packets
//! already handed to the output channel before a mid-stream failure stay sent;
//! the caller decides what to do with them.
//!
//! ## Usage:
//! ```no_run
//! use wav2opus::pipeline::encode;
//!
//! # fn load() -> Vec<u8> { Vec::new() }
//! let wav = load();
//! let (mut tx, rx) = std::sync::mpsc::channel::<Vec<u8>>();
//! let report = encode(&wav, &mut tx, 48000)?;
//! drop(tx);
//! assert_eq!(rx.iter().count(), report.frames);
//! # Ok::<(), wav2opus::error::PipelineError>(())
//! ```

use crate::audio::codec::{FrameEncoder, OpusFrameEncoder};
use crate::audio::framer::FrameDriver;
use crate::audio::resampler::resample;
use crate::audio::sink::FrameSink;
use crate::audio::upmix::mono_to_stereo;
use crate::audio::wav::WavPcm;
use crate::error::PipelineResult;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summary of a completed pipeline run.
///
/// ## Sample Generations:
/// - **mono_samples**: decoded from the WAV payload at `source_sample_rate`
/// - **resampled_samples**: mono at `target_sample_rate`
/// - **stereo_samples**: interleaved, twice `resampled_samples`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeReport {
    pub source_sample_rate: u32,
    pub target_sample_rate: u32,
    pub mono_samples: usize,
    pub resampled_samples: usize,
    pub stereo_samples: usize,
    /// Frames encoded and delivered to the output channel
    pub frames: usize,
    /// Stereo samples after the last complete frame, never encoded
    pub dropped_samples: usize,
    pub encoded_bytes: usize,
    pub elapsed_ms: u64,
}

/// Reusable pipeline bound to one frame encoder and one output sample rate.
///
/// ## Ownership:
/// The encoder is injected at construction and exclusively owned. Every run
/// borrows the pipeline mutably, so one `Encoder` never serves two runs at
/// once; concurrent transcodes each build their own.
pub struct Encoder<F = OpusFrameEncoder> {
    driver: FrameDriver<F>,
    sample_rate: u32,
}

impl Encoder<OpusFrameEncoder> {
    /// Pipeline backed by libopus at `sample_rate` (stereo, low delay, max bitrate).
    pub fn opus(sample_rate: u32) -> PipelineResult<Self> {
        Self::with_frame_encoder(OpusFrameEncoder::new(sample_rate)?, sample_rate)
    }
}

impl<F: FrameEncoder> Encoder<F> {
    /// Pipeline around any frame encoder, typically a mock in tests.
    pub fn with_frame_encoder(encoder: F, sample_rate: u32) -> PipelineResult<Self> {
        Ok(Self {
            driver: FrameDriver::new(encoder, sample_rate)?,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per encoded frame (both channels).
    pub fn frame_size(&self) -> usize {
        self.driver.frame_size()
    }

    /// Run the whole pipeline over raw WAV bytes.
    pub fn encode<S: FrameSink + ?Sized>(&mut self, wav: &[u8], sink: &mut S) -> PipelineResult<EncodeReport> {
        let pcm = WavPcm::parse(wav)?;
        self.encode_pcm(&pcm, sink)
    }

    /// Run resample → upmix → encode over already extracted PCM.
    pub fn encode_pcm<S: FrameSink + ?Sized>(&mut self, pcm: &WavPcm, sink: &mut S) -> PipelineResult<EncodeReport> {
        let started = Instant::now();
        debug!(
            source_rate = pcm.sample_rate,
            target_rate = self.sample_rate,
            samples = pcm.len(),
            "extracted wav payload"
        );

        let resampled = resample(&pcm.samples, pcm.sample_rate, self.sample_rate);
        debug!(samples = resampled.len(), "resampled");

        let stereo = mono_to_stereo(&resampled);
        debug!(
            samples = stereo.len(),
            frame_size = self.driver.frame_size(),
            frames = self.driver.frame_count(stereo.len()),
            "upmixed to stereo"
        );

        let stats = match self.driver.drive(&stereo, sink) {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "opus encoding aborted");
                return Err(err);
            }
        };

        let report = EncodeReport {
            source_sample_rate: pcm.sample_rate,
            target_sample_rate: self.sample_rate,
            mono_samples: pcm.len(),
            resampled_samples: resampled.len(),
            stereo_samples: stereo.len(),
            frames: stats.frames,
            dropped_samples: stats.dropped_samples,
            encoded_bytes: stats.encoded_bytes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            frames = report.frames,
            bytes = report.encoded_bytes,
            dropped_samples = report.dropped_samples,
            elapsed_ms = report.elapsed_ms,
            "wav encoded to opus"
        );
        Ok(report)
    }

    /// Give back the injected frame encoder.
    pub fn into_frame_encoder(self) -> F {
        self.driver.into_inner()
    }
}

/// Transcode `wav` to Opus frames at `opus_sample_rate`, sending each to `sink`.
///
/// ## Order of Checks:
/// The input is validated and decoded before the Opus encoder is built, so a
/// malformed file reports `MalformedInput` even when the rate is also invalid.
///
/// ## Returns:
/// - **Ok(EncodeReport)**: every complete frame was encoded and sent
/// - **Err(PipelineError)**: the first failing stage, see `PipelineError`
pub fn encode<S: FrameSink + ?Sized>(wav: &[u8], sink: &mut S, opus_sample_rate: u32) -> PipelineResult<EncodeReport> {
    let pcm = WavPcm::parse(wav)?;
    Encoder::opus(opus_sample_rate)?.encode_pcm(&pcm, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::framer::tests::RecordingEncoder;
    use crate::audio::wav::tests::{wav_bytes, wav_from_samples};
    use crate::error::PipelineError;

    fn mock_encoder(sample_rate: u32) -> Encoder<RecordingEncoder> {
        Encoder::with_frame_encoder(RecordingEncoder::default(), sample_rate).unwrap()
    }

    #[test]
    fn test_short_file_produces_no_frames() {
        // 8 kHz, 100 samples → 200 stereo samples < 320 per frame
        let wav = wav_bytes(8000, &[0u8; 200]);
        let mut encoder = mock_encoder(8000);
        let mut sink: Vec<Vec<u8>> = Vec::new();

        let report = encoder.encode(&wav, &mut sink).unwrap();

        assert_eq!(report.resampled_samples, 100);
        assert_eq!(report.stereo_samples, 200);
        assert_eq!(report.frames, 0);
        assert_eq!(report.dropped_samples, 200);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_too_short_input_sends_nothing() {
        let mut encoder = mock_encoder(8000);
        let mut sink: Vec<Vec<u8>> = Vec::new();

        let err = encoder.encode(&[0u8; 43], &mut sink).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput(_)));
        assert!(sink.is_empty());
        assert!(encoder.into_frame_encoder().frames.is_empty());
    }

    #[test]
    fn test_misaligned_payload_is_rejected() {
        let mut wav = wav_bytes(8000, &[]);
        wav.push(0);
        let mut sink: Vec<Vec<u8>> = Vec::new();

        match mock_encoder(8000).encode(&wav, &mut sink) {
            Err(PipelineError::MalformedInput(msg)) => assert!(msg.contains("aligned")),
            other => panic!("expected malformed input, got {:?}", other),
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_one_frame_at_16k() {
        // 480 mono samples → 960 stereo; one 640-sample frame, 320 dropped
        let samples: Vec<i16> = (0..480).map(|v| v as i16).collect();
        let wav = wav_from_samples(16000, &samples);
        assert_eq!(wav.len(), 1004);

        let mut encoder = mock_encoder(16000);
        let mut sink: Vec<Vec<u8>> = Vec::new();
        let report = encoder.encode(&wav, &mut sink).unwrap();

        assert_eq!(report.frames, 1);
        assert_eq!(report.dropped_samples, 320);
        assert_eq!(sink.len(), 1);

        let frames = encoder.into_frame_encoder().frames;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 640);
        // Stereo pairs of the first 320 mono samples
        assert_eq!(&frames[0][..6], &[0, 0, 1, 1, 2, 2]);
        assert_eq!(frames[0][639], 319);
    }

    #[test]
    fn test_resamples_before_framing() {
        // 1 s at 8 kHz → 16000 samples at 16 kHz → 32000 stereo → 50 frames
        let wav = wav_from_samples(8000, &vec![100i16; 8000]);
        let mut encoder = mock_encoder(16000);
        let mut sink: Vec<Vec<u8>> = Vec::new();
        let report = encoder.encode(&wav, &mut sink).unwrap();

        assert_eq!(report.source_sample_rate, 8000);
        assert_eq!(report.target_sample_rate, 16000);
        assert_eq!(report.resampled_samples, 16000);
        assert_eq!(report.frames, 50);
        assert_eq!(report.dropped_samples, 0);
        assert_eq!(sink.len(), 50);
        assert_eq!(encoder.driver.frame_count(report.stereo_samples), report.frames);
        assert!(encoder.into_frame_encoder().frames.iter().flatten().all(|&s| s == 100));
    }

    #[test]
    fn test_encoder_reusable_across_runs() {
        let mut encoder = mock_encoder(8000);
        let wav = wav_from_samples(8000, &[0i16; 160]);

        let mut first: Vec<Vec<u8>> = Vec::new();
        let mut second: Vec<Vec<u8>> = Vec::new();
        assert_eq!(encoder.encode(&wav, &mut first).unwrap().frames, 1);
        assert_eq!(encoder.encode(&wav, &mut second).unwrap().frames, 1);
        assert_eq!(encoder.into_frame_encoder().frames.len(), 2);
    }

    #[test]
    fn test_mid_stream_failure_keeps_sent_frames() {
        let failing = RecordingEncoder { fail_at: Some(1), ..Default::default() };
        let mut encoder = Encoder::with_frame_encoder(failing, 8000).unwrap();
        let wav = wav_from_samples(8000, &[0i16; 480]);
        let mut sink: Vec<Vec<u8>> = Vec::new();

        let err = encoder.encode(&wav, &mut sink).unwrap_err();
        assert!(matches!(err, PipelineError::EncodeFailure { frame: 1, .. }));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_opus_scenario_sends_one_packet() {
        let wav = wav_from_samples(16000, &vec![0i16; 480]);
        let (mut tx, rx) = std::sync::mpsc::channel::<Vec<u8>>();

        let report = encode(&wav, &mut tx, 16000).unwrap();
        drop(tx);

        let packets: Vec<Vec<u8>> = rx.iter().collect();
        assert_eq!(report.frames, 1);
        assert_eq!(packets.len(), 1);
        assert!(!packets[0].is_empty());
        assert!(packets[0].len() <= 640 * 2);
        assert_eq!(report.encoded_bytes, packets[0].len());
    }

    #[test]
    fn test_opus_resampled_tone() {
        // 100 ms of a 440 Hz tone at 22.05 kHz, encoded at 48 kHz
        let samples: Vec<i16> = (0..2205)
            .map(|i| ((i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 22050.0).sin() * 8000.0) as i16)
            .collect();
        let wav = wav_from_samples(22050, &samples);
        let mut sink: Vec<Vec<u8>> = Vec::new();

        let report = encode(&wav, &mut sink, 48000).unwrap();
        assert_eq!(report.resampled_samples, 4800);
        assert_eq!(report.frames, 5);
        assert_eq!(sink.len(), 5);
    }

    #[test]
    fn test_malformed_input_reported_before_bad_rate() {
        let mut sink: Vec<Vec<u8>> = Vec::new();
        assert!(matches!(encode(&[0u8; 10], &mut sink, 44100), Err(PipelineError::MalformedInput(_))));

        let wav = wav_from_samples(8000, &[0i16; 8]);
        assert!(matches!(encode(&wav, &mut sink, 44100), Err(PipelineError::EncoderConstruction(_))));
        assert!(sink.is_empty());
    }
}

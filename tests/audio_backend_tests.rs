// Unit tests for audio backend abstractions
//
// These tests verify the capture types and the outbound encoding path work
// together: device buffers in, fixed frames out, PCM16 chunks on the wire.

use astra_live::audio::{decode_pcm16, FrameAssembler};
use astra_live::{AudioBackendFactory, AudioFrame, AudioSource, CaptureConfig, EncodedChunk};

#[test]
fn test_audio_frame_creation() {
    let frame = AudioFrame {
        samples: vec![0.1, -0.2, 0.3],
        sample_rate: 16000,
        timestamp_ms: 1000,
    };

    assert_eq!(frame.samples.len(), 3);
    assert_eq!(frame.sample_rate, 16000);
    assert_eq!(frame.timestamp_ms, 1000);
}

#[test]
fn test_audio_frame_duration() {
    let frame = AudioFrame {
        samples: vec![0.0; 4096],
        sample_rate: 16000,
        timestamp_ms: 0,
    };
    assert!((frame.duration_secs() - 0.256).abs() < 1e-9);

    let empty_rate = AudioFrame {
        samples: vec![0.0; 10],
        sample_rate: 0,
        timestamp_ms: 0,
    };
    assert_eq!(empty_rate.duration_secs(), 0.0);
}

#[test]
fn test_capture_config_default() {
    let config = CaptureConfig::default();

    assert_eq!(config.sample_rate, 16000, "Live API expects 16kHz input");
    assert_eq!(config.frame_size, 4096);
}

#[test]
fn test_audio_source_types() {
    let mic = AudioSource::Microphone;
    let file = AudioSource::File("/tmp/prompt.wav".to_string());

    assert_eq!(mic, AudioSource::Microphone);
    assert_ne!(mic, file);
    assert_eq!(file, AudioSource::File("/tmp/prompt.wav".to_string()));
}

#[test]
fn test_factory_rejects_missing_file() {
    let result = AudioBackendFactory::create(
        AudioSource::File("/nonexistent/prompt.wav".to_string()),
        CaptureConfig::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_device_buffers_to_wire_chunks() {
    // 44.1kHz stereo device, buffers of 441 frames (10ms)
    let config = CaptureConfig::default();
    let mut assembler = FrameAssembler::new(44100, 2, &config);

    let mut frames = Vec::new();
    for buffer in 0..100 {
        let interleaved: Vec<f32> = (0..441)
            .flat_map(|i| {
                let t = (buffer * 441 + i) as f32 / 44100.0;
                let s = (2.0 * std::f32::consts::PI * 220.0 * t).sin() * 0.5;
                [s, s]
            })
            .collect();
        frames.extend(assembler.push(&interleaved));
    }

    // One second at 16kHz is three full 4096-sample frames
    assert_eq!(frames.len(), 3);
    let stamps: Vec<u64> = frames.iter().map(|f| f.timestamp_ms).collect();
    assert_eq!(stamps, vec![0, 256, 512]);

    for frame in &frames {
        assert_eq!(frame.samples.len(), 4096);
        assert_eq!(frame.sample_rate, 16000);

        let chunk = EncodedChunk::from_samples(&frame.samples, frame.sample_rate);
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");

        let decoded = decode_pcm16(&chunk.data).unwrap();
        assert_eq!(decoded.len(), frame.samples.len());
        for (orig, back) in frame.samples.iter().zip(&decoded) {
            assert!((orig - back).abs() <= 1.0 / 32768.0);
        }
    }
}

#[test]
fn test_out_of_range_samples_clamp_on_the_wire() {
    let chunk = EncodedChunk::from_samples(&[1.5, -1.5, 1.0, -1.0, 0.0], 16000);
    let decoded = decode_pcm16(&chunk.data).unwrap();

    assert!((decoded[0] - 32767.0 / 32768.0).abs() < 1e-6);
    assert_eq!(decoded[1], -1.0);
    assert!((decoded[2] - 32767.0 / 32768.0).abs() < 1e-6);
    assert_eq!(decoded[3], -1.0);
    assert_eq!(decoded[4], 0.0);
}

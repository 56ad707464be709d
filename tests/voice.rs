//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;

use alfred::voice::{
    Gate, Pcm16Decoder, SAMPLE_RATE, SegmenterState, SpeechSegmenter, WakeWord, calculate_energy,
    samples_to_wav,
};

mod common;

use common::{generate_silence, generate_sine_samples};

#[test]
fn test_wake_word_gates_commands() {
    let wake = WakeWord::new("alfred");

    assert_eq!(
        wake.gate("Alfred what's the weather today?"),
        Gate::Command("what's the weather today?".to_string())
    );
    assert_eq!(
        wake.gate("  ALFRED, turn off the lights  "),
        Gate::Command("turn off the lights".to_string())
    );
}

#[test]
fn test_wake_word_ignores_other_speech() {
    let wake = WakeWord::new("alfred");

    assert_eq!(wake.gate("what's the weather today?"), Gate::Ignored);
    assert_eq!(wake.gate("tell alfred to stop"), Gate::Ignored);
    assert_eq!(wake.gate("Alfredo sauce please"), Gate::Ignored);
    assert_eq!(wake.gate(""), Gate::Ignored);
}

#[test]
fn test_wake_word_alone() {
    let wake = WakeWord::new("alfred");

    assert_eq!(wake.gate("Alfred."), Gate::WakeOnly);
    assert_eq!(wake.gate("  alfred  "), Gate::WakeOnly);
}

#[test]
fn test_custom_wake_word_normalization() {
    let wake = WakeWord::new("  Jeeves ");
    assert_eq!(wake.token(), "jeeves");
    assert_eq!(
        wake.gate("jeeves: tea"),
        Gate::Command("tea".to_string())
    );
}

#[test]
fn test_speech_segment_completes_after_silence() {
    let mut segmenter = SpeechSegmenter::new();

    // Silent samples - should not trigger
    assert!(segmenter.push(&generate_silence(0.1)).is_none());
    assert_eq!(segmenter.state(), SegmenterState::Idle);

    // Loud samples - should start listening
    let speech = generate_sine_samples(440.0, 0.5, 0.3);
    assert!(segmenter.push(&speech).is_none());
    assert_eq!(segmenter.state(), SegmenterState::Listening);

    let more_speech = generate_sine_samples(440.0, 0.3, 0.3);
    assert!(segmenter.push(&more_speech).is_none());

    let silence = generate_silence(0.6);
    let segment = segmenter.push(&silence).expect("segment should complete");
    assert_eq!(segment.len(), speech.len() + more_speech.len() + silence.len());
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_short_noise_is_discarded() {
    let mut segmenter = SpeechSegmenter::new();

    segmenter.push(&generate_sine_samples(440.0, 0.1, 0.3));
    assert_eq!(segmenter.state(), SegmenterState::Listening);

    assert!(segmenter.push(&generate_silence(0.6)).is_none());
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_energy_of_sine() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let energy = calculate_energy(&samples);

    // RMS of a sine is amplitude / sqrt(2)
    assert!((energy - 0.5 / 2.0_f32.sqrt()).abs() < 0.01);
    assert!(calculate_energy(&generate_silence(0.1)) < f32::EPSILON);
}

#[test]
fn test_segment_encodes_as_wav() {
    let samples = generate_sine_samples(440.0, 0.25, 0.3);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, samples.len());
}

#[test]
fn test_pcm_decoder_across_chunk_boundaries() {
    let pcm: Vec<u8> = [0_i16, 16384, -16384, 32767]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();

    let mut decoder = Pcm16Decoder::default();
    let mut samples = Vec::new();
    for chunk in pcm.chunks(3) {
        samples.extend(decoder.decode(chunk));
    }

    assert_eq!(samples.len(), 4);
    assert!(samples[0].abs() < f32::EPSILON);
    assert!((samples[1] - 0.5).abs() < f32::EPSILON);
    assert!((samples[2] + 0.5).abs() < f32::EPSILON);
    assert!(samples[3] > 0.99);
}

use std::path::Path;
use std::process::Command;

use audio_annotator::exporter::{ClipExporter, FfmpegExporter};

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Write a silent mono PCM WAV of the given length
fn write_test_wav(path: &Path, seconds: u32, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..(seconds * sample_rate) {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn test_check_reports_missing_binary() {
    let exporter = FfmpegExporter::new("definitely-not-a-real-ffmpeg-binary");
    let err = exporter.check().unwrap_err();
    assert!(err.contains("not found"), "unexpected error: {}", err);
}

#[test]
fn test_check_ffmpeg() {
    if !ffmpeg_available() {
        eprintln!("Skipping test: FFmpeg not available");
        return;
    }
    let exporter = FfmpegExporter::new("ffmpeg");
    assert!(exporter.check().is_ok());
}

#[test]
fn test_exported_clip_covers_the_requested_interval() {
    if !ffmpeg_available() {
        eprintln!("Skipping test: FFmpeg not available");
        return;
    }

    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("tone.wav");
    let output = temp.path().join("tone_clip.wav");
    write_test_wav(&input, 3, 8000);

    let exporter = FfmpegExporter::new("ffmpeg");
    exporter.export(&input, &output, 1.0, 2.0).unwrap();

    assert!(output.is_file());
    let reader = hound::WavReader::open(&output).unwrap();
    let duration_secs = reader.duration() as f64 / reader.spec().sample_rate as f64;
    assert!(
        (duration_secs - 1.0).abs() < 0.1,
        "clip duration {} should be close to 1.0s",
        duration_secs
    );
}

#[test]
fn test_export_failure_carries_ffmpeg_stderr() {
    if !ffmpeg_available() {
        eprintln!("Skipping test: FFmpeg not available");
        return;
    }

    let temp = tempfile::tempdir().unwrap();
    let output = temp.path().join("out.wav");

    let exporter = FfmpegExporter::new("ffmpeg");
    let err = exporter
        .export(Path::new("/nonexistent/input.wav"), &output, 0.0, 1.0)
        .unwrap_err();
    assert!(err.starts_with("ffmpeg error:"), "unexpected error: {}", err);
    assert!(!err.trim_end().ends_with("ffmpeg error:"), "stderr detail missing: {}", err);
}

#[test]
fn test_reexport_overwrites_existing_output() {
    if !ffmpeg_available() {
        eprintln!("Skipping test: FFmpeg not available");
        return;
    }

    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("tone.wav");
    let output = temp.path().join("tone_clip.wav");
    write_test_wav(&input, 3, 8000);

    let exporter = FfmpegExporter::new("ffmpeg");
    exporter.export(&input, &output, 0.0, 1.0).unwrap();
    // Same output path again; the later export must win without prompting
    exporter.export(&input, &output, 0.0, 2.0).unwrap();

    let reader = hound::WavReader::open(&output).unwrap();
    let duration_secs = reader.duration() as f64 / reader.spec().sample_rate as f64;
    assert!(
        (duration_secs - 2.0).abs() < 0.1,
        "clip duration {} should be close to 2.0s",
        duration_secs
    );
}

use log::debug;
use std::path::Path;
use std::process::Command;

/// Produces a clip file covering `[start, end)` seconds of an input file.
///
/// The trimming backend is swappable so the region store can be exercised
/// without a media toolchain on the machine.
pub trait ClipExporter: Send + Sync {
    fn export(&self, input: &Path, output: &Path, start: f64, end: f64) -> Result<(), String>;
}

/// Trims audio by shelling out to ffmpeg with a stream copy (no re-encoding).
pub struct FfmpegExporter {
    binary: String,
}

impl FfmpegExporter {
    pub fn new(binary: impl Into<String>) -> Self {
        FfmpegExporter {
            binary: binary.into(),
        }
    }

    /// Check that the ffmpeg binary is present and runnable.
    ///
    /// Startup-time probe only; per-request exports do not re-probe.
    pub fn check(&self) -> Result<(), String> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .output()
            .map_err(|e| {
                format!(
                    "'{}' not found. Install FFmpeg and ensure it's in your PATH. Error: {}",
                    self.binary, e
                )
            })?;

        if !output.status.success() {
            return Err(format!("'{}' version check failed", self.binary));
        }

        debug!("ffmpeg is available at '{}'", self.binary);
        Ok(())
    }
}

impl ClipExporter for FfmpegExporter {
    /// Run `ffmpeg -y -i INPUT -ss START -t END-START -acodec copy OUTPUT`,
    /// blocking until the process exits.
    ///
    /// A non-positive duration is passed through unvalidated; ffmpeg's exit
    /// status decides the outcome. On failure the error carries ffmpeg's raw
    /// stderr text, and any partial output file is left behind.
    fn export(&self, input: &Path, output: &Path, start: f64, end: f64) -> Result<(), String> {
        let duration = end - start;

        let result = Command::new(&self.binary)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-ss")
            .arg(start.to_string())
            .arg("-t")
            .arg(duration.to_string())
            .args(["-acodec", "copy"])
            .arg(output)
            .output()
            .map_err(|e| format!("Failed to run '{}': {}", self.binary, e))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(format!("ffmpeg error: {}", stderr));
        }

        Ok(())
    }
}

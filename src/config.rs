use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_port() -> u16 {
    8000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_fragments_dir() -> PathBuf {
    PathBuf::from("fragments")
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_username() -> String {
    "Anonymous".to_string()
}

/// Server configuration file structure (TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port to listen on (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory for uploaded audio and PDF files (default: uploads)
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Directory for exported fragments and their sidecars (default: fragments)
    #[serde(default = "default_fragments_dir")]
    pub fragments_dir: PathBuf,
    /// Path to the ffmpeg binary (default: ffmpeg, resolved via PATH)
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Annotator name used when a request carries none (default: Anonymous)
    #[serde(default = "default_username")]
    pub default_username: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port(),
            upload_dir: default_upload_dir(),
            fragments_dir: default_fragments_dir(),
            ffmpeg_path: default_ffmpeg_path(),
            default_username: default_username(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Create the upload and fragment directories if they don't exist yet
    pub fn ensure_directories(&self) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&self.upload_dir).map_err(|e| {
            format!(
                "Failed to create upload directory '{}': {}",
                self.upload_dir.display(),
                e
            )
        })?;
        std::fs::create_dir_all(&self.fragments_dir).map_err(|e| {
            format!(
                "Failed to create fragments directory '{}': {}",
                self.fragments_dir.display(),
                e
            )
        })?;
        Ok(())
    }
}

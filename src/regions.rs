use chrono::{DateTime, Local};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::exporter::ClipExporter;

/// Timestamp format used in fragment filenames, second resolution
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

fn default_username() -> String {
    "Anonymous".to_string()
}

/// One metadata record per exported fragment, stored as a pretty-printed
/// UTF-8 JSON sidecar sharing the fragment's base name.
///
/// `output_file` names the fragment in the fragment store; `original_file`
/// names the upload it was cut from. Records are written once and never
/// modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentMetadata {
    pub original_file: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub comment: String,
    pub timestamp: String,
    pub output_file: String,
    #[serde(default = "default_username")]
    pub username: String,
}

/// Projection of a metadata record returned by the listing endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RegionSummary {
    pub start: f64,
    pub end: f64,
    pub comment: String,
    pub filename: String,
    pub username: String,
}

/// Request body for saving a region
///
/// `start` and `end` are required; a body missing either is rejected at the
/// deserialization boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveRegionRequest {
    pub audio_filename: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Split a filename into (stem, extension-with-dot)
fn split_name(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(idx) => filename.split_at(idx),
        None => (filename, ""),
    }
}

/// Fragment identity for an asset at a point in time:
/// `{base}_{YYYYMMDD_HHMMSS}{ext}`.
///
/// Second resolution: two saves of the same asset within one wall-clock
/// second produce the same name and the later write wins.
pub fn fragment_name(audio_filename: &str, at: DateTime<Local>) -> String {
    let (base, ext) = split_name(audio_filename);
    format!("{}_{}{}", base, at.format(TIMESTAMP_FORMAT), ext)
}

/// Export a region of an uploaded asset and persist its metadata.
///
/// Steps: derive the fragment identity from `at`, invoke the exporter, write
/// the JSON metadata sidecar, then the comment sidecar iff the comment is
/// non-empty. Any step failure short-circuits; nothing already written is
/// rolled back. Returns the new fragment's filename.
pub fn save_region(
    upload_dir: &Path,
    fragments_dir: &Path,
    exporter: &dyn ClipExporter,
    req: &SaveRegionRequest,
    username: &str,
    at: DateTime<Local>,
) -> Result<String, String> {
    if req.audio_filename.is_empty() {
        return Err("Missing audio filename".to_string());
    }

    let input_path = upload_dir.join(&req.audio_filename);
    if !input_path.is_file() {
        return Err(format!("Audio file '{}' not found", req.audio_filename));
    }

    let (base, _) = split_name(&req.audio_filename);
    let stamp = at.format(TIMESTAMP_FORMAT).to_string();
    let output_file = fragment_name(&req.audio_filename, at);
    let output_path = fragments_dir.join(&output_file);

    exporter.export(&input_path, &output_path, req.start, req.end)?;

    let metadata = FragmentMetadata {
        original_file: req.audio_filename.clone(),
        start_time: req.start,
        end_time: req.end,
        duration: req.end - req.start,
        comment: req.comment.clone(),
        timestamp: stamp.clone(),
        output_file: output_file.clone(),
        username: username.to_string(),
    };

    let metadata_path = fragments_dir.join(format!("{}_{}.json", base, stamp));
    let encoded = serde_json::to_string_pretty(&metadata)
        .map_err(|e| format!("Failed to encode metadata: {}", e))?;
    std::fs::write(&metadata_path, encoded)
        .map_err(|e| format!("Failed to write metadata '{}': {}", metadata_path.display(), e))?;

    if !req.comment.is_empty() {
        let comment_path = fragments_dir.join(format!("{}_{}.txt", base, stamp));
        std::fs::write(&comment_path, &req.comment)
            .map_err(|e| format!("Failed to write comment '{}': {}", comment_path.display(), e))?;
    }

    Ok(output_file)
}

/// List the saved regions belonging to an uploaded asset.
///
/// Scans the fragment store for `{base}_*.json`, parses each record and keeps
/// those whose `original_file` matches the requested filename exactly (the
/// prefix scan alone can pick up records of other assets sharing a base
/// name). Unparseable records are skipped with a warning. Directory listing
/// order; no sorting.
pub fn saved_regions_for(
    fragments_dir: &Path,
    audio_filename: &str,
) -> Result<Vec<RegionSummary>, String> {
    let (base, _) = split_name(audio_filename);
    let prefix = format!("{}_", base);

    let entries = std::fs::read_dir(fragments_dir)
        .map_err(|e| format!("Failed to read fragments directory: {}", e))?;

    let mut regions = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if !name.starts_with(&prefix) || !name.ends_with(".json") {
            continue;
        }

        let metadata = match read_metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping metadata file '{}': {}", path.display(), e);
                continue;
            }
        };

        if metadata.original_file != audio_filename {
            continue;
        }

        regions.push(RegionSummary {
            start: metadata.start_time,
            end: metadata.end_time,
            comment: metadata.comment,
            filename: metadata.output_file,
            username: metadata.username,
        });
    }

    Ok(regions)
}

/// Fetch the full metadata record for one fragment by its filename.
///
/// Strips the extension and looks up the sibling `.json`; a missing sidecar
/// is a not-found failure.
pub fn fragment_data(fragments_dir: &Path, filename: &str) -> Result<FragmentMetadata, String> {
    let (stem, _) = split_name(filename);
    let metadata_path = fragments_dir.join(format!("{}.json", stem));

    if !metadata_path.is_file() {
        return Err(format!("No metadata found for fragment '{}'", filename));
    }

    read_metadata(&metadata_path)
        .map_err(|e| format!("Failed to parse metadata for '{}': {}", filename, e))
}

fn read_metadata(path: &Path) -> Result<FragmentMetadata, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&raw).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fragment_name_format() {
        let at = Local.with_ymd_and_hms(2025, 1, 22, 14, 30, 0).unwrap();
        assert_eq!(
            fragment_name("lecture.mp3", at),
            "lecture_20250122_143000.mp3"
        );
    }

    #[test]
    fn fragment_name_without_extension() {
        let at = Local.with_ymd_and_hms(2025, 1, 22, 14, 30, 0).unwrap();
        assert_eq!(fragment_name("lecture", at), "lecture_20250122_143000");
    }

    #[test]
    fn fragment_name_keeps_inner_dots() {
        let at = Local.with_ymd_and_hms(2025, 1, 22, 14, 30, 0).unwrap();
        assert_eq!(
            fragment_name("talk.v2.wav", at),
            "talk.v2_20250122_143000.wav"
        );
    }

    #[test]
    fn split_name_edge_cases() {
        assert_eq!(split_name("a.mp3"), ("a", ".mp3"));
        assert_eq!(split_name("noext"), ("noext", ""));
        assert_eq!(split_name("a.b.c"), ("a.b", ".c"));
    }

    #[test]
    fn metadata_without_username_defaults_to_anonymous() {
        let raw = r#"{
            "original_file": "lecture.mp3",
            "start_time": 1.0,
            "end_time": 2.0,
            "duration": 1.0,
            "comment": "",
            "timestamp": "20250122_143000",
            "output_file": "lecture_20250122_143000.mp3"
        }"#;
        let metadata: FragmentMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(metadata.username, "Anonymous");
    }
}

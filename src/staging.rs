use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn label(self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

/// The per-day record written next to the images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub landscape: String,
    pub portrait: String,
    pub holidays: Vec<String>,
    pub style: String,
}

/// Stamp that sorts by time within a date and starts with that date.
pub fn run_stamp(date: NaiveDate, now: DateTime<Utc>) -> String {
    format!("{}T{}", date.format("%Y-%m-%d"), now.format("%H-%M-%S"))
}

/// Local directory where a run's outputs land before promotion.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create staging dir {}", self.dir.display()))
    }

    pub fn prompt_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("prompt-{}.json", date.format("%Y-%m-%d")))
    }

    pub fn image_path(&self, orientation: Orientation, stamp: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.webp", orientation.label(), stamp))
    }

    pub fn write_prompt_metadata(
        &self,
        date: NaiveDate,
        landscape: &str,
        portrait: &str,
        holidays: &[String],
        style: &str,
    ) -> Result<PathBuf> {
        self.ensure()?;
        let metadata = PromptMetadata {
            landscape: landscape.to_string(),
            portrait: portrait.to_string(),
            holidays: holidays.to_vec(),
            style: style.to_string(),
        };

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        metadata
            .serialize(&mut serializer)
            .context("Failed to encode prompt metadata")?;

        let path = self.prompt_path(date);
        fs::write(&path, &buffer)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Prompts saved to {}", path.display());
        Ok(path)
    }

    /// Re-encodes whatever the model returned as WebP.
    pub fn save_image(&self, orientation: Orientation, stamp: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.ensure()?;
        let decoded = image::load_from_memory(bytes)
            .with_context(|| format!("Failed to decode {} image", orientation.label()))?;
        let rgba = DynamicImage::ImageRgba8(decoded.to_rgba8());

        let mut encoded = Cursor::new(Vec::new());
        rgba.write_to(&mut encoded, ImageFormat::WebP)
            .with_context(|| format!("Failed to encode {} image as WebP", orientation.label()))?;

        let path = self.image_path(orientation, stamp);
        fs::write(&path, encoded.into_inner())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(
            "Saved {} image {}x{} to {}",
            orientation.label(),
            rgba.width(),
            rgba.height(),
            path.display()
        );
        Ok(path)
    }

    /// Newest staged image for the date; stamps sort chronologically.
    pub fn latest_image(&self, orientation: Orientation, date: NaiveDate) -> Result<PathBuf> {
        let prefix = format!("{}-{}", orientation.label(), date.format("%Y-%m-%d"));
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read staging dir {}", self.dir.display()))?;

        let mut newest: Option<PathBuf> = None;
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(".webp") {
                continue;
            }
            let is_newer = newest
                .as_ref()
                .and_then(|current| current.file_name())
                .map(|current| current.to_string_lossy().into_owned().as_str() < name)
                .unwrap_or(true);
            if is_newer {
                newest = Some(path);
            }
        }

        newest.ok_or_else(|| {
            anyhow!(
                "No staged {} image for {} in {}",
                orientation.label(),
                date.format("%Y-%m-%d"),
                self.dir.display()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 11, 25).unwrap()
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 90, 255]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn stamps_start_with_the_run_date() {
        let now = Utc.with_ymd_and_hms(2023, 11, 26, 4, 5, 6).unwrap();
        assert_eq!(run_stamp(date(), now), "2023-11-25T04-05-06");
    }

    #[test]
    fn writes_pretty_metadata_keeping_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path().join("staging"));
        let path = staging
            .write_prompt_metadata(
                date(),
                "A café at dusk",
                "A tall café",
                &["National Cake Day".to_string()],
                "Van Gogh, bold colors",
            )
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "prompt-2023-11-25.json");
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("café"));
        assert!(raw.contains("\n    \"portrait\""));
        let parsed: PromptMetadata = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.holidays, vec!["National Cake Day"]);
        assert_eq!(parsed.style, "Van Gogh, bold colors");
    }

    #[test]
    fn saves_images_as_webp() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path());
        let path = staging
            .save_image(Orientation::Portrait, "2023-11-25T04-05-06", &png_bytes(9, 16))
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "portrait-2023-11-25T04-05-06.webp");
        let bytes = fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::WebP);
        assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (9, 16));
    }

    #[test]
    fn rejects_undecodable_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path());
        assert!(staging
            .save_image(Orientation::Landscape, "stamp", b"not an image")
            .is_err());
        assert!(!staging.image_path(Orientation::Landscape, "stamp").exists());
    }

    #[test]
    fn finds_latest_image_for_date() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path());
        for name in [
            "landscape-2023-11-25T01-00-00.webp",
            "landscape-2023-11-25T09-30-00.webp",
            "landscape-2023-11-26T00-00-00.webp",
            "portrait-2023-11-25T12-00-00.webp",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let latest = staging.latest_image(Orientation::Landscape, date()).unwrap();
        assert_eq!(latest.file_name().unwrap(), "landscape-2023-11-25T09-30-00.webp");

        let missing = NaiveDate::from_ymd_opt(2023, 11, 24).unwrap();
        assert!(staging.latest_image(Orientation::Portrait, missing).is_err());
    }
}

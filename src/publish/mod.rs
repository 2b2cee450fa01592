pub mod s3;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::CONFIG;
use crate::staging::{Orientation, StagingArea};

pub use s3::S3Client;

/// The staged files that make up one day's art.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifacts {
    pub date: NaiveDate,
    pub landscape: PathBuf,
    pub portrait: PathBuf,
    pub metadata: PathBuf,
}

pub fn locate_artifacts(staging: &StagingArea, date: NaiveDate) -> Result<StagedArtifacts> {
    let metadata = staging.prompt_path(date);
    if !metadata.is_file() {
        return Err(anyhow!("No staged prompts at {}", metadata.display()));
    }
    Ok(StagedArtifacts {
        date,
        landscape: staging.latest_image(Orientation::Landscape, date)?,
        portrait: staging.latest_image(Orientation::Portrait, date)?,
        metadata,
    })
}

/// Joins a site prefix and a relative path into an object key.
pub fn remote_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "webp" => "image/webp",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Every regular file under `root`, sorted for stable upload order.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries =
            fs::read_dir(&dir).with_context(|| format!("Failed to read {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Copies the day's files to the fixed names the site serves.
pub fn copy_to_static(artifacts: &StagedArtifacts, static_dir: &Path) -> Result<()> {
    let images = static_dir.join("images");
    let prompts = static_dir.join("prompts");
    fs::create_dir_all(&images)
        .with_context(|| format!("Failed to create {}", images.display()))?;
    fs::create_dir_all(&prompts)
        .with_context(|| format!("Failed to create {}", prompts.display()))?;

    for (source, destination) in [
        (&artifacts.landscape, images.join("landscape.webp")),
        (&artifacts.portrait, images.join("portrait.webp")),
        (&artifacts.metadata, prompts.join("prompt.json")),
    ] {
        fs::copy(source, &destination).with_context(|| {
            format!("Failed to copy {} to {}", source.display(), destination.display())
        })?;
        info!("Copied {} to {}", source.display(), destination.display());
    }
    Ok(())
}

async fn upload_file(client: &S3Client, path: &Path, key: &str) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    client.put_object(key, bytes, content_type_for(path)).await
}

/// Publishes a staged day: the static copy when `STATIC_DIR` is set, the dated archive when S3 is.
pub async fn promote(staging: &StagingArea, date: NaiveDate) -> Result<StagedArtifacts> {
    let artifacts = locate_artifacts(staging, date)?;
    let stamp = date.format("%Y-%m-%d").to_string();

    if let Some(static_dir) = CONFIG.static_dir.as_deref() {
        copy_to_static(&artifacts, static_dir)?;
    }

    if CONFIG.static_dir.is_some() && !CONFIG.s3_configured() {
        warn!("S3 is not configured; {} was only copied to the static dir", stamp);
        return Ok(artifacts);
    }

    let client = S3Client::from_config(&CONFIG)?;
    let prefix = &CONFIG.site_prefix;
    for (path, relative) in [
        (&artifacts.landscape, format!("images/{stamp}-landscape.webp")),
        (&artifacts.portrait, format!("images/{stamp}-portrait.webp")),
        (&artifacts.metadata, format!("prompts/prompt-{stamp}.json")),
    ] {
        upload_file(&client, path, &remote_key(prefix, &relative)).await?;
    }
    info!("Promoted {} to bucket {}", stamp, client.bucket());
    Ok(artifacts)
}

/// Uploads the site shell; returns the number of files sent.
pub async fn deploy_static(index: &Path, static_dir: &Path) -> Result<usize> {
    if !index.is_file() {
        return Err(anyhow!("Index page {} does not exist", index.display()));
    }
    let files = collect_files(static_dir)?;
    let client = S3Client::from_config(&CONFIG)?;
    let prefix = &CONFIG.site_prefix;

    info!("Deploying static files...");
    upload_file(&client, index, &remote_key(prefix, "index.html")).await?;
    for path in &files {
        let relative = format!("static/{}", relative_key(static_dir, path)?);
        upload_file(&client, path, &remote_key(prefix, &relative)).await?;
    }
    info!("Deployment complete: {} files", files.len() + 1);
    Ok(files.len() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 11, 25).unwrap()
    }

    fn staged(dir: &Path) -> StagingArea {
        fs::create_dir_all(dir).unwrap();
        let staging = StagingArea::new(dir);
        fs::write(dir.join("landscape-2023-11-25T01-00-00.webp"), b"old").unwrap();
        fs::write(dir.join("landscape-2023-11-25T02-00-00.webp"), b"land").unwrap();
        fs::write(dir.join("portrait-2023-11-25T02-00-01.webp"), b"port").unwrap();
        staging
            .write_prompt_metadata(date(), "wide", "tall", &[], "Bauhaus")
            .unwrap();
        staging
    }

    #[test]
    fn joins_prefix_and_relative_paths() {
        assert_eq!(remote_key("", "index.html"), "index.html");
        assert_eq!(remote_key("/public_html/", "/static/js/site.js"), "public_html/static/js/site.js");
    }

    #[test]
    fn maps_extensions_to_content_types() {
        assert_eq!(content_type_for(Path::new("a/INDEX.HTML")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("landscape.webp")), "image/webp");
        assert_eq!(content_type_for(Path::new("Makefile")), "application/octet-stream");
    }

    #[test]
    fn locates_newest_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staged(dir.path());
        let artifacts = locate_artifacts(&staging, date()).unwrap();
        assert_eq!(
            artifacts.landscape.file_name().unwrap(),
            "landscape-2023-11-25T02-00-00.webp"
        );
        assert_eq!(artifacts.metadata.file_name().unwrap(), "prompt-2023-11-25.json");

        let other = NaiveDate::from_ymd_opt(2023, 11, 26).unwrap();
        assert!(locate_artifacts(&staging, other).is_err());
    }

    #[test]
    fn copies_artifacts_to_fixed_names() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staged(&dir.path().join("staging"));
        let artifacts = locate_artifacts(&staging, date()).unwrap();
        let static_dir = dir.path().join("static");

        copy_to_static(&artifacts, &static_dir).unwrap();
        assert_eq!(fs::read(static_dir.join("images/landscape.webp")).unwrap(), b"land");
        assert_eq!(fs::read(static_dir.join("images/portrait.webp")).unwrap(), b"port");
        assert!(fs::read_to_string(static_dir.join("prompts/prompt.json"))
            .unwrap()
            .contains("Bauhaus"));
    }

    #[test]
    fn collects_nested_files_with_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("js")).unwrap();
        fs::create_dir_all(root.join("images/empty")).unwrap();
        fs::write(root.join("js/site.js"), b"").unwrap();
        fs::write(root.join("favicon.ico"), b"").unwrap();

        let files = collect_files(root).unwrap();
        let keys: Vec<String> = files
            .iter()
            .map(|path| relative_key(root, path).unwrap())
            .collect();
        assert_eq!(keys, vec!["favicon.ico", "js/site.js"]);
    }
}

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

const DEFAULT_CATALOG: &str = include_str!("../../catalog.yaml");
const DEFAULT_FALLBACK_STYLE: &str = "Bob Ross, with peaceful happy little trees";

#[derive(Debug, Deserialize)]
struct CatalogFile {
    style_bases: Vec<String>,
    style_phrases: Vec<String>,
    #[serde(default)]
    fallback_style: Option<String>,
    #[serde(default)]
    holidays: HashMap<String, String>,
    #[serde(default)]
    silly_days: HashMap<String, Vec<String>>,
}

/// Everything the daily run draws its style and day context from.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    pub style_bases: Vec<String>,
    pub style_phrases: Vec<String>,
    pub fallback_style: String,
    /// Keyed by `YYYY-MM-DD` for one-off dates or `MM-DD` for recurring ones.
    pub holidays: HashMap<String, String>,
    pub silly_days: HashMap<String, Vec<String>>,
}

fn normalize_entries(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

pub fn parse_catalog(raw: &str) -> Result<StyleCatalog> {
    let file: CatalogFile =
        serde_yaml::from_str(raw).map_err(|err| anyhow!("Failed to parse style catalog: {}", err))?;

    let style_bases = normalize_entries(file.style_bases);
    if style_bases.is_empty() {
        return Err(anyhow!("Style catalog has no style_bases"));
    }
    let style_phrases = normalize_entries(file.style_phrases);
    if style_phrases.is_empty() {
        return Err(anyhow!("Style catalog has no style_phrases"));
    }

    let fallback_style = file
        .fallback_style
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_FALLBACK_STYLE.to_string());

    let holidays = file
        .holidays
        .into_iter()
        .map(|(date, name)| (date.trim().to_string(), name.trim().to_string()))
        .filter(|(_, name)| !name.is_empty())
        .collect();
    let silly_days = file
        .silly_days
        .into_iter()
        .map(|(date, names)| (date.trim().to_string(), normalize_entries(names)))
        .filter(|(_, names)| !names.is_empty())
        .collect();

    Ok(StyleCatalog {
        style_bases,
        style_phrases,
        fallback_style,
        holidays,
        silly_days,
    })
}

/// Reads the catalog at `path`, or the built-in one when no path is configured.
pub fn load_catalog(path: Option<&Path>) -> Result<StyleCatalog> {
    let catalog = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read style catalog {}", path.display()))?;
            let catalog = parse_catalog(&raw)
                .with_context(|| format!("Invalid style catalog {}", path.display()))?;
            info!("Loaded style catalog from {}", path.display());
            catalog
        }
        None => {
            debug!("Using built-in style catalog");
            parse_catalog(DEFAULT_CATALOG)?
        }
    };

    info!(
        "Style catalog: {} bases, {} phrases, {} holidays, {} silly-day dates",
        catalog.style_bases.len(),
        catalog.style_phrases.len(),
        catalog.holidays.len(),
        catalog.silly_days.len()
    );
    Ok(catalog)
}

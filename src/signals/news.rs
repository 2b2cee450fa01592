use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::config::CONFIG;
use crate::utils::http::get_http_client;

static ITEM_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<item>.*?<title>(.*?)</title>").expect("valid item title pattern")
});

fn feed_url(language: &str, country: &str) -> String {
    let language = language.trim().to_lowercase();
    let country = country.trim().to_uppercase();
    format!(
        "https://news.google.com/rss?hl={language}-{country}&gl={country}&ceid={country}:{language}"
    )
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Title of the first `<item>` in an RSS document.
pub fn parse_top_headline(xml: &str) -> Option<String> {
    let raw = ITEM_TITLE.captures(xml)?.get(1)?.as_str().trim();
    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|inner| inner.strip_suffix("]]>"))
        .unwrap_or(raw);
    let title = unescape_xml(raw).trim().to_string();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

async fn fetch_top_headline() -> Result<String> {
    let url = feed_url(&CONFIG.news_language, &CONFIG.news_country);
    let response = get_http_client().get(&url).send().await?;
    if !response.status().is_success() {
        return Err(anyhow!("News feed returned status {}", response.status()));
    }
    let body = response.text().await?;
    parse_top_headline(&body).ok_or_else(|| anyhow!("News feed had no headlines"))
}

/// Breaking headline for the prompt; any failure just means the art goes without news.
pub async fn top_headline() -> Option<String> {
    match fetch_top_headline().await {
        Ok(title) => {
            info!("Top headline: {}", title);
            Some(title)
        }
        Err(err) => {
            warn!("Skipping news: {}", err);
            None
        }
    }
}

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::config::CONFIG;
use crate::llm::{chat_completion, generate_image, ImageGenerationError, ImageRequest};
use crate::prompt::{
    append_calendar_events, build_generation_prompt, clean_prompt, describe_day, image_prompt,
    trim_prompt, TITLE_CHAR_LIMIT,
};
use crate::publish;
use crate::signals::{calendar, holidays, news};
use crate::staging::{run_stamp, Orientation, StagingArea};
use crate::style::{load_catalog, JsonFileQueueStore, StyleCatalog, StyleRotation};
use crate::utils::timing::RunTimer;

/// Image failures restart the run this many times before giving up.
pub const MAX_IMAGE_RETRIES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub date: Option<NaiveDate>,
    pub style: Option<String>,
    pub model: Option<String>,
    pub skip_calendar: bool,
    pub skip_holidays: bool,
    pub skip_silly_days: bool,
    pub skip_news: bool,
    pub skip_upload: bool,
}

impl RunOptions {
    fn skipped(&self) -> Vec<&'static str> {
        [
            ("calendar", self.skip_calendar),
            ("holidays", self.skip_holidays),
            ("silly_days", self.skip_silly_days),
            ("news", self.skip_news),
            ("upload", self.skip_upload),
        ]
        .into_iter()
        .filter_map(|(name, skipped)| skipped.then_some(name))
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub date: NaiveDate,
    pub style: String,
    pub prompt: String,
    pub metadata: PathBuf,
    pub portrait: PathBuf,
    pub landscape: PathBuf,
    pub attempts: usize,
}

/// Options for the retry after `failed_attempts` image failures.
///
/// Each step drops more context; the last one also swaps in the fallback style.
pub fn degrade_options(original: &RunOptions, failed_attempts: usize, fallback_style: &str) -> RunOptions {
    let mut options = original.clone();
    if failed_attempts >= 2 {
        options.skip_news = true;
    }
    if failed_attempts >= 3 {
        options.skip_calendar = true;
    }
    if failed_attempts >= 4 {
        options.skip_holidays = true;
        options.skip_silly_days = true;
    }
    if failed_attempts >= 5 {
        options.style = Some(fallback_style.to_string());
    }
    options
}

fn is_image_failure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ImageGenerationError>().is_some()
}

/// Generates, stages and (unless told otherwise) promotes one day's art.
pub async fn run(options: RunOptions) -> Result<RunOutcome> {
    let catalog = load_catalog(CONFIG.catalog_path.as_deref())?;
    let date = options.date.unwrap_or_else(|| Local::now().date_naive());
    let style = match options.style.as_deref().map(str::trim) {
        Some(style) if !style.is_empty() => style.to_string(),
        _ => StyleRotation::new(JsonFileQueueStore::new(&CONFIG.style_queue_path))
            .select_style(&catalog.style_bases, &catalog.style_phrases)
            .context("Failed to select a style")?,
    };

    let base = RunOptions {
        date: Some(date),
        style: Some(style),
        ..options
    };
    let staging = StagingArea::new(&CONFIG.staging_dir);

    let mut failed_attempts = 0;
    let outcome = loop {
        let current = degrade_options(&base, failed_attempts, &catalog.fallback_style);
        match run_once(&current, date, &catalog, &staging, failed_attempts + 1).await {
            Ok(outcome) => break outcome,
            Err(err) if is_image_failure(&err) => {
                failed_attempts += 1;
                error!("Image generation error: {:#}", err);
                if failed_attempts > MAX_IMAGE_RETRIES {
                    return Err(err.context("Could not process images"));
                }
                warn!(
                    "Retrying with reduced context (retry {}/{})",
                    failed_attempts, MAX_IMAGE_RETRIES
                );
            }
            Err(err) => return Err(err),
        }
    };

    if base.skip_upload {
        info!("Skipping upload; staged files stay in {}", staging.dir().display());
    } else {
        publish::promote(&staging, date).await?;
    }
    Ok(outcome)
}

async fn run_once(
    options: &RunOptions,
    date: NaiveDate,
    catalog: &StyleCatalog,
    staging: &StagingArea,
    attempt: usize,
) -> Result<RunOutcome> {
    let date_label = date.format("%Y-%m-%d").to_string();
    let mut timer = RunTimer::start("generate", &date_label, attempt);

    let skipped = options.skipped();
    if !skipped.is_empty() {
        info!("Skipping: {}", skipped.join(", "));
    }

    let result = generate_day(options, date, &date_label, catalog, staging, attempt).await;
    match &result {
        Ok(_) => {
            timer.complete("success", None);
            info!("Generation complete. [Total time: {:.2} seconds]", timer.elapsed_secs());
        }
        Err(err) => {
            timer.complete("error", Some(err.to_string()));
            error!("Generation failed. [Total time: {:.2} seconds]", timer.elapsed_secs());
        }
    }
    result
}

async fn generate_day(
    options: &RunOptions,
    date: NaiveDate,
    date_label: &str,
    catalog: &StyleCatalog,
    staging: &StagingArea,
    attempt: usize,
) -> Result<RunOutcome> {
    let style = options
        .style
        .clone()
        .ok_or_else(|| anyhow!("No style resolved for {}", date_label))?;
    let image_model = options.model.as_deref().unwrap_or(&CONFIG.image_model);

    let holiday = if options.skip_holidays {
        None
    } else {
        holidays::holiday_for(catalog, date)
    };
    let silly_day = if options.skip_silly_days {
        None
    } else {
        holidays::silly_days_for(catalog, date)
    };
    let headline = if options.skip_news {
        None
    } else {
        news::top_headline().await
    };

    let day = describe_day(
        date_label,
        holiday.as_deref(),
        silly_day.as_deref(),
        headline.as_deref(),
    );
    let mut prompt = build_generation_prompt(&style, &day, &CONFIG.always_include_in_prompt);
    if !options.skip_calendar {
        let events = calendar::event_summaries(date).await;
        prompt = append_calendar_events(&prompt, &events);
    }

    info!("Generating prompt...");
    let image_description = chat_completion(&prompt, &prompt, &CONFIG.gpt_model).await?;
    info!(
        "Style: {} | News: {} | Today: {} | Image prompt: {}",
        style,
        headline.as_deref().unwrap_or("none"),
        day.headline(),
        image_description
    );

    let full_prompt = image_prompt(&style, &image_description);
    let mut rendered = Vec::with_capacity(2);
    for (orientation, aspect_ratio) in [
        (Orientation::Portrait, CONFIG.portrait_aspect_ratio.as_str()),
        (Orientation::Landscape, CONFIG.landscape_aspect_ratio.as_str()),
    ] {
        info!(
            "Generating {} image: model={}, aspect_ratio={}, image_size={} (attempt {})",
            orientation.label(),
            image_model,
            aspect_ratio,
            CONFIG.image_size,
            attempt
        );
        let request = ImageRequest {
            model: image_model,
            aspect_ratio,
            image_size: &CONFIG.image_size,
        };
        rendered.push((orientation, generate_image(&full_prompt, request).await?));
    }

    let caption = trim_prompt(&clean_prompt(&image_description), TITLE_CHAR_LIMIT);
    let occasions = holidays::todays_holidays_display(catalog, date);
    if !occasions.is_empty() {
        info!("Today's holidays: {}", occasions.join(", "));
    }
    let metadata = staging.write_prompt_metadata(date, &caption, &caption, &occasions, &style)?;

    let stamp = run_stamp(date, Utc::now());
    let mut portrait = PathBuf::new();
    let mut landscape = PathBuf::new();
    for (orientation, bytes) in rendered {
        let path = staging.save_image(orientation, &stamp, &bytes)?;
        match orientation {
            Orientation::Portrait => portrait = path,
            Orientation::Landscape => landscape = path,
        }
    }

    Ok(RunOutcome {
        date,
        style,
        prompt: caption,
        metadata,
        portrait,
        landscape,
        attempts: attempt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "Bob Ross, with peaceful happy little trees";

    fn original() -> RunOptions {
        RunOptions {
            date: NaiveDate::from_ymd_opt(2023, 11, 25),
            style: Some("Van Gogh, bold colors".to_string()),
            skip_upload: true,
            ..RunOptions::default()
        }
    }

    #[test]
    fn first_retry_keeps_options() {
        assert_eq!(degrade_options(&original(), 0, FALLBACK), original());
        assert_eq!(degrade_options(&original(), 1, FALLBACK), original());
    }

    #[test]
    fn retries_shed_context_in_order() {
        let second = degrade_options(&original(), 2, FALLBACK);
        assert!(second.skip_news);
        assert!(!second.skip_calendar);

        let third = degrade_options(&original(), 3, FALLBACK);
        assert!(third.skip_news && third.skip_calendar);
        assert!(!third.skip_holidays);

        let fourth = degrade_options(&original(), 4, FALLBACK);
        assert!(fourth.skip_holidays && fourth.skip_silly_days);
        assert_eq!(fourth.style, original().style);

        let fifth = degrade_options(&original(), 5, FALLBACK);
        assert_eq!(fifth.style.as_deref(), Some(FALLBACK));
        assert!(fifth.skip_upload);
        assert_eq!(fifth.date, original().date);
    }

    #[test]
    fn only_image_errors_are_retried() {
        let image: anyhow::Error = ImageGenerationError("no images".to_string()).into();
        assert!(is_image_failure(&image));
        assert!(is_image_failure(&image.context("portrait")));
        assert!(!is_image_failure(&anyhow!("prompt model unavailable")));
    }

    #[test]
    fn lists_skipped_inputs() {
        let options = RunOptions {
            skip_news: true,
            skip_calendar: true,
            ..RunOptions::default()
        };
        assert_eq!(options.skipped(), vec!["calendar", "news"]);
        assert!(RunOptions::default().skipped().is_empty());
    }
}

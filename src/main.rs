use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use tracing::info;

mod config;
mod generate;
mod llm;
mod prompt;
mod publish;
mod signals;
mod staging;
mod style;
mod utils;

use config::CONFIG;
use generate::RunOptions;
use staging::StagingArea;
use style::rotation::QueueStore;
use style::{load_catalog, JsonFileQueueStore, MemoryQueueStore, StyleRotation};
use utils::logging::init_logging;

/// Daily AI calendar art: pick a style, read the day, paint it, publish it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    generate: GenerateArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate today's (or --date's) art. The default command.
    Generate(GenerateArgs),
    /// Draw the next style from the rotation, or inspect it.
    Style {
        /// Print how many bases remain before the next reshuffle.
        #[arg(long, conflicts_with = "reset")]
        peek: bool,
        /// Discard the persisted queue so the next draw reshuffles.
        #[arg(long)]
        reset: bool,
        /// Show the next style without consuming it.
        #[arg(long, conflicts_with_all = ["peek", "reset"])]
        dry_run: bool,
    },
    /// Publish an already staged day.
    Promote {
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },
    /// Upload the site shell (index page and static tree).
    DeployStatic {
        #[arg(long, default_value = "index.html")]
        index: PathBuf,
        #[arg(long, default_value = "static")]
        static_dir: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct GenerateArgs {
    /// Date for the calendar prompt, e.g. 2023-11-25.
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,
    /// Style override, e.g. "1970s Miami funkadelic neon color vibe".
    #[arg(long)]
    style: Option<String>,
    /// Image model override.
    #[arg(long)]
    model: Option<String>,
    /// Skip Google Calendar events.
    #[arg(long)]
    skip_calendar: bool,
    #[arg(long)]
    skip_holidays: bool,
    #[arg(long)]
    skip_silly_days: bool,
    #[arg(long)]
    skip_news: bool,
    /// Leave the results in staging.
    #[arg(long)]
    skip_upload: bool,
}

impl From<GenerateArgs> for RunOptions {
    fn from(args: GenerateArgs) -> Self {
        RunOptions {
            date: args.date,
            style: args.style,
            model: args.model,
            skip_calendar: args.skip_calendar,
            skip_holidays: args.skip_holidays,
            skip_silly_days: args.skip_silly_days,
            skip_news: args.skip_news,
            skip_upload: args.skip_upload,
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| format!("expected YYYY-MM-DD, got '{value}': {err}"))
}

fn run_style_command(peek: bool, reset: bool, dry_run: bool) -> anyhow::Result<()> {
    let rotation = StyleRotation::new(JsonFileQueueStore::new(&CONFIG.style_queue_path));
    if reset {
        rotation.reset_queue()?;
        info!("Style queue reset at {}", rotation.store().path().display());
        return Ok(());
    }
    if peek {
        println!("{}", rotation.peek_remaining());
        return Ok(());
    }
    let catalog = load_catalog(CONFIG.catalog_path.as_deref())?;
    let style = if dry_run {
        let stored = rotation.store().load().unwrap_or_default();
        StyleRotation::new(MemoryQueueStore::with_queue(stored))
            .select_style(&catalog.style_bases, &catalog.style_phrases)?
    } else {
        rotation.select_style(&catalog.style_bases, &catalog.style_phrases)?
    };
    println!("{style}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging();
    let cli = Cli::parse();

    match cli.command {
        None => run_generate(cli.generate).await?,
        Some(Command::Generate(args)) => run_generate(args).await?,
        Some(Command::Style {
            peek,
            reset,
            dry_run,
        }) => run_style_command(peek, reset, dry_run)?,
        Some(Command::Promote { date }) => {
            let staging = StagingArea::new(&CONFIG.staging_dir);
            let artifacts = publish::promote(&staging, date).await?;
            info!(
                "Promoted {} ({}, {})",
                artifacts.date,
                artifacts.landscape.display(),
                artifacts.portrait.display()
            );
        }
        Some(Command::DeployStatic { index, static_dir }) => {
            let uploaded = publish::deploy_static(&index, &static_dir).await?;
            info!("Uploaded {} files", uploaded);
        }
    }
    Ok(())
}

async fn run_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let outcome = generate::run(args.into()).await?;
    info!(
        "Art for {} in style \"{}\" after {} attempt(s): {}, {}",
        outcome.date,
        outcome.style,
        outcome.attempts,
        outcome.portrait.display(),
        outcome.landscape.display()
    );
    info!("Prompt metadata at {}", outcome.metadata.display());
    info!("Caption: {}", outcome.prompt);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_flags_mean_generate() {
        let cli = Cli::try_parse_from(["aicalart", "--date", "2023-11-25", "--skip-news"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.generate.date, NaiveDate::from_ymd_opt(2023, 11, 25));
        assert!(cli.generate.skip_news);

        let options: RunOptions = cli.generate.into();
        assert!(options.skip_news);
        assert!(!options.skip_upload);
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["aicalart", "style", "--peek"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Style {
                peek: true,
                reset: false,
                dry_run: false
            })
        ));
        assert!(Cli::try_parse_from(["aicalart", "style", "--dry-run", "--reset"]).is_err());

        assert!(Cli::try_parse_from(["aicalart", "style", "--peek", "--reset"]).is_err());
        assert!(Cli::try_parse_from(["aicalart", "promote"]).is_err());
        assert!(Cli::try_parse_from(["aicalart", "promote", "--date", "11/25/2023"]).is_err());

        let cli = Cli::try_parse_from(["aicalart", "deploy-static"]).unwrap();
        match cli.command {
            Some(Command::DeployStatic { index, static_dir }) => {
                assert_eq!(index, PathBuf::from("index.html"));
                assert_eq!(static_dir, PathBuf::from("static"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

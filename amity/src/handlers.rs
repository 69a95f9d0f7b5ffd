use amity_core::config::{DataDir, profile_url};
use amity_core::data::{Database, FriendStore};
use amity_core::output::{format_timestamp, print_divider};
use amity_core::pipeline::{IngestionPipeline, PipelineOptions, PipelineRunState, RunOutcome};
use amity_core::snapshot::SnapshotWriter;
use amity_scanner::{HttpPageDriver, ListingSelectors, ScrollOptions};
use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Installs the stderr log subscriber; `RUST_LOG` overrides the level
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // try_init fails if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn print_prompt(msg: &str) -> Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

// Argument helpers

pub fn data_dir_from_args(args: &ArgMatches) -> DataDir {
    args.get_one::<String>("data-dir")
        .map(|path| DataDir::new(path))
        .unwrap_or_default()
}

/// An explicit cookie file always wins; otherwise the data directory's
/// cookie file is used when it exists.
pub fn resolve_cookie_file(explicit: Option<&PathBuf>, data_dir: &DataDir) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.clone());
    }
    let default_path = data_dir.cookie_path();
    default_path.exists().then_some(default_path)
}

pub fn scroll_options_from_args(args: &ArgMatches) -> ScrollOptions {
    let defaults = ScrollOptions::default();
    ScrollOptions {
        max_iterations: args
            .get_one::<usize>("max-scrolls")
            .copied()
            .unwrap_or(defaults.max_iterations),
        stable_rounds: args
            .get_one::<usize>("stable-rounds")
            .copied()
            .unwrap_or(defaults.stable_rounds),
        target_count: args.get_one::<usize>("target").copied().unwrap_or(0),
        idle_wait: args
            .get_one::<u64>("pause-ms")
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or(defaults.idle_wait),
        deadline: args
            .get_one::<u64>("deadline")
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(*secs)),
    }
}

/// The `--user` value with surrounding whitespace removed
pub fn user_from_args(args: &ArgMatches) -> Result<&str> {
    let Some(user) = args.get_one::<String>("user") else {
        bail!("--user is required");
    };
    let user = user.trim();
    if user.is_empty() {
        bail!("--user must not be empty");
    }
    Ok(user)
}

pub fn pipeline_options_from_args(
    args: &ArgMatches,
    data_dir: &DataDir,
    show_progress: bool,
) -> Result<PipelineOptions> {
    let user = user_from_args(args)?;

    let defaults = ListingSelectors::default();
    let selectors = ListingSelectors {
        container: args
            .get_one::<String>("container-selector")
            .cloned()
            .unwrap_or(defaults.container),
        item: args
            .get_one::<String>("item-selector")
            .cloned()
            .unwrap_or(defaults.item),
    };

    let mut options = PipelineOptions::new(user, args.get_flag("crawl"), 0);
    options.scroll = scroll_options_from_args(args);
    options.selectors = selectors;
    options.cookie_file = resolve_cookie_file(args.get_one::<PathBuf>("cookies"), data_dir);
    options.show_progress = show_progress;
    Ok(options)
}

fn open_existing_database(data_dir: &DataDir) -> Result<Database> {
    let db_path = data_dir.database_path();
    if !Database::exists(&db_path) {
        bail!(
            "no database at {} (run `amity init` first)",
            db_path.display()
        );
    }
    Database::new(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))
}

// Handlers

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  AMITY INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let force = args.get_flag("force");
    let data_dir = args
        .get_one::<String>("PATH")
        .map(|path| DataDir::new(path))
        .unwrap_or_default();
    let db_path = data_dir.database_path();

    println!("{} Parsed arguments", "✓".green().bold());
    println!(
        "{} Target: {}",
        "→".blue(),
        data_dir.root().display().to_string().bright_white()
    );
    println!();

    let mut keep_existing = false;
    if Database::exists(&db_path) {
        if force {
            println!(
                "{} Deleting existing database (force mode)",
                "→".yellow().bold()
            );
        } else {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!();
            println!(
                "{}",
                "Overwriting deletes every stored friend list and the crawl queue.".yellow()
            );

            let response = print_prompt("Do you want to overwrite it? [y/N]:")?;
            println!();
            keep_existing = response != "y" && response != "yes";
        }

        if keep_existing {
            println!("{} Keeping existing database", "→".blue());
        } else {
            Database::drop(&db_path)
                .with_context(|| format!("failed to remove {}", db_path.display()))?;
            println!("{} Existing database removed", "✓".green().bold());
        }
        println!();
    }

    create_data_dir(&data_dir)?;

    if !keep_existing {
        println!("{} Creating database...", "→".blue());
        Database::new(&db_path)
            .with_context(|| format!("failed to create database {}", db_path.display()))?;
        println!(
            "{} Database initialized: {}",
            "✓".green().bold(),
            db_path.display().to_string().bright_white()
        );
    }

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Data directory: {}",
        "✓".green().bold(),
        data_dir.root().display().to_string().bright_white()
    );
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!(
        "{} Export your session cookies to {}",
        "ℹ".blue(),
        data_dir.cookie_path().display().to_string().bright_white()
    );
    println!();
    Ok(())
}

fn create_data_dir(data_dir: &DataDir) -> Result<()> {
    println!("{} Creating directory structure...", "→".blue());
    for dir in [data_dir.root().to_path_buf(), data_dir.snapshot_dir()] {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
        println!("  {} {}", "✓".green(), dir.display().to_string().bright_white());
    }
    println!();
    Ok(())
}

pub async fn handle_friends(args: &ArgMatches, quiet: bool) -> Result<()> {
    let data_dir = data_dir_from_args(args);
    let options = pipeline_options_from_args(args, &data_dir, !quiet)?;

    let template = args
        .get_one::<String>("profile-url")
        .map(String::as_str)
        .unwrap_or(amity_core::config::DEFAULT_PROFILE_URL);
    let listing_url = profile_url(template, &options.subject);
    let timeout = args.get_one::<u64>("timeout").copied().unwrap_or(30);

    fs::create_dir_all(data_dir.root()).with_context(|| {
        format!(
            "failed to create data directory {}",
            data_dir.root().display()
        )
    })?;
    let db_path = data_dir.database_path();
    let db = Database::new(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let snapshots = SnapshotWriter::new(data_dir.snapshot_dir());

    // Built last; from here on the pipeline releases it on every exit path
    let mut driver = HttpPageDriver::with_timeout(&listing_url, timeout)
        .with_context(|| format!("cannot open friend listing {}", listing_url))?;
    if let Some(css) = args.get_one::<String>("next-selector") {
        driver = driver.with_next_selector(css)?;
    }

    if !quiet {
        println!(
            "{} Collecting friends of {} from {}",
            "→".blue(),
            options.subject.bright_white().bold(),
            listing_url.cyan()
        );
        if let Some(ref cookies) = options.cookie_file {
            println!(
                "{} Session cookies: {}",
                "→".blue(),
                cookies.display().to_string().bright_white()
            );
        }
        println!();
    }
    info!("Starting friend list run for {}", options.subject);

    let mut pipeline = IngestionPipeline::new(options);
    let state = pipeline.run(driver, &db, &snapshots).await;

    report_run(&state, quiet)
}

/// Prints the final status of a run; anything but success is an error
pub fn report_run(state: &PipelineRunState, quiet: bool) -> Result<()> {
    match &state.outcome {
        RunOutcome::Succeeded(summary) => {
            if !quiet {
                println!();
                print_divider();
                println!("{}", "  RUN COMPLETE".green().bold());
                print_divider();
                println!(
                    "{} Friends extracted: {}",
                    "✓".green().bold(),
                    summary.extracted.to_string().cyan()
                );
                println!(
                    "{} New relations: {}",
                    "✓".green().bold(),
                    summary.new_relations.to_string().cyan()
                );
                println!(
                    "{} Queued for crawl: {}",
                    "✓".green().bold(),
                    summary.queued.to_string().cyan()
                );
                println!(
                    "{} Stored friend count: {}",
                    "✓".green().bold(),
                    summary.friend_count.to_string().cyan()
                );
                println!(
                    "{} Snapshot: {}",
                    "✓".green().bold(),
                    summary.snapshot_path.display().to_string().bright_white()
                );
                println!();
            }
            Ok(())
        }
        RunOutcome::NoData => bail!("no friends extracted for {}", state.subject),
        RunOutcome::Failed { stage, error } => bail!(
            "run for {} failed during {}: {}",
            state.subject,
            stage.as_str(),
            error
        ),
    }
}

pub fn handle_show(args: &ArgMatches) -> Result<()> {
    let data_dir = data_dir_from_args(args);
    let user = user_from_args(args)?;
    let db = open_existing_database(&data_dir)?;

    let Some(subject) = db.get_subject(user)? else {
        bail!("no stored friend list for {}", user);
    };
    let relations = db.list_relations(subject.id)?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&relations)?);
        return Ok(());
    }

    print_divider();
    println!(
        "  {} {}",
        subject.identifier.bright_white().bold(),
        format!("({} friends)", subject.friend_count).dimmed()
    );
    print_divider();
    for relation in &relations {
        println!(
            "  {} {} {}",
            "•".blue(),
            relation.label,
            relation.locator.cyan()
        );
    }
    if relations.is_empty() {
        println!("  {}", "no relations stored".dimmed());
    }
    println!();
    Ok(())
}

pub fn handle_queue(args: &ArgMatches) -> Result<()> {
    let data_dir = data_dir_from_args(args);
    let db = open_existing_database(&data_dir)?;

    if args.get_flag("pop") {
        match db.pop_crawl_queue()? {
            Some(entry) => println!("{}", entry.locator),
            None => println!("{} Crawl queue is empty", "ℹ".blue()),
        }
        return Ok(());
    }

    let entries = db.list_crawl_queue()?;
    if entries.is_empty() {
        println!("{} Crawl queue is empty", "ℹ".blue());
        return Ok(());
    }

    println!(
        "{} {} profiles queued",
        "→".blue(),
        entries.len().to_string().cyan()
    );
    for entry in entries {
        println!(
            "  {}  {}",
            format_timestamp(entry.queued_at).dimmed(),
            entry.locator
        );
    }
    Ok(())
}


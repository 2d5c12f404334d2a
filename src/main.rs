//! Command-line interface for the wordbook dictionary library.
//!
//! This CLI provides commands for looking up course words, resolving
//! dictionary entries, fetching translations and speech, and managing the
//! local word database.

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{LevelFilter, debug, error, info};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wordbook_rs::{
    DictConfig, Dictionary, SqliteKvCache, SqliteWordStore, WordRecord,
    error::Result,
    hooks::log_write_failure,
    parse::parse_word_export,
    progress::{ProgressCallback, ProgressUpdate},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Wordbook dictionary CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the word database (optional)
    #[arg(long, global = true, env = "WORDBOOK_DB")]
    db: Option<PathBuf>,

    /// Path to the fast-cache database (optional)
    #[arg(long, global = true, env = "WORDBOOK_CACHE_DB")]
    cache_db: Option<PathBuf>,

    /// Root of the on-disk dictionary cache (optional)
    #[arg(long, global = true, env = "WORDBOOK_DICT_PATH")]
    dict_path: Option<PathBuf>,

    /// Youdao application key
    #[arg(long, global = true, env = "YOUDAO_APP_KEY", default_value = "")]
    app_key: String,

    /// Youdao application secret
    #[arg(
        long,
        global = true,
        env = "YOUDAO_APP_SECRET",
        default_value = "",
        hide_env_values = true
    )]
    app_secret: String,

    /// URL prefix prepended to resolved audio paths
    #[arg(long, global = true)]
    audio_prefix: Option<String>,

    /// Set verbosity level (use -v, -vv, or -vvv for increasing verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the words of a course or chapter code
    Code {
        /// The course code
        code: i64,
    },
    /// Print every stored and translated record for a word as JSON
    Word {
        /// The word to look up
        word: String,
    },
    /// Resolve the best phonetic, part of speech, gloss and audio for a word
    Dict {
        /// The word to resolve
        word: String,
        /// Look the word up exactly as typed instead of lowercased
        #[arg(long, default_value_t = false)]
        preserve_case: bool,
    },
    /// Print the translation payload for a word
    Translate {
        /// The word to translate
        word: String,
    },
    /// Save the pronunciation of a word as mp3
    Speak {
        /// The word to pronounce
        word: String,
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Import a word-collection export (JSON array or one record per line)
    Import {
        /// The export file
        file: PathBuf,
        /// Remove every stored word before importing
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
    /// Delete the word database
    ClearDb,
    /// Remove expired entries from the fast cache
    PurgeCache,
}

/// Sets up logging based on verbosity level.
fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter(None, log_level)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

/// Builds the configuration from platform defaults and command-line overrides.
fn build_config(cli: &Cli) -> Result<DictConfig> {
    let mut config = DictConfig::with_defaults()?
        .with_credentials(cli.app_key.clone(), cli.app_secret.clone());
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(cache_db) = &cli.cache_db {
        config.cache_db_path = cache_db.clone();
    }
    if let Some(dict_path) = &cli.dict_path {
        config.file_cache_root = dict_path.clone();
    }
    if let Some(prefix) = &cli.audio_prefix {
        config.audio_url_prefix = prefix.clone();
    }
    debug!(
        "Using word database {:?}, cache {:?}, dictionary files {:?}",
        config.db_path, config.cache_db_path, config.file_cache_root
    );
    Ok(config)
}

/// Creates a progress callback for displaying import progress.
fn create_progress_callback(
    multi_progress: MultiProgress,
    progress_bars: Arc<Mutex<HashMap<String, ProgressBar>>>,
) -> ProgressCallback {
    Box::new(move |update: ProgressUpdate| {
        let Ok(mut bars) = progress_bars.lock() else {
            return true;
        };

        if update.current_item == 0 && !bars.contains_key(&update.stage_description) {
            // Create new progress bar for this stage
            let pb = multi_progress.add(ProgressBar::new(update.total_items.unwrap_or(0)));
            let style = ProgressStyle::default_bar()
                .template(
                    "{prefix:>12.cyan.bold} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} ({percent}%) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-");
            pb.set_style(style);
            pb.set_prefix(update.stage_description.clone());
            pb.set_message(update.message.clone().unwrap_or_default());
            pb.enable_steady_tick(Duration::from_millis(100));
            bars.insert(update.stage_description.clone(), pb);
        } else if let Some(pb) = bars.get(&update.stage_description) {
            pb.set_position(update.current_item);
            if let Some(msg) = update.message.clone() {
                pb.set_message(msg);
            }
            if update.is_complete() {
                pb.finish_and_clear();
            }
        }
        true
    })
}

/// Prints a message in red and exits with a failure status.
fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", context, err);
    eprintln!("{}", format!("{}: {}", context, err).red());
    std::process::exit(1);
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = build_config(&cli).unwrap_or_else(|e| fail("Error resolving configuration", e));

    match cli.command {
        Commands::Import { file, replace } => {
            if let Err(e) = handle_import(&config, &file, replace).await {
                fail(&format!("Error importing {:?}", file), e);
            }
        }
        Commands::ClearDb => {
            info!("Clearing database...");
            match SqliteWordStore::clear_database(&config.db_path) {
                Ok(_) => println!("{}", "Database cleared successfully.".green()),
                Err(e) => fail("Error clearing database", e),
            }
        }
        Commands::PurgeCache => match SqliteKvCache::open(&config.cache_db_path)
            .and_then(|cache| cache.purge_expired())
        {
            Ok(n) => println!("{}", format!("Removed {} expired cache entries.", n).green()),
            Err(e) => fail("Error purging cache", e),
        },
        command => {
            let dict = Dictionary::open(config)
                .unwrap_or_else(|e| fail("Error opening dictionary", e))
                .with_write_failure_hook(log_write_failure());
            let result = run_lookup(&dict, command).await;
            // Background cache saves die with the runtime
            if let Err(e) = dict.flush().await {
                error!("Failed to flush background saves: {}", e);
            }
            if let Err(e) = result {
                fail("Error", e);
            }
        }
    }
}

/// Runs the subcommands that need an opened dictionary.
async fn run_lookup(dict: &Dictionary, command: Commands) -> Result<()> {
    let start = Instant::now();
    match command {
        Commands::Code { code } => {
            let records = dict.list_by_code(code).await?;
            if records.is_empty() {
                println!("No words found for code {}.", code.to_string().yellow());
            }
            for record in &records {
                print_record(record);
            }
        }
        Commands::Word { word } => {
            let records = dict.resolve_word(&word).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Dict {
            word,
            preserve_case,
        } => {
            let entry = dict.resolve_best_fields(&word, preserve_case).await?;
            println!("{}", word.bold().cyan());
            println!("  Phonetic: {}", entry.phonetic.green());
            println!("  Part of speech: {}", entry.part_of_speech.italic());
            println!("  Gloss: {}", entry.gloss);
            println!("  Audio: {}", entry.audio_url.dimmed());
        }
        Commands::Translate { word } => match dict.fetch_translation(&word).await? {
            Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
            None => println!("No translation found for '{}'.", word.yellow()),
        },
        Commands::Speak { word, out } => {
            let bytes = dict.fetch_speech(&word).await?;
            tokio::fs::write(&out, &bytes).await?;
            println!(
                "{}",
                format!("Wrote {} bytes to {:?}.", bytes.len(), out).green()
            );
        }
        Commands::Import { .. } | Commands::ClearDb | Commands::PurgeCache => {}
    }
    debug!("Command took: {:?}", start.elapsed());
    Ok(())
}

/// Prints one record the way `code` lists them.
fn print_record(record: &WordRecord) {
    print!("{}", record.word.bold().cyan());
    if let Some(phonetic) = record.phonetic() {
        print!(" {}", phonetic.green());
    }
    if let Some(pos) = record.part_of_speech() {
        print!(" {}", pos.italic());
    }
    if let Some(gloss) = record.gloss() {
        print!("  {}", gloss);
    }
    println!();
}

/// Handles the import command: parses the export and loads it with progress bars.
async fn handle_import(config: &DictConfig, file: &Path, replace: bool) -> Result<()> {
    info!("Importing words from {:?}", file);
    let content = tokio::fs::read_to_string(file).await?;
    let records = parse_word_export(content).await?;

    let multi_progress = MultiProgress::new();
    let progress_bars = Arc::new(Mutex::new(HashMap::<String, ProgressBar>::new()));
    let callback = create_progress_callback(multi_progress.clone(), progress_bars.clone());

    let db_path = config.db_path.clone();
    let (imported, total) = tokio::task::spawn_blocking(move || -> Result<(u64, u64)> {
        let store = SqliteWordStore::open(&db_path)?;
        if replace {
            store.clear()?;
        }
        let imported = store.import_records(&records, Some(callback))?;
        Ok((imported, store.count()?))
    })
    .await
    .map_err(|e| wordbook_rs::DictError::Internal(format!("Import task failed: {}", e)))??;

    // Clean up progress bars
    if let Ok(bars) = progress_bars.lock() {
        for (_, pb) in bars.iter() {
            pb.finish_and_clear();
        }
    }
    drop(multi_progress);
    std::io::stdout().flush().ok();

    println!(
        "{}",
        format!("Imported {} words ({} stored).", imported, total).green()
    );
    Ok(())
}

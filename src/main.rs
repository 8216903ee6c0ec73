use clap::Parser;
use color_eyre::Result;
use std::io::{Write, stdout};

use scattershot::cache::CacheChain;
use scattershot::config::{self, Config};
use scattershot::error::ScattershotError;
use scattershot::model::{SearchKey, SearchMode};
use scattershot::session::{SearchStart, SessionController};
use scattershot::stream::{IngestUpdate, SearchClient};

/// Streaming keyword search with a layered result cache
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Streaming keyword search with a layered result cache"
)]
struct Args {
    /// Project the search belongs to
    project: Option<String>,

    /// Search query; separate phrases with `+`
    query: Option<String>,

    /// How phrases are combined
    #[arg(long, default_value_t = SearchMode::Or)]
    mode: SearchMode,

    /// Load-more rounds to run after the first batch
    #[arg(long, value_name = "N", default_value_t = 0)]
    load_more: u32,

    /// Print cache tier statistics
    #[arg(long)]
    stats: bool,

    /// Remove every cached search
    #[arg(long)]
    clear_cache: bool,

    /// Remove the cached searches of one project
    #[arg(long, value_name = "ID")]
    clear_project: Option<String>,
}

fn main() -> Result<()> {
    // Writes to /tmp/scattershot-debug.log at DEBUG level
    #[cfg(debug_assertions)]
    {
        if let Ok(log_file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/scattershot-debug.log")
        {
            env_logger::Builder::new()
                .filter_level(log::LevelFilter::Debug)
                .target(env_logger::Target::Pipe(Box::new(log_file)))
                .format(|buf, record| {
                    use std::time::SystemTime;
                    let datetime: chrono::DateTime<chrono::Local> = SystemTime::now().into();
                    writeln!(
                        buf,
                        "[{}] [{}] {}",
                        datetime.format("%Y-%m-%dT%H:%M:%S%.3f"),
                        record.level(),
                        record.args()
                    )
                })
                .init();
        }

        log::debug!("=== SCATTERSHOT DEBUG SESSION STARTED ===");
    }

    #[cfg(not(debug_assertions))]
    env_logger::init();

    color_eyre::install()?;

    let args = Args::parse();

    let config_result = config::load_config();
    if let Some(warning) = &config_result.warning {
        eprintln!("warning: {}", warning);
    }
    let config = config_result.config;

    let mut cache = CacheChain::from_config(&config.cache);
    let mut did_something = false;

    if args.clear_cache {
        cache.clear();
        eprintln!("Cleared all cached searches");
        did_something = true;
    }

    if let Some(project) = &args.clear_project {
        let removed = cache.clear_partition(project);
        eprintln!("Removed {} cached searches for project {}", removed, project);
        did_something = true;
    }

    if args.stats {
        print_stats(&cache)?;
        did_something = true;
    }

    match (args.project, args.query) {
        (Some(project), Some(query)) => {
            let key = SearchKey::new(&project, &query, args.mode);
            run_search(&mut cache, &config, key, args.load_more)?;
        }
        _ if did_something => {}
        _ => return Err(ScattershotError::NothingToDo.into()),
    }

    #[cfg(debug_assertions)]
    log::debug!("=== SCATTERSHOT DEBUG SESSION ENDED ===");

    Ok(())
}

/// Run one search plus up to `rounds` load-more rounds, printing words as
/// they arrive
fn run_search(
    cache: &mut CacheChain,
    config: &Config,
    key: SearchKey,
    rounds: u32,
) -> Result<(), ScattershotError> {
    if key.is_empty() {
        return Err(ScattershotError::EmptyQuery(key.project_id().to_string()));
    }

    let mut controller =
        SessionController::spawn(SearchClient::from_config(&config.api), config.load_more.clone());

    match controller.start_search(cache, key)? {
        SearchStart::Cached { count } => {
            let mut out = stdout().lock();
            for suggestion in controller.suggestions() {
                writeln!(out, "{}", suggestion.word)?;
            }
            eprintln!("{} suggestions (cached)", count);
        }
        SearchStart::Streaming { .. } => drain(&mut controller, cache)?,
    }

    for _ in 0..rounds {
        if !controller.load_more()? {
            eprintln!("No more results available");
            break;
        }
        drain(&mut controller, cache)?;
    }

    eprintln!(
        "{} suggestions{}",
        controller.suggestions().len(),
        if controller.can_load_more() {
            ", more available"
        } else {
            ""
        }
    );
    Ok(())
}

/// Print suggestions of the stream in flight until it ends
fn drain(
    controller: &mut SessionController,
    cache: &mut CacheChain,
) -> Result<(), ScattershotError> {
    let mut out = stdout().lock();
    while controller.is_streaming() {
        match controller.wait_response(cache)? {
            Some(IngestUpdate::Suggestion(index)) => {
                if let Some(suggestion) = controller.suggestions().get(index) {
                    writeln!(out, "{}", suggestion.word)?;
                }
            }
            Some(IngestUpdate::Failed(message)) => {
                return Err(ScattershotError::StreamFailed(message));
            }
            _ => {}
        }
    }
    out.flush()?;
    Ok(())
}

fn print_stats(cache: &CacheChain) -> Result<(), ScattershotError> {
    let mut out = stdout().lock();
    for stats in cache.stats().tiers {
        match stats.usage {
            Some(usage) => writeln!(
                out,
                "{:<8} {:>5} entries  {} bytes ({:.1}% of {})",
                stats.tier.name(),
                stats.entries,
                usage.used,
                usage.ratio() * 100.0,
                usage.capacity
            )?,
            None => writeln!(out, "{:<8} {:>5} entries", stats.tier.name(), stats.entries)?,
        }
    }
    Ok(())
}

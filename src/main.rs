//! CLI entry point for `workshop`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;

use workshop::config::Config;
use workshop::context::BridgeContext;
use workshop::model::{CalendarEvent, SyncRange};
use workshop::task::{
    churn_conversation, CalProvider, CalSyncConv, CalSyncConvRequest, MemoryDb, SyncConvOutcome,
};
use workshop::toc::{Toc, TocManager};

#[derive(Parser)]
#[command(name = "workshop", version, about = "Calendar and mail sync core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (overrides $WORKSHOP_CONFIG and the standard location)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a provider event batch against stored events
    Reconcile {
        /// Calendar provider the payloads come from
        #[arg(long, value_enum)]
        provider: ProviderArg,
        /// Conversation id the events belong to
        #[arg(long)]
        conv_id: String,
        /// Folder id of the calendar
        #[arg(long)]
        folder_id: String,
        /// JSON array of previously stored events
        #[arg(long, value_name = "FILE")]
        old: Option<PathBuf>,
        /// JSON object of native id to provider payload
        #[arg(long, value_name = "FILE")]
        events: PathBuf,
        /// Window start in ms since the epoch (default: from config)
        #[arg(long)]
        oldest: Option<i64>,
        /// Window end in ms since the epoch (default: from config)
        #[arg(long)]
        newest: Option<i64>,
        /// Native id of the series root
        #[arg(long)]
        recurring_id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a slice of a static TOC from a configured namespace
    Toc {
        namespace: String,
        name: String,
        /// First index (inclusive)
        #[arg(long, default_value_t = 0)]
        begin: usize,
        /// Last index (exclusive, default: end of the list)
        #[arg(long)]
        end: Option<usize>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ProviderArg {
    Gapi,
    Mapi,
}

impl From<ProviderArg> for CalProvider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Gapi => CalProvider::Gapi,
            ProviderArg::Mapi => CalProvider::Mapi,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => workshop::config::load_config_from(path),
        None => workshop::config::load_config(),
    };

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Reconcile {
            provider,
            conv_id,
            folder_id,
            old,
            events,
            oldest,
            newest,
            recurring_id,
            json,
        } => {
            let window = config.sync.window_at(chrono::Utc::now());
            let request = CalSyncConvRequest {
                provider: provider.into(),
                conv_id,
                folder_id,
                recurring_id,
                range: SyncRange::new(
                    oldest.unwrap_or(window.oldest),
                    newest.unwrap_or(window.newest),
                ),
                event_map: read_json(&events)?,
            };
            let old_events: Vec<CalendarEvent> = match &old {
                Some(path) => read_json(path)?,
                None => Vec::new(),
            };
            runtime.block_on(cmd_reconcile(&config, request, old_events, json))
        }
        Commands::Toc {
            namespace,
            name,
            begin,
            end,
        } => runtime.block_on(cmd_toc(&config, &namespace, &name, begin, end)),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = workshop::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "workshop.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
    serde_json::from_str(&contents).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))
}

/// Run one reconciliation against an in-memory store seeded with `old_events`.
async fn cmd_reconcile(
    config: &Config,
    request: CalSyncConvRequest,
    old_events: Vec<CalendarEvent>,
    json: bool,
) -> anyhow::Result<()> {
    let db = MemoryDb::new();
    if !old_events.is_empty() {
        db.insert_conversation(churn_conversation(&request.conv_id, None, &old_events));
        db.insert_events(old_events);
    }

    let start = Instant::now();
    let task = CalSyncConv::new(config.links.clone());
    let planned = task.plan(request);
    tracing::debug!(resources = ?planned.exclusive_resources, "Planned task");
    let outcome = task.execute(&db, planned.request).await?;
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome_table(&outcome, elapsed);
    }
    Ok(())
}

fn print_outcome_table(outcome: &SyncConvOutcome, elapsed: std::time::Duration) {
    let chewed = &outcome.chewed;
    println!("Reconciled in {elapsed:.2?}");
    println!("  New:       {}", chewed.new_events.len());
    println!("  Modified:  {}", chewed.modified_event_map.len());
    println!("  Remaining: {}", chewed.all_events.len());
    println!();

    if !chewed.all_events.is_empty() {
        println!("{:<24} {:<8} {:<10} SUBJECT", "START", "ALL-DAY", "FLAGS");
        println!("{}", "-".repeat(70));
        for event in &chewed.all_events {
            let start = chrono::DateTime::from_timestamp_millis(event.start_date)
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "{:<24} {:<8} {:<10} {}",
                start,
                if event.is_all_day { "yes" } else { "no" },
                event.flags.join(","),
                event.subject.as_deref().unwrap_or("(no subject)")
            );
        }
    }

    let removed: Vec<&str> = chewed
        .modified_event_map
        .iter()
        .filter(|(_, e)| e.is_none())
        .map(|(id, _)| id.as_str())
        .collect();
    if !removed.is_empty() {
        println!();
        println!("Removed:");
        for id in removed {
            println!("  {}", id.replace('\0', "/"));
        }
    }

    match &outcome.conversation {
        Some(conv) => println!(
            "\nConversation: {} event(s), starred: {}",
            conv.message_count, conv.has_starred
        ),
        None => println!("\nConversation removed"),
    }
}

/// Acquire a static TOC through a named context and print a slice of it.
async fn cmd_toc(
    config: &Config,
    namespace: &str,
    name: &str,
    begin: usize,
    end: Option<usize>,
) -> anyhow::Result<()> {
    let manager = TocManager::new();
    config.register_namespaces(&manager)?;

    let bridge = BridgeContext::new("cli");
    let ctx = bridge.create_named_context("toc", None);
    let toc = manager.acquire_extension_toc(&ctx, namespace, name).await?;

    let end = end.unwrap_or(toc.len()).min(toc.len());
    let slice = toc.data_for_slice_range(begin, end, &BTreeSet::new());
    let items: BTreeMap<String, Value> = slice
        .state
        .into_iter()
        .map(|(id, state)| (id.to_string(), state.item))
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "type": toc.toc_type(),
            "total": toc.len(),
            "ids": slice.ids,
            "items": items,
        }))?
    );

    bridge.cleanup_all();
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "workshop", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

//! booksnake CLI - search ebook indexes, download a book, send it to a Kindle.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use booksnake::{
    book_filename,
    convert::{prepare_for_kindle, Converter},
    deliver::{Deliverer, Envelope, SmtpMailer, TerminalPrompt},
    engines,
    select::{self, Selection, DEFAULT_WIDTH},
    Book, HttpFetcher, PageFetcher, Retriever, Search, SearchError, SearchQuery,
    Settings, EXIT_CANCELLED, EXIT_FAILURE,
};

/// Request timeout for page and book downloads; engine searches have their own budget.
const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// booksnake - find an ebook and send it to your Kindle
#[derive(Parser)]
#[command(name = "booksnake")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: ~/.booksnakerc)
    #[arg(short = 'c', long = "settings", global = true)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search all enabled engines and list the results
    Search(SearchArgs),

    /// Search, pick a result and save it to disk
    Download(DownloadArgs),

    /// Search, pick a result, convert it if needed and mail it to a Kindle
    Send(SendArgs),

    /// List available engines
    Engines,
}

#[derive(Args)]
struct QueryArgs {
    /// Title, author or both
    query: String,

    /// Engines to use (comma-separated shortcuts), even if disabled in settings
    #[arg(short, long, value_delimiter = ',')]
    engines: Vec<String>,

    /// Engines to skip (comma-separated shortcuts)
    #[arg(short = 'x', long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Maximum number of results to show
    #[arg(short, long)]
    limit: Option<usize>,

    /// Per-engine timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Proxy URL (e.g., http://127.0.0.1:8080 or socks5://127.0.0.1:1080)
    #[arg(short, long)]
    proxy: Option<String>,

    /// Preferred formats, most wanted first (comma-separated)
    #[arg(long, value_delimiter = ',')]
    prefer: Vec<String>,
}

#[derive(Args)]
struct PickArgs {
    /// Take result N (1-based) instead of asking
    #[arg(long, conflicts_with = "auto")]
    pick: Option<usize>,

    /// Take the first result in a preferred format instead of asking
    #[arg(long)]
    auto: bool,
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Args)]
struct DownloadArgs {
    #[command(flatten)]
    query: QueryArgs,

    #[command(flatten)]
    pick: PickArgs,

    /// Directory to save the book in
    #[arg(short, long, default_value = ".")]
    output: PathBuf,
}

#[derive(Args)]
struct SendArgs {
    #[command(flatten)]
    query: QueryArgs,

    #[command(flatten)]
    pick: PickArgs,

    /// Kindle address (overrides to_email)
    #[arg(long)]
    to: Option<String>,

    /// Sender address (overrides from_email)
    #[arg(long)]
    from: Option<String>,

    /// Keep the downloaded and converted files
    #[arg(short, long)]
    keep: bool,

    /// Conversion program (overrides converter)
    #[arg(long)]
    converter: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable table
    Text,
    /// JSON output
    Json,
    /// HTML table
    Html,
}

/// A finished search, ready for selection.
struct Found {
    search: Search,
    fetcher: Arc<dyn PageFetcher>,
    books: Vec<Book>,
    preferred: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("error: {e}");
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            err.downcast_ref::<SearchError>()
                .map(SearchError::exit_code)
                .unwrap_or(EXIT_FAILURE)
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_filter = if verbose { "booksnake=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(cli: Cli) -> Result<i32> {
    let settings_path = match cli.settings {
        Some(path) => path,
        None => Settings::default_path()
            .ok_or_else(|| anyhow!("cannot locate the home directory; pass --settings"))?,
    };
    let mut settings = Settings::load(&settings_path)?;

    let outcome = match cli.command {
        Commands::Search(args) => run_search(args, &mut settings).await,
        Commands::Download(args) => run_download(args, &mut settings).await,
        Commands::Send(args) => run_send(args, &mut settings).await,
        Commands::Engines => list_engines(&settings),
    };

    // Suspensions found during the run are kept even when a later step fails.
    if let Err(e) = settings.save_if_dirty(&settings_path) {
        warn!("{e}");
    }
    outcome
}

fn list_engines(settings: &Settings) -> Result<i32> {
    let search = build_search(settings, None)?.0;

    println!("Available engines:\n");
    for engine in search.engines() {
        println!(
            "  {:<16} {:<16} {}",
            engine.shortcut(),
            engine.name(),
            if search.is_engine_enabled(engine.as_ref()) { "on" } else { "off" }
        );
    }
    println!();
    println!("Usage: booksnake search \"moby dick\" -e gutenberg,libgen");
    Ok(0)
}

fn build_search(settings: &Settings, proxy: Option<&str>) -> Result<(Search, Arc<dyn PageFetcher>)> {
    let fetcher: Arc<dyn PageFetcher> =
        Arc::new(HttpFetcher::new(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS), proxy)?);

    let mut search = Search::new();
    for shortcut in engines::ALL_SHORTCUTS {
        if let Some(engine) = engines::by_shortcut(shortcut, Arc::clone(&fetcher)) {
            search.add_boxed(engine);
        }
    }
    settings.apply_to(&mut search);
    Ok((search, fetcher))
}

fn canonical_shortcuts(names: &[String]) -> Result<Vec<String>> {
    names
        .iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| {
            engines::canonical_shortcut(name)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("unknown engine '{name}' (see `booksnake engines`)"))
        })
        .collect()
}

async fn find_books(args: &QueryArgs, settings: &mut Settings) -> Result<Found> {
    let (mut search, fetcher) = build_search(settings, args.proxy.as_deref())?;
    if let Some(secs) = args.timeout {
        search.set_timeout(Duration::from_secs(secs));
    }

    let preferred = if args.prefer.is_empty() {
        settings.preferred_formats()
    } else {
        args.prefer.iter().map(|f| f.trim().to_lowercase()).collect()
    };
    let query = SearchQuery::new(&args.query)
        .with_engines(canonical_shortcuts(&args.engines)?)
        .with_exclude(canonical_shortcuts(&args.exclude)?)
        .with_preferred_formats(preferred.clone());

    let results = search.search(query).await?;
    settings.apply_suspensions(&results);
    debug!(
        "{} results in {}ms, {} engines failed",
        results.count,
        results.duration_ms,
        results.failures().len()
    );

    if results.is_empty() {
        return Err(SearchError::NoResults(args.query.clone()).into());
    }

    let mut books = results.into_items();
    if let Some(limit) = args.limit {
        books.truncate(limit);
    }

    Ok(Found {
        search,
        fetcher,
        books,
        preferred,
    })
}

/// `COLUMNS` overrides the size the terminal reports.
fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.trim().parse().ok())
        .filter(|&w: &usize| w > 0)
        .or_else(|| {
            crossterm::terminal::size()
                .ok()
                .map(|(cols, _)| usize::from(cols))
                .filter(|&w| w > 0)
        })
        .unwrap_or(DEFAULT_WIDTH)
}

/// Picks a book; `None` when the user cancels.
fn choose(found: &Found, pick: &PickArgs) -> Result<Option<usize>> {
    if let Some(index) = pick.pick {
        return Ok(Some(select::select_index(&found.books, index)?));
    }
    if pick.auto {
        return Ok(Some(select::select_first_format(&found.books, &found.preferred)?));
    }
    let selection = select::select_interactive(
        &found.books,
        &found.preferred,
        terminal_width(),
        io::stdin().lock(),
        io::stdout().lock(),
    )?;
    Ok(match selection {
        Selection::Chosen(index) => Some(index),
        Selection::Cancelled => None,
    })
}

async fn run_search(args: SearchArgs, settings: &mut Settings) -> Result<i32> {
    let found = find_books(&args.query, settings).await?;

    match args.format {
        OutputFormat::Text => {
            for line in select::render_table(&found.books, &found.preferred, terminal_width()) {
                println!("{line}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&found.books)?),
        OutputFormat::Html => println!("{}", select::render_html(&found.books)),
    }
    Ok(0)
}

async fn run_download(args: DownloadArgs, settings: &mut Settings) -> Result<i32> {
    let found = find_books(&args.query, settings).await?;
    let Some(index) = choose(&found, &args.pick)? else {
        eprintln!("Cancelled.");
        return Ok(EXIT_CANCELLED);
    };
    let book = &found.books[index];

    let path = args.output.join(book_filename(book, &book.format));
    Retriever::new(Arc::clone(&found.fetcher))
        .retrieve(&found.search, book, Some(&path))
        .await?;
    println!("{}", path.display());
    Ok(0)
}

async fn run_send(args: SendArgs, settings: &mut Settings) -> Result<i32> {
    let to = args
        .to
        .clone()
        .or_else(|| settings.to_email.clone())
        .ok_or_else(|| anyhow!("no Kindle address: pass --to or set to_email in the settings file"))?;
    let from = args
        .from
        .clone()
        .or_else(|| settings.from_email.clone())
        .ok_or_else(|| anyhow!("no sender address: pass --from or set from_email in the settings file"))?;

    let found = find_books(&args.query, settings).await?;
    let Some(index) = choose(&found, &args.pick)? else {
        eprintln!("Cancelled.");
        return Ok(EXIT_CANCELLED);
    };
    let book = &found.books[index];

    let download = temp_path(&book.format);
    let retrieved = Retriever::new(Arc::clone(&found.fetcher))
        .retrieve(&found.search, book, Some(&download))
        .await?;

    let converter = Converter::new(
        args.converter
            .clone()
            .unwrap_or_else(|| settings.converter().to_string()),
    );
    let prepared = prepare_for_kindle(&converter, book, &download, retrieved.detected_format())
        .await
        .context("downloaded book kept for another try")?;
    let attachment = prepared.path;

    let data = tokio::fs::read(&attachment)
        .await
        .with_context(|| format!("reading {}", attachment.display()))?;
    let envelope = Envelope::new(from, to, prepared.attachment_name, data, &prepared.format)
        .with_server(settings.smtp_server(), settings.smtp_port());

    let password = settings.smtp_password.clone().filter(|p| !p.is_empty());
    let deliverer = Deliverer::new(Arc::new(SmtpMailer::new()), Box::new(TerminalPrompt));
    if let Err(e) = deliverer.deliver(&envelope, password).await {
        warn!("Book kept at {} for another try", attachment.display());
        return Err(SearchError::from(e).into());
    }

    if args.keep {
        println!("Sent \"{}\"; kept {}", book.title, attachment.display());
    } else {
        remove_files(&prepared.temp_files).await;
        println!("Sent \"{}\" to {}", book.title, envelope.to);
    }
    Ok(0)
}

fn temp_path(format: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    std::env::temp_dir().join(format!(".booksnake_{stamp}.{format}"))
}

async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        remove_file(path).await;
    }
}

async fn remove_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}

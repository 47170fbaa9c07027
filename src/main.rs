/*!
 * Upflow CLI - Command Line Interface
 */

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};
use upflow::{
    api::{HttpUploadApi, UploadApi},
    error::{UploadError, EXIT_SUCCESS},
    logging, progress_sink, CancellationToken, ChunkSource, LogLevel, Metadata,
    MultipartOptions, StoreSetting, UploadClient, UploadSettings, UploadSource,
};

/// Resolution of the progress bar
const PROGRESS_TICKS: u64 = 1000;

#[derive(Parser)]
#[command(name = "upflow")]
#[command(version, about = "Chunked multipart uploads with bounded concurrency", long_about = None)]
struct Cli {
    /// Project public key (overrides the config file)
    #[arg(long, global = true)]
    public_key: Option<String>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Path to log file (default: stderr)
    #[arg(long, value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file in parts and print its CDN URL
    Upload(UploadArgs),

    /// Show the service's descriptor for an uploaded file
    Info {
        /// File UUID
        uuid: String,
    },
}

#[derive(clap::Args)]
struct UploadArgs {
    /// File to upload
    file: PathBuf,

    /// Part size in bytes
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Parts uploaded at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Attempts per part before the upload fails
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Storing behavior
    #[arg(long, value_enum)]
    store: Option<StoreArg>,

    /// MIME type sent to the service
    #[arg(long)]
    content_type: Option<String>,

    /// Name sent to the service (default: the file name)
    #[arg(long)]
    name: Option<String>,

    /// Metadata entry, repeatable
    #[arg(long = "metadata", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    metadata: Vec<(String, String)>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum StoreArg {
    Auto,
    Yes,
    No,
}

impl From<StoreArg> for StoreSetting {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Auto => StoreSetting::Auto,
            StoreArg::Yes => StoreSetting::Store,
            StoreArg::No => StoreSetting::DoNotStore,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    if key.is_empty() {
        return Err(format!("empty metadata key in `{}`", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<(), UploadError> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    if let Err(e) = logging::init_logging(&settings) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| UploadError::Config(format!("Failed to start async runtime: {}", e)))?;

    runtime.block_on(async {
        match cli.command {
            Commands::Upload(args) => upload(settings, args).await,
            Commands::Info { uuid } => info(settings, &uuid).await,
        }
    })
}

fn load_settings(cli: &Cli) -> Result<UploadSettings, UploadError> {
    let mut settings = match &cli.config {
        Some(path) => UploadSettings::from_file(path)?,
        None => UploadSettings::default(),
    };

    if let Some(public_key) = &cli.public_key {
        settings.public_key = public_key.clone();
    }
    if let Some(level) = cli.log_level {
        settings.log_level = level.into();
    }
    if cli.log.is_some() {
        settings.log_file = cli.log.clone();
    }
    settings.verbose |= cli.verbose;

    settings.validate()?;
    Ok(settings)
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling upload...");
            token.cancel();
        }
    });
}

async fn upload(settings: UploadSettings, args: UploadArgs) -> Result<(), UploadError> {
    let source = UploadSource::from_path(&args.file).await?;
    if !settings.is_multipart(source.len()) {
        warn!(
            size = source.len(),
            threshold = settings.multipart_min_file_size,
            "file is below the multipart threshold, the service may reject it"
        );
    }

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let bar = if args.no_progress {
        ProgressBar::hidden()
    } else {
        progress_bar(&args.file)
    };
    let sink_bar = bar.clone();
    let sink = progress_sink(move |info| {
        if let Some(value) = info.value() {
            sink_bar.set_position((value * PROGRESS_TICKS as f64).round() as u64);
        }
    });

    let options = MultipartOptions {
        content_type: args.content_type,
        file_name: args.name,
        chunk_size: args.chunk_size,
        max_concurrent_requests: args.concurrency,
        max_attempts: args.max_attempts,
        store: args.store.map(StoreSetting::from),
        metadata: args.metadata.into_iter().collect::<Metadata>(),
        ..MultipartOptions::new()
    }
    .with_cancel(cancel)
    .with_progress(sink);

    let client = UploadClient::new(settings)?;
    let result = client.upload_multipart(&source, options).await;
    bar.finish_and_clear();

    let file = result?;
    debug!(uuid = %file.uuid(), "upload finished");
    println!("{}", file.cdn_url);
    Ok(())
}

fn progress_bar(path: &std::path::Path) -> ProgressBar {
    let bar = ProgressBar::new(PROGRESS_TICKS);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent}% ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar.set_message(path.display().to_string());
    bar
}

async fn info(settings: UploadSettings, uuid: &str) -> Result<(), UploadError> {
    let api = HttpUploadApi::new(&settings)?;
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let info = api.info(uuid, &cancel).await?;
    let json = serde_json::to_string_pretty(&info)?;
    println!("{}", json);
    Ok(())
}

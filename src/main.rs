use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use usdb_sync::config::Config;
use usdb_sync::media::{FfmpegTranscoder, MediaPipeline, YtDlp};
use usdb_sync::playlist;
use usdb_sync::progress::{format_duration, set_log_only, spinner};
use usdb_sync::transport::UreqSession;
use usdb_sync::{Downloader, UsdbClient};

#[derive(Parser)]
#[command(name = "usdb-sync")]
#[command(about = "Mirror karaoke song packages from the UltraStar song database")]
struct Cli {
    /// Log progress periodically instead of drawing progress bars
    #[arg(long, global = true)]
    log_only: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download every configured category and regenerate its playlist
    Sync(SyncArgs),
    /// Scrape the full song catalog
    Catalog(CatalogArgs),
    /// Print the playlists found in a directory
    Playlists {
        dir: PathBuf,
    },
}

#[derive(Args)]
struct AccountArgs {
    #[arg(short, long, default_value = "usdb-sync.toml")]
    config: PathBuf,

    /// Overrides account.user
    #[arg(long)]
    user: Option<String>,

    /// Overrides account.password
    #[arg(long, env = "USDB_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args)]
struct SyncArgs {
    #[command(flatten)]
    account: AccountArgs,

    #[arg(long)]
    songs_dir: Option<PathBuf>,

    #[arg(long)]
    playlist_dir: Option<PathBuf>,

    /// Parallel song-document fetches per category
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct CatalogArgs {
    #[command(flatten)]
    account: AccountArgs,

    /// Write all song records as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write one playlist per edition into this directory
    #[arg(long)]
    edition_playlists: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "usdb_sync=debug" } else { "usdb_sync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &AccountArgs) -> Result<Config> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config {:?}", args.config))?;
    if let Some(user) = &args.user {
        config.account.user = user.clone();
    }
    if let Some(password) = &args.password {
        config.account.password = password.clone();
    }
    Ok(config)
}

fn run_sync(args: SyncArgs) -> Result<()> {
    let mut config = load_config(&args.account)?;
    if let Some(dir) = args.songs_dir {
        config.paths.songs = dir;
    }
    if let Some(dir) = args.playlist_dir {
        config.paths.playlists = dir;
    }
    if let Some(workers) = args.workers {
        config.download.workers = workers;
    }
    config.validate()?;

    println!("Songs directory: {:?}", config.paths.songs);
    println!("Playlist directory: {:?}", config.paths.playlists);
    println!(
        "Requested: {} songs in {} categories",
        config.requested_songs(),
        config.categories.len()
    );

    let start = Instant::now();
    let client = UsdbClient::new(UreqSession::new());
    let media = MediaPipeline::new(
        YtDlp::new(config.download.yt_dlp.clone()),
        FfmpegTranscoder::new(config.download.ffmpeg.clone()),
    );
    let summary = Downloader::new(&client, &media, &config.account.user, &config.account.password)
        .with_workers(config.download.workers)
        .sync(&config.paths.songs, &config.paths.playlists, &config.categories)?;

    println!("\n{:=<60}", "");
    println!("Sync complete!");
    println!("  Songs: {}", summary.records.len());
    println!("  Downloaded: {}", summary.downloaded);
    println!("  Already present: {}", summary.skipped);
    println!("  Playlists: {}", config.categories.len());
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");
    Ok(())
}

fn run_catalog(args: CatalogArgs) -> Result<()> {
    let config = load_config(&args.account)?;
    config.validate_account()?;

    let client = UsdbClient::new(UreqSession::new());
    let login = spinner("Logging in");
    let accepted = client.login(&config.account.user, &config.account.password)?;
    login.finish_and_clear();
    if !accepted {
        bail!("Login failed for user '{}'", config.account.user);
    }

    let start = Instant::now();
    let records = client.catalog()?;
    let editions = playlist::editions(&records);

    println!("Catalog: {} songs, {} editions", records.len(), editions.len());
    for edition in &editions {
        println!("  {} ({})", edition, playlist::songs_in_edition(&records, edition).len());
    }

    if let Some(path) = &args.json {
        let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &records)
            .with_context(|| format!("Failed to write {:?}", path))?;
        println!("Wrote records to {:?}", path);
    }

    if let Some(dir) = &args.edition_playlists {
        let written = playlist::write_edition_playlists(dir, &records)?;
        println!("Wrote {} edition playlists to {:?}", written, dir);
    }

    println!("Elapsed: {}", format_duration(start.elapsed()));
    Ok(())
}

fn run_playlists(dir: PathBuf) -> Result<()> {
    let playlists = playlist::list_playlists(&dir)?;
    for playlist in &playlists {
        println!("{} ({} songs)", playlist.name, playlist.lines.len());
        for line in &playlist.lines {
            println!("  {}", line);
        }
    }
    if playlists.is_empty() {
        println!("No playlists found in {:?}", dir);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    set_log_only(cli.log_only);

    match cli.command {
        Command::Sync(args) => run_sync(args),
        Command::Catalog(args) => run_catalog(args),
        Command::Playlists { dir } => run_playlists(dir),
    }
}

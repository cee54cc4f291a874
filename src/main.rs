mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use rh_av::{FfprobeProber, Prober, ToolRegistry};
use rh_core::config::Config;
use rh_server::scanner::LibraryScanner;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelhouse=trace,rh_server=debug,rh_db=debug,rh_av=debug,tower_http=debug".to_string()
        } else {
            "reelhouse=info,rh_server=info,rh_db=info,rh_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Scan { root, path, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(scan_library(cli.config.as_deref(), root, path, json))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(cli.config.as_deref(), &file, json))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate { config } => {
            let path = config.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("reelhouse {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path);
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting reelhouse {}", env!("CARGO_PKG_VERSION"));
    rh_server::start(config).await?;
    Ok(())
}

async fn scan_library(
    config_path: Option<&Path>,
    root: Option<usize>,
    path: Option<std::path::PathBuf>,
    json: bool,
) -> Result<()> {
    let config = Config::load_or_default(config_path);
    if config.library.roots.is_empty() {
        anyhow::bail!("No library roots configured");
    }

    let store = rh_server::open_store(&config)?;
    let scanner = Arc::new(LibraryScanner::new(&config.library, store));

    let reports = match (root, path) {
        (None, None) => scanner.scan_all().await?,
        (root, path) => vec![scanner.scan_path(root.unwrap_or(0), path).await?],
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        println!("Root: {}", report.root.display());
        if report.target != report.root {
            println!("  Target: {}", report.target.display());
        }
        println!("  Scanned: {}", report.scanned);
        println!("  Upserted: {}", report.upserted);
        println!("  Deleted: {}", report.deleted);
        if !report.errors.is_empty() {
            println!("  Errors: {}", report.errors.len());
            for error in &report.errors {
                println!("    {error}");
            }
        }
    }

    Ok(())
}

async fn probe_file(config_path: Option<&Path>, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let prober = FfprobeProber::from_registry(&tools)?;
    let info = prober.probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    if let Some(ref format) = info.format {
        println!("Format: {format}");
    }
    if let Some(secs) = info.duration_secs {
        let secs = secs as u64;
        println!("Duration: {:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    }
    if let Some(bitrate) = info.bitrate {
        println!("Bitrate: {} kb/s", bitrate / 1000);
    }
    if let Some(ref codec) = info.video_codec {
        print!("Video: {codec}");
        if let (Some(w), Some(h)) = (info.width, info.height) {
            print!(" {w}x{h}");
        }
        println!();
    }

    println!("\nAudio Tracks: {}", info.audio_streams.len());
    for stream in &info.audio_streams {
        print!("  [{}] {}", stream.index, stream.codec.as_deref().unwrap_or("unknown"));
        if let Some(channels) = stream.channels {
            print!(" {channels}ch");
        }
        if let Some(ref lang) = stream.language {
            print!(" ({lang})");
        }
        if let Some(ref title) = stream.title {
            print!(" \"{title}\"");
        }
        println!();
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in tools.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Transcoding and probing need ffmpeg and ffprobe.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration parsed with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    println!("  Server: {}:{}", config.server.host, config.server.port);
    match &config.server.db_path {
        Some(db) => println!("  Database: {}", db.display()),
        None => println!("  Database: none (in-memory snapshot only)"),
    }
    println!("  Library roots: {}", config.library.roots.len());
    for root in &config.library.roots {
        println!("    {} ({})", root.path.display(), root.kind);
    }
    println!("  Read-only: {}", config.library.read_only);
    println!("  Profiles: {}", config.transcoding.profiles.len());
    println!("  Cache dir: {}", config.transcoding.cache_dir.display());

    Ok(())
}

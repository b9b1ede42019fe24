//! RBN Filter CLI - Watch the Reverse Beacon Network for the spots you care about.

use anyhow::{Context, Result};
use clap::Parser;
use rbn_filter::{
    client::FeedClient,
    config::Config,
    enrich::EnrichmentCache,
    filter::{FilterChain, Selector},
    logging::init_logging,
    membership::load_friends,
    pipeline::SpotPipeline,
    qrz::QrzClient,
    render::Renderer,
    spot::{Band, Mode},
    store::{CacheEntry, StationStore},
};
use std::io;
use std::path::{Path, PathBuf};
use tokio::signal;
use tracing::{error, info, warn};

/// RBN Filter - Enrich, filter and highlight spots from the Reverse Beacon Network
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Callsign to use for RBN login
    #[arg(short, long, env = "RBN_CALLSIGN")]
    callsign: Option<String>,

    /// RBN server hostname
    #[arg(long, env = "RBN_HOST")]
    host: Option<String>,

    /// RBN server port
    #[arg(long, env = "RBN_PORT")]
    port: Option<u16>,

    /// Band to show, e.g. 20m (repeatable)
    #[arg(long = "band")]
    bands: Vec<Band>,

    /// Mode to show, e.g. CW (repeatable)
    #[arg(long = "mode")]
    modes: Vec<Mode>,

    /// Slowest code speed to show
    #[arg(long)]
    min_wpm: Option<u16>,

    /// Fastest code speed to show
    #[arg(long)]
    max_wpm: Option<u16>,

    /// Spotter CQ zone (repeatable)
    #[arg(long = "de-cq")]
    de_cq: Vec<u8>,

    /// Spotted station CQ zone (repeatable)
    #[arg(long = "dx-cq")]
    dx_cq: Vec<u8>,

    /// Spotter ITU zone (repeatable)
    #[arg(long = "de-itu")]
    de_itu: Vec<u8>,

    /// Spotted station ITU zone (repeatable)
    #[arg(long = "dx-itu")]
    dx_itu: Vec<u8>,

    /// Spotter grid field, e.g. FN (repeatable, "all" for any)
    #[arg(long = "de-grid")]
    de_grid: Vec<String>,

    /// Spotted station grid field (repeatable, "all" for any)
    #[arg(long = "dx-grid")]
    dx_grid: Vec<String>,

    /// Home latitude for distances
    #[arg(long, allow_hyphen_values = true)]
    latitude: Option<f64>,

    /// Home longitude for distances
    #[arg(long, allow_hyphen_values = true)]
    longitude: Option<f64>,

    /// QRZ.com user name
    #[arg(long, env = "QRZ_USERNAME")]
    qrz_username: Option<String>,

    /// QRZ.com password
    #[arg(long, env = "QRZ_PASSWORD", hide_env_values = true)]
    qrz_password: Option<String>,

    /// File of friend or club call signs (repeatable)
    #[arg(long = "friends")]
    friends: Vec<PathBuf>,

    /// SQLite club membership database
    #[arg(long)]
    club_db: Option<PathBuf>,

    /// Station store file
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Start with an empty station store
    #[arg(long)]
    fresh_cache: bool,

    /// Print the station store and exit
    #[arg(long)]
    dump_cache: bool,

    /// Disable auto-reconnect
    #[arg(long)]
    no_reconnect: bool,

    /// Connection timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Also write diagnostics to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Config file (default: platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    /// Override file settings with the flags that were given.
    fn apply(self, config: &mut Config) {
        if let Some(callsign) = self.callsign {
            config.callsign = callsign;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }

        let filter = &mut config.filter;
        if !self.bands.is_empty() {
            filter.bands = self.bands;
        }
        if !self.modes.is_empty() {
            filter.modes = self.modes;
        }
        if let Some(min) = self.min_wpm {
            filter.min_wpm = min;
        }
        if let Some(max) = self.max_wpm {
            filter.max_wpm = max;
        }
        override_selector(&mut filter.de_cq_zones, self.de_cq);
        override_selector(&mut filter.dx_cq_zones, self.dx_cq);
        override_selector(&mut filter.de_itu_zones, self.de_itu);
        override_selector(&mut filter.dx_itu_zones, self.dx_itu);
        override_selector(&mut filter.de_grids, self.de_grid);
        override_selector(&mut filter.dx_grids, self.dx_grid);

        if self.latitude.is_some() {
            config.latitude = self.latitude;
        }
        if self.longitude.is_some() {
            config.longitude = self.longitude;
        }
        if self.qrz_username.is_some() {
            config.qrz.username = self.qrz_username;
        }
        if self.qrz_password.is_some() {
            config.qrz.password = self.qrz_password;
        }

        config.membership.files.extend(self.friends);
        if let Some(path) = self.club_db {
            config.membership.sqlite = Some(rbn_filter::config::SqliteSource {
                path,
                query: rbn_filter::membership::DEFAULT_MEMBER_QUERY.to_string(),
            });
        }
        if self.cache.is_some() {
            config.cache.path = self.cache;
        }
        if self.fresh_cache {
            config.cache.fresh = true;
        }

        if self.no_reconnect {
            config.reconnect = false;
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = timeout;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file;
        }
    }
}

fn override_selector<T: Eq + std::hash::Hash>(selector: &mut Selector<T>, values: Vec<T>) {
    if !values.is_empty() {
        *selector = Selector::from_values(values);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let dump_cache = args.dump_cache;
    args.apply(&mut config);

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref())
        .context("Failed to initialize logging")?;

    let cache_path = config.cache_path()?;
    if dump_cache {
        return dump_store(&cache_path);
    }

    let mut filter_config = config.validate()?;

    info!("RBN Filter starting...");
    info!("Callsign: {}", config.callsign);
    info!("Server: {}:{}", config.host, config.port);

    let files = config.membership_files()?;
    let database = config.membership_database()?;
    filter_config.friends = load_friends(
        &files,
        database.as_ref().map(|(path, query)| (path.as_path(), query.as_str())),
    )
    .await?;
    info!("{} friends and club members loaded", filter_config.friends.len());

    let store = if config.cache.fresh {
        StationStore::create_fresh(&cache_path)
    } else {
        StationStore::open(&cache_path)
    }
    .with_context(|| format!("Station store unavailable: {}", cache_path.display()))?;
    info!("{} stations in {}", store.len(), cache_path.display());

    let qrz = QrzClient::new(
        config.qrz.url.as_str(),
        config.qrz.username.clone().unwrap_or_default(),
        config.qrz.password.clone().unwrap_or_default(),
    )
    .context("Failed to create the QRZ client")?;

    let feed_config = config.feed_config();
    let filter = FilterChain::new(filter_config).map_err(anyhow::Error::msg)?;
    let renderer = Renderer::new(io::stdout(), config.home());
    let mut pipeline = SpotPipeline::new(
        EnrichmentCache::new(qrz, store),
        filter,
        renderer,
        feed_config.callsign.clone(),
    )
    .with_reconnect(feed_config.auto_reconnect);
    let client = FeedClient::new(feed_config);

    let interrupted = tokio::select! {
        _ = client.run(&mut pipeline) => false,
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            true
        }
    };

    if interrupted {
        info!("Shutdown signal received");
        pipeline.notice(&format!("Terminating connection to: {}", config.host))?;
    }

    if let Err(e) = pipeline.flush_store() {
        error!("Failed to save the station store: {}", e);
    }

    // Print final statistics
    println!("\n{}", pipeline.summary());

    Ok(())
}

/// Print every stored station.
fn dump_store(path: &Path) -> Result<()> {
    let store = StationStore::open(path)
        .with_context(|| format!("Station store unavailable: {}", path.display()))?;
    for (call_sign, entry) in store.iter() {
        match entry {
            CacheEntry::Found(record) => println!("{}", record),
            CacheEntry::NotFound => println!("{:6}  (not found)", call_sign),
        }
    }
    println!("{} stations", store.len());
    Ok(())
}

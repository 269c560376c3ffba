//! CLI entry point for the station tracker.
//!
//! `serve` runs the full service: UDP ingestion, station refresh, the HTTP
//! read API, the relay to the external sink and, optionally, the raw-reading
//! archive with a daily S3 upload. The other subcommands are offline tools.

mod infra;

use std::ffi::OsStr;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use station_tracker::api::{self, ApiMeta, ApiState};
use station_tracker::archive::{ArchiveQueue, CsvReadingArchive};
use station_tracker::catalog::{
    FileStationCatalog, StationCatalog, StationSnapshot, refresh_loop, refresh_once,
};
use station_tracker::fetch::auth::{ApiKey, UrlParam};
use station_tracker::fetch::{BasicClient, HttpClient};
use station_tracker::listener::FrameListener;
use station_tracker::relay::{RelayConfig, RelayWorker};
use station_tracker::store::LatestTracking;
use station_tracker::arrival::ArrivalConfig;
use station_tracker::estimator::EstimatorConfig;
use station_tracker::tracker::TrackerConfig;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::infra::{S3StationCatalog, upload_archive_for_date};

#[derive(Parser)]
#[command(name = "station_tracker")]
#[command(about = "Tracks a vehicle against a station list from UDP telemetry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest frames over UDP, serve the read API and relay to the sink
    Serve(ServeArgs),
    /// Run frames from a file (one per line) through the pipeline and print
    /// each payload as a JSON line
    Replay {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Simulated time between consecutive frames
        #[arg(long, default_value_t = 1000)]
        frame_interval_ms: i64,

        #[command(flatten)]
        stations: StationSource,

        #[command(flatten)]
        tracking: TrackingArgs,
    },
    /// Load the station catalog and list the active stations
    ListStations {
        #[command(flatten)]
        stations: StationSource,
    },
    /// Upload one day of archived readings to S3
    UploadArchive {
        /// Archive directory holding device_id=* subdirectories
        #[arg(short = 'd', long, env = "ARCHIVE_DIR")]
        archive_dir: PathBuf,

        /// S3 bucket name to upload to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: String,

        /// Day to upload, YYYY-MM-DD (default: yesterday, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Gzip compress CSV files before uploading
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

/// Where the station list comes from: a local JSON file or an S3 object.
#[derive(Args, Debug)]
struct StationSource {
    /// JSON file with the station list
    #[arg(long = "stations", env = "STATIONS_FILE", conflicts_with = "stations_s3_bucket")]
    stations_file: Option<PathBuf>,

    /// S3 bucket holding the station list
    #[arg(long, env = "STATIONS_S3_BUCKET", requires = "stations_s3_key")]
    stations_s3_bucket: Option<String>,

    /// S3 key of the station list
    #[arg(long, env = "STATIONS_S3_KEY", requires = "stations_s3_bucket")]
    stations_s3_key: Option<String>,
}

/// Estimation and arrival thresholds.
#[derive(Args, Debug)]
struct TrackingArgs {
    /// Arrival requires speed strictly below this, km/h
    #[arg(long, env = "ARRIVAL_MAX_SPEED_KMH", default_value_t = 2.0)]
    arrival_max_speed_kmh: f64,

    /// Arrival requires the nearest station strictly closer than this, meters
    #[arg(long, env = "ARRIVAL_MAX_DISTANCE_M", default_value_t = 100.0)]
    arrival_max_distance_m: f64,

    /// Minimum time an arrival is held before departure is considered
    #[arg(long, env = "ARRIVAL_COOLDOWN_SECS", default_value_t = 60)]
    arrival_cooldown_secs: i64,

    /// Oldest GPS fix dead reckoning extrapolates from
    #[arg(long, env = "MAX_FIX_AGE_SECS", default_value_t = 30)]
    max_fix_age_secs: i64,
}

impl TrackingArgs {
    fn config(&self) -> TrackerConfig {
        TrackerConfig {
            estimator: EstimatorConfig {
                max_fix_age: chrono::Duration::seconds(self.max_fix_age_secs),
            },
            arrival: ArrivalConfig {
                max_speed_kmh: self.arrival_max_speed_kmh,
                max_distance_m: self.arrival_max_distance_m,
                cooldown: chrono::Duration::seconds(self.arrival_cooldown_secs),
            },
        }
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// UDP port frames arrive on
    #[arg(long, env = "UDP_PORT", default_value_t = 1338)]
    udp_port: u16,

    /// HTTP port of the read API
    #[arg(long, env = "PORT", default_value_t = 3000)]
    http_port: u16,

    /// Sink the latest payload is POSTed to; relay is disabled when absent
    #[arg(long, env = "CLOUD_ENDPOINT")]
    sink_url: Option<String>,

    /// API key for the sink, sent as a bearer token by default
    #[arg(long, env = "CLOUD_API_KEY", hide_env_values = true)]
    sink_api_key: Option<String>,

    /// Send the API key as this query parameter instead of a bearer token
    #[arg(long, env = "CLOUD_API_KEY_PARAM", requires = "sink_api_key")]
    sink_api_key_param: Option<String>,

    #[arg(long, default_value_t = 1000)]
    relay_interval_ms: u64,

    #[arg(long, default_value_t = 5)]
    relay_timeout_secs: u64,

    #[command(flatten)]
    stations: StationSource,

    #[command(flatten)]
    tracking: TrackingArgs,

    #[arg(long, default_value_t = 60)]
    station_refresh_secs: u64,

    /// Archive every accepted frame under this directory
    #[arg(long, env = "ARCHIVE_DIR")]
    archive_dir: Option<PathBuf>,

    /// Upload the previous day's archive to this S3 bucket once a day
    #[arg(long, env = "ARCHIVE_S3_BUCKET", requires = "archive_dir")]
    archive_s3_bucket: Option<String>,

    /// Gzip archive files before uploading
    #[arg(long, default_value_t = false)]
    archive_gzip: bool,

    /// Readings queued for the archive writer before new ones are dropped
    #[arg(long, default_value_t = 1024)]
    archive_queue_size: usize,

    /// Reported by GET /api
    #[arg(long, env = "API_ENV", default_value = "dev")]
    api_env: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/station_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("station_tracker.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await?,
        Commands::Replay {
            file,
            frame_interval_ms,
            stations,
            tracking,
        } => replay(&file, frame_interval_ms, &stations, tracking.config()).await?,
        Commands::ListStations { stations } => {
            let catalog = station_catalog(&stations).await?;
            let stations = catalog.active_stations().await?;

            for station in &stations {
                info!(
                    station_id = station.id,
                    station_name = %station.name,
                    latitude = station.latitude,
                    longitude = station.longitude,
                    "Station"
                );
            }
            info!(total = stations.len(), "Station list summary");
        }
        Commands::UploadArchive {
            archive_dir,
            s3_bucket,
            date,
            gzip,
        } => {
            let date = match date {
                Some(date) => date,
                None => Utc::now()
                    .date_naive()
                    .pred_opt()
                    .context("no previous day to upload")?,
            };
            let config = aws_config::load_from_env().await;
            let client = aws_sdk_s3::Client::new(&config);
            upload_archive_for_date(&client, &s3_bucket, &archive_dir, date, gzip).await?;
        }
    }

    Ok(())
}

async fn station_catalog(source: &StationSource) -> Result<Arc<dyn StationCatalog>> {
    if let Some(path) = &source.stations_file {
        info!(path = %path.display(), "Using station file");
        return Ok(Arc::new(FileStationCatalog::new(path)));
    }

    match (&source.stations_s3_bucket, &source.stations_s3_key) {
        (Some(bucket), Some(key)) => {
            info!(bucket = %bucket, key = %key, "Using S3 station list");
            let config = aws_config::load_from_env().await;
            let client = aws_sdk_s3::Client::new(&config);
            Ok(Arc::new(S3StationCatalog::new(client, bucket, key)))
        }
        _ => bail!("no station catalog configured: pass --stations or --stations-s3-bucket and --stations-s3-key"),
    }
}

/// Wraps the HTTP client in whichever credential scheme the sink expects.
fn sink_client(args: &ServeArgs) -> Result<Box<dyn HttpClient>> {
    let client = BasicClient::new(Duration::from_secs(args.relay_timeout_secs))?;

    let client: Box<dyn HttpClient> = match (&args.sink_api_key, &args.sink_api_key_param) {
        (Some(key), Some(param_name)) => Box::new(UrlParam {
            inner: client,
            param_name: param_name.clone(),
            key: key.clone(),
        }),
        (Some(key), None) => Box::new(ApiKey::bearer(client, key)?),
        (None, _) => Box::new(client),
    };
    Ok(client)
}

#[tracing::instrument(skip_all, fields(udp_port = args.udp_port, http_port = args.http_port))]
async fn serve(args: ServeArgs) -> Result<()> {
    let catalog = station_catalog(&args.stations).await?;
    let snapshot = Arc::new(StationSnapshot::default());
    match refresh_once(catalog.as_ref(), &snapshot).await {
        Ok(count) => info!(count, "Stations loaded"),
        Err(e) => warn!(
            error = format!("{e:#}"),
            "Initial station load failed, starting with an empty catalog"
        ),
    }
    tokio::spawn(refresh_loop(
        Arc::clone(&catalog),
        Arc::clone(&snapshot),
        Duration::from_secs(args.station_refresh_secs),
    ));

    let store = Arc::new(LatestTracking::new());
    let mut listener = FrameListener::new(args.tracking.config(), snapshot, Arc::clone(&store));

    if let Some(dir) = &args.archive_dir {
        info!(dir = %dir.display(), "Raw-reading archive enabled");
        let (queue, _writer) =
            ArchiveQueue::spawn(Arc::new(CsvReadingArchive::new(dir)), args.archive_queue_size);
        listener = listener.with_archive(queue);

        if let Some(bucket) = &args.archive_s3_bucket {
            info!(bucket = %bucket, gzip = args.archive_gzip, "S3 archive upload enabled");
            let config = aws_config::load_from_env().await;
            let client = aws_sdk_s3::Client::new(&config);
            tokio::spawn(upload_archive_daily(
                client,
                bucket.clone(),
                dir.clone(),
                args.archive_gzip,
            ));
        }
    }

    match &args.sink_url {
        Some(sink_url) => {
            let config = RelayConfig {
                sink_url: sink_url.clone(),
                interval: Duration::from_millis(args.relay_interval_ms),
            };
            let worker = RelayWorker::new(sink_client(&args)?, config, Arc::clone(&store));
            tokio::spawn(worker.run());
        }
        None => info!("No sink URL configured, relay disabled"),
    }

    let api_state = ApiState {
        store,
        meta: Arc::new(ApiMeta::new(args.api_env.clone())),
    };
    let udp_addr = SocketAddr::from(([0, 0, 0, 0], args.udp_port));
    let http_addr = SocketAddr::from(([0, 0, 0, 0], args.http_port));

    tokio::select! {
        res = listener.run(udp_addr) => res?,
        res = api::serve(http_addr, api_state) => res?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}

/// Uploads the previous day's archive once per UTC day.
#[tracing::instrument(skip_all, fields(bucket = %bucket, archive_dir = %archive_dir.display(), gzip = gzip))]
async fn upload_archive_daily(
    client: aws_sdk_s3::Client,
    bucket: String,
    archive_dir: PathBuf,
    gzip: bool,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    let mut last_upload_date: Option<NaiveDate> = None;

    loop {
        interval.tick().await;

        let today = Utc::now().date_naive();
        if last_upload_date.is_some_and(|date| date >= today) {
            continue;
        }

        if let Some(yesterday) = today.pred_opt() {
            info!(date = %yesterday, "Uploading previous day's archive to S3");
            match upload_archive_for_date(&client, &bucket, &archive_dir, yesterday, gzip).await {
                Ok(count) => info!(date = %yesterday, count, "Uploaded previous day's archive"),
                Err(e) => error!(error = format!("{e:#}"), "Failed to upload previous day's archive"),
            }
        }
        last_upload_date = Some(today);
    }
}

async fn replay(
    file: &Path,
    frame_interval_ms: i64,
    source: &StationSource,
    config: TrackerConfig,
) -> Result<()> {
    let catalog = station_catalog(source).await?;
    let snapshot = Arc::new(StationSnapshot::new(catalog.active_stations().await?));
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;

    let store = Arc::new(LatestTracking::new());
    let mut listener = FrameListener::new(config, snapshot, Arc::clone(&store));

    let step = chrono::Duration::milliseconds(frame_interval_ms);
    let mut now = Utc::now();
    let mut stdout = std::io::stdout().lock();
    let mut rejected = 0usize;

    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match listener.handle_frame(line, now) {
            Some(_) => {
                if let Some(snapshot) = store.latest() {
                    serde_json::to_writer(&mut stdout, &snapshot.payload)?;
                    writeln!(stdout)?;
                }
            }
            None => rejected += 1,
        }
        now += step;
    }

    info!(file = %file.display(), rejected, "Replay finished");
    Ok(())
}

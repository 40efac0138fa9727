mod display;
mod pipeline;

use std::path::{Path, PathBuf};

use agrisat_ai::ModelStore;
use agrisat_core::ingest::read_value_column;
use agrisat_core::{AgrisatConfig, ImageryQuery, NdviSeries, RasterGrid, Region};
use agrisat_remote::{ImageryClient, LayerList, RequestTracker, ServiceAccountKey};
use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agrisat", version, about = "Crop monitoring from satellite NDVI")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "AGRISAT_CONFIG")]
    config: Option<PathBuf>,

    /// Imagery service base URL
    #[arg(long, global = true, env = "AGRISAT_BASE_URL")]
    base_url: Option<String>,

    /// Service-account JSON file (otherwise read from the configured env var)
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WindowArgs {
    /// Latitude of the field
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,
    /// Longitude of the field
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,
    /// First day, YYYY-MM-DD (inclusive)
    #[arg(long)]
    start: String,
    /// Last day, YYYY-MM-DD (exclusive)
    #[arg(long)]
    end: String,
    /// Maximum cloud cover percentage
    #[arg(long)]
    cloud: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the NDVI time series at a point
    Series {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Estimate yield from a fetched NDVI series or an uploaded CSV
    Yield {
        /// CSV with `date` and `ndvi` columns instead of fetching
        #[arg(long, conflicts_with_all = ["lat", "lon", "start", "end"])]
        csv: Option<PathBuf>,
        /// Read a bare value column from the CSV instead of a dated series
        #[arg(long, requires = "csv")]
        column: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        cloud: Option<f64>,
        /// Directory holding the model files
        #[arg(long, env = "AGRISAT_MODEL_DIR")]
        model_dir: Option<PathBuf>,
    },
    /// Segment field boundaries in a single-band GeoTIFF
    Mask {
        /// Input GeoTIFF
        input: PathBuf,
        /// Tile size in pixels
        #[arg(long)]
        tile_size: Option<usize>,
        /// Score threshold for a field pixel
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long, env = "AGRISAT_MODEL_DIR")]
        model_dir: Option<PathBuf>,
    },
    /// Build a median NDVI composite and print its map layer
    Layer {
        /// Country name or "lat,lon"
        #[arg(long)]
        region: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        cloud: Option<f64>,
        /// Layer name
        #[arg(long, default_value = "NDVI")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AgrisatConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(url) = &cli.base_url {
        config.remote.base_url = url.clone();
    }
    info!("agrisat v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Series { window } => {
            let query = window_query(window, &config)?;
            let client = connect(&cli, &config)?;
            let series = pipeline::fetch_series(&client, &config, &query).await?;
            display::print_series(&series)?;
        }
        Commands::Yield {
            csv,
            column,
            lat,
            lon,
            start,
            end,
            cloud,
            model_dir,
        } => {
            if let Some(dir) = model_dir {
                config.inference.model_dir = dir.clone();
            }
            config.validate()?;
            let models = load_models(&config)?;

            if let Some(path) = csv {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let values = match column {
                    Some(name) => read_value_column(&bytes, name)?,
                    None => {
                        let series = NdviSeries::from_csv_bytes(&bytes)?;
                        display::print_series(&series)?;
                        series.values().to_vec()
                    }
                };
                let estimate = pipeline::run_yield_on_values(&values, &models, &config)?;
                print!("{}", display::format_yield_card(&estimate, None));
            } else {
                let (Some(lat), Some(lon), Some(start), Some(end)) = (lat, lon, start, end) else {
                    bail!("either --csv or all of --lat, --lon, --start and --end are required");
                };
                let window = WindowArgs {
                    lat: *lat,
                    lon: *lon,
                    start: start.clone(),
                    end: end.clone(),
                    cloud: *cloud,
                };
                let query = window_query(&window, &config)?;
                let client = connect(&cli, &config)?;
                let tracker = RequestTracker::new();
                let report = pipeline::run_yield_pipeline(
                    &client, &models, &config, &query, &tracker, "cli",
                )
                .await?
                .context("request superseded")?;
                display::print_series(&report.series)?;
                let card = display::format_yield_card(&report.estimate, Some(report.elapsed_secs));
                print!("{card}");
            }
        }
        Commands::Mask {
            input,
            tile_size,
            threshold,
            model_dir,
        } => {
            if let Some(t) = tile_size {
                config.inference.tile_size = *t;
            }
            if let Some(t) = threshold {
                config.inference.threshold = *t;
            }
            if let Some(dir) = model_dir {
                config.inference.model_dir = dir.clone();
            }
            config.validate()?;

            let bytes = std::fs::read(input)
                .with_context(|| format!("reading {}", input.display()))?;
            let grid = RasterGrid::from_geotiff_bytes(&bytes)?;
            let models = load_models(&config)?;
            let outcome = pipeline::run_mask_pipeline(&grid, &models, &config)?;
            print!("{}", display::format_mask_summary(&outcome));
        }
        Commands::Layer {
            region,
            start,
            end,
            cloud,
            name,
        } => {
            let region = Region::parse(region)?;
            let threshold = cloud.unwrap_or(config.series.cloud_threshold);
            let query = ImageryQuery::from_strings(region, start, end, threshold)?;
            let client = connect(&cli, &config)?;
            let mut map = LayerList::from_settings(&config.display);
            pipeline::run_layer_pipeline(&mut map, &client, &config, &query, name).await?;
            print!("{}", display::format_layers(&map));
        }
    }

    Ok(())
}

fn window_query(window: &WindowArgs, config: &AgrisatConfig) -> anyhow::Result<ImageryQuery> {
    let region = Region::point(window.lat, window.lon)?;
    let threshold = window.cloud.unwrap_or(config.series.cloud_threshold);
    Ok(ImageryQuery::from_strings(region, &window.start, &window.end, threshold)?)
}

fn connect(cli: &Cli, config: &AgrisatConfig) -> anyhow::Result<ImageryClient> {
    let client = match &cli.credentials {
        Some(path) => ImageryClient::new(&config.remote, ServiceAccountKey::from_file(path)?)?,
        None => ImageryClient::from_env(&config.remote)?,
    };
    Ok(client)
}

fn load_models(config: &AgrisatConfig) -> anyhow::Result<ModelStore> {
    let dir: &Path = &config.inference.model_dir;
    ModelStore::load(dir, config.inference.tile_size)
        .with_context(|| format!("loading models from {}", dir.display()))
}

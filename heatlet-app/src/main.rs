use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use heatlet::prelude::*;
use serde::Deserialize;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory or http(s) URL containing `tiles/metadata.json`
    #[arg(short, long, env = "HEATLET_BASE")]
    base: Option<String>,

    /// JSON file with tile loading settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Settings preset used when no config file is given
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    preset: Preset,

    /// JSON file with the viewport steps to replay
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// State whose neighborhood boundaries are drawn over the tiles
    #[arg(long, default_value = heatlet::constants::DEFAULT_NEIGHBORHOOD_STATE)]
    state: String,

    /// Show neighborhood names
    #[arg(long)]
    labels: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    Responsive,
    LowBandwidth,
}

/// One camera position of the replayed path
#[derive(Debug, Clone, Deserialize)]
struct Step {
    lat: f64,
    lng: f64,
    lat_span: f64,
    lng_span: f64,
    zoom: f64,
    #[serde(default = "default_kind")]
    kind: ViewportEventKind,
    /// Wait for the loads of this step before moving on
    #[serde(default = "default_settle")]
    settle: bool,
}

fn default_kind() -> ViewportEventKind {
    ViewportEventKind::MoveEnd
}

fn default_settle() -> bool {
    true
}

impl Step {
    fn viewport(&self) -> Result<ViewportState> {
        ViewportState::from_center_span(
            LatLng::new(self.lat, self.lng),
            self.lat_span,
            self.lng_span,
            self.zoom,
        )
        .with_context(|| format!("invalid step at ({}, {})", self.lat, self.lng))
    }
}

/// Pan across Austin at street level, then zoom out
fn default_path() -> Vec<Step> {
    let step = |lat, lng, zoom, settle| Step {
        lat,
        lng,
        lat_span: 0.2,
        lng_span: 0.3,
        zoom,
        kind: ViewportEventKind::MoveEnd,
        settle,
    };
    vec![
        step(30.27, -97.74, 10.0, true),
        step(30.30, -97.70, 10.0, false),
        step(30.33, -97.66, 10.0, true),
        step(30.27, -97.74, 3.0, true),
    ]
}

fn load_config(cli: &Cli) -> Result<TileLoadingConfig> {
    let mut config = match &cli.config {
        Some(path) => TileLoadingConfig::from_path(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => match cli.preset {
            Preset::Default => TileLoadingConfig::default(),
            Preset::Responsive => TileLoadingConfig::responsive(),
            Preset::LowBandwidth => TileLoadingConfig::low_bandwidth(),
        },
    };
    if let Some(base) = &cli.base {
        config = config.with_base_path(base.clone());
    }
    config.validate()?;
    Ok(config)
}

fn load_path(cli: &Cli) -> Result<Vec<Step>> {
    match &cli.path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading path {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing path {}", path.display()))
        }
        None => Ok(default_path()),
    }
}

/// Adds the city boundary fills the tiles must stay under
fn add_city_overlay(engine: &mut InMemoryEngine) -> Result<()> {
    engine.add_source(
        "cities",
        SourceSpec::GeoJson {
            data: FeatureCollection::new(Vec::new()),
        },
    )?;
    engine.add_layer(
        LayerSpec::new("city-fills", LayerKind::Fill, "cities")
            .with_paint("fill-color", serde_json::json!("rgba(0, 0, 0, 0.05)")),
        None,
    )?;
    Ok(())
}

fn print_stack(engine: &InMemoryEngine) {
    println!("layer stack (bottom to top):");
    for layer_id in engine.layer_ids() {
        println!("  {layer_id}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let steps = load_path(&cli)?;
    let first = steps.first().context("viewport path is empty")?.viewport()?;

    let source = BasePathSource::from_config(&config);
    let catalog = MetadataCatalog::load(&source)
        .await
        .with_context(|| format!("loading catalog from {}", source.metadata_url()))?;
    println!("catalog: {} tiles from {}", catalog.len(), source.metadata_url());

    let fetcher: Arc<dyn TileFetcher> = if source.is_remote() {
        Arc::new(HttpTileFetcher::from_config(source.clone(), &config))
    } else {
        Arc::new(FsTileFetcher::new(source.clone()))
    };

    let mut engine = InMemoryEngine::new(first);
    add_city_overlay(&mut engine)?;

    let mut neighborhoods = NeighborhoodLoader::from_config(&config);
    match StateCode::parse(&cli.state) {
        Ok(state) => {
            if let Err(err) = neighborhoods.load(&mut engine, &state).await {
                log::warn!("no neighborhood boundaries for {}: {}", state, err);
            }
        }
        Err(err) => log::warn!("{}", err),
    }
    neighborhoods.set_labels_visible(&mut engine, cli.labels);

    let manager = TileLifecycleManager::new(engine.clone(), fetcher, &config);
    let (dispatcher, handle) = ViewportDispatcher::new(manager, Arc::new(catalog), &config);
    let task = dispatcher.spawn();

    for (n, step) in steps.iter().enumerate() {
        let viewport = step.viewport()?;
        engine.set_viewport(viewport);
        handle.notify(ViewportEvent::from_engine(step.kind, &engine))?;
        if !step.settle {
            continue;
        }
        let snapshot = handle.flush().await?;
        println!(
            "step {} at ({:.3}, {:.3}) zoom {:.1}: {} loaded",
            n + 1,
            step.lat,
            step.lng,
            step.zoom,
            snapshot.loaded.len()
        );
        for id in &snapshot.loaded {
            println!("  {id}");
        }
    }

    let snapshot = handle.flush().await?;
    print_stack(&engine);
    println!("{:#?}", snapshot.stats);

    drop(handle);
    let mut manager = task.await.context("dispatcher task panicked")?;
    manager.unload_all();
    log::info!("unloaded all tiles, {} layers left", engine.layer_ids().len());
    Ok(())
}

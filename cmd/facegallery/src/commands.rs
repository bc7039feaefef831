use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use facekit_gallery::{
    GalleryConfig, GalleryRegistry, Identification, IdentityRecord, IdentityStore, Metric,
    ModelConfig,
};
use serde::Serialize;
use tracing::debug;

use crate::output::{Output, OutputFormat};
use crate::{Cli, Commands};

const APP_DIR: &str = ".facekit/facegallery";

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli)?;
    let dim = resolve_dim(cli, &config)?;
    let registry = GalleryRegistry::new(config);
    let store = registry
        .get_or_create(&cli.model, dim)
        .with_context(|| format!("open gallery {:?}", cli.model))?;

    let out = Output::new(if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Yaml
    });

    match &cli.command {
        Commands::Info => out.write(&GalleryInfo::of(&store)),
        Commands::List => {
            let mut names = store.list_names();
            names.sort();
            out.write(&names)
        }
        Commands::Show { name } => {
            let record = store
                .get_record(name)
                .ok_or_else(|| anyhow!("no identity named {name:?}"))?;
            out.write(&RecordView::from(&record))
        }
        Commands::Add { name, vector } => {
            let record = IdentityRecord::new(name.as_str(), parse_vector(vector)?);
            let stored = store.add_record(record)?;
            out.write(&RecordView::from(&stored))
        }
        Commands::ForceAdd { name, vector } => {
            let record = IdentityRecord::new(name.as_str(), parse_vector(vector)?);
            store.force_add_record(record.clone())?;
            out.write(&RecordView::from(&record))
        }
        Commands::Remove { name } => {
            if !store.remove_record(name)? {
                bail!("no identity named {name:?}");
            }
            out.write(&Removed { removed: name })
        }
        Commands::Query { vector } => {
            let id = store.find_closest_with_threshold(&parse_vector(vector)?)?;
            out.write(&QueryView::from(&id))
        }
        Commands::Import { file } => {
            let data = std::fs::read(file).with_context(|| format!("read {}", file.display()))?;
            let n = store.import_database(&data)?;
            debug!(records = n, file = %file.display(), "imported");
            out.write(&GalleryInfo::of(&store))
        }
        Commands::Export { file } => {
            let data = store.export_database()?;
            out.write_bytes(&data, file)
        }
        Commands::Clear => {
            registry.purge(&cli.model)?;
            out.write(&Removed { removed: &cli.model })
        }
    }
}

/// Loads the config file and applies command-line overrides.
pub(crate) fn resolve_config(cli: &Cli) -> anyhow::Result<GalleryConfig> {
    let app_dir = dirs::home_dir().map(|h| h.join(APP_DIR));

    let mut config = match &cli.config {
        Some(path) => GalleryConfig::load(path)?,
        None => match app_dir.as_ref().map(|d| d.join("config.yaml")) {
            Some(path) if path.exists() => GalleryConfig::load(&path)?,
            _ => GalleryConfig::default(),
        },
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if config.data_dir.is_none() {
        let dir = app_dir.ok_or_else(|| anyhow!("could not find home directory; pass --data-dir"))?;
        config.data_dir = Some(dir.join("data"));
    }

    if cli.metric.is_some() || cli.threshold.is_some() {
        let current = config.model(&cli.model).cloned();
        let metric = cli
            .metric
            .or(current.as_ref().map(|m| m.metric))
            .ok_or_else(|| {
                anyhow!("--threshold needs --metric for unconfigured model {:?}", cli.model)
            })?;
        let threshold = cli
            .threshold
            .or(current.as_ref().map(|m| m.threshold))
            .ok_or_else(|| {
                anyhow!("--metric needs --threshold for unconfigured model {:?}", cli.model)
            })?;
        config.models.insert(
            cli.model.clone(),
            ModelConfig {
                metric,
                threshold,
                dim: current.and_then(|m| m.dim),
            },
        );
    }
    Ok(config)
}

pub(crate) fn resolve_dim(cli: &Cli, config: &GalleryConfig) -> anyhow::Result<usize> {
    match (cli.dim, config.model(&cli.model).and_then(|m| m.dim)) {
        (Some(0), _) => bail!("--dim must be positive"),
        (Some(d), _) | (None, Some(d)) => Ok(d),
        (None, None) => bail!(
            "embedding length of model {:?} unknown; pass --dim or set dim in the config",
            cli.model
        ),
    }
}

/// Parses `"0.1, -2,3e-1"` into a vector.
pub(crate) fn parse_vector(s: &str) -> anyhow::Result<Vec<f32>> {
    s.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f32>()
                .with_context(|| format!("bad vector component {part:?}"))
        })
        .collect()
}

#[derive(Serialize)]
struct GalleryInfo {
    id: String,
    dim: usize,
    metric: Metric,
    threshold: f64,
    path: Option<PathBuf>,
    records: usize,
}

impl GalleryInfo {
    fn of(store: &Arc<IdentityStore>) -> Self {
        let metric = store.metric();
        Self {
            id: store.id().to_string(),
            dim: store.dim(),
            metric: metric.metric(),
            threshold: metric.threshold(),
            path: store.path().map(|p| p.to_path_buf()),
            records: store.len(),
        }
    }
}

#[derive(Serialize)]
struct RecordView<'a> {
    name: &'a str,
    weight: u32,
    vector: &'a [f32],
}

impl<'a> From<&'a IdentityRecord> for RecordView<'a> {
    fn from(r: &'a IdentityRecord) -> Self {
        Self {
            name: r.name(),
            weight: r.weight(),
            vector: r.vector(),
        }
    }
}

#[derive(Serialize)]
struct QueryView<'a> {
    name: &'a str,
    known: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    nearest: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance: Option<f64>,
}

impl<'a> From<&'a Identification> for QueryView<'a> {
    fn from(id: &'a Identification) -> Self {
        Self {
            name: id.display_name(),
            known: id.is_known(),
            nearest: id.nearest().map(|m| m.name()),
            distance: id.nearest().map(|m| m.distance),
        }
    }
}

#[derive(Serialize)]
struct Removed<'a> {
    removed: &'a str,
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use homedir::my_home;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod backfill;
mod classifier;
mod cli;
mod config;
mod geo;
mod lock;
mod recommend;
mod scoring;
mod seasonal;
mod semantic;
mod stats;
mod store;
mod taxonomy;
#[cfg(test)]
mod tests;

use classifier::FaultClassifier;
use config::Config;
use lock::DirLock;
use recommend::{RecommendRequest, RecommendService};
use semantic::EmbeddingIndexBuilder;
use stats::StatsAggregator;
use store::{BackendCsv, RepairStore};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let _span = tracing::info_span!("faultfinder", command = ?args.command).entered();

    let base_path = base_path()?;
    let config = Config::load_with(&base_path)
        .with_context(|| format!("loading config from {}", base_path.display()))?;

    match args.command {
        cli::Command::Categories { taxonomy } => {
            if taxonomy {
                let taxonomy = config.taxonomy()?;
                print_json(&taxonomy.ids().collect::<Vec<_>>())
            } else {
                let service = recommend_service(&config)?;
                print_json(&service.list_fault_categories()?)
            }
        }

        cli::Command::Diagnose { text } => {
            let classifier = FaultClassifier::new(&config.taxonomy()?)?;
            let fault_type = classifier.classify(&text);
            print_json(&serde_json::json!({ "text": text, "fault_type": fault_type }))
        }

        cli::Command::Classify {} => {
            let _lock = acquire_lock(&config)?;
            let store = BackendCsv::load(config.base_path())?;
            let classifier = FaultClassifier::new(&config.taxonomy()?)?;
            let report = backfill::classify_reviews(
                &store,
                &classifier,
                config.batch.size,
                config.batch.retry_policy(),
            )?;
            print_json(&report)
        }

        cli::Command::Aggregate {} => {
            let _lock = acquire_lock(&config)?;
            let store = BackendCsv::load(config.base_path())?;
            let taxonomy = config.taxonomy()?;
            let report = StatsAggregator::new(
                &store,
                &taxonomy,
                config.aggregation.tie_break,
                config.batch.size,
                config.batch.retry_policy(),
            )
            .run()?;
            print_json(&report)
        }

        cli::Command::Embed {} => {
            let _lock = acquire_lock(&config)?;
            let store = BackendCsv::load(config.base_path())?;
            let encoder = encoder(&config)?;
            let report = EmbeddingIndexBuilder::new(
                &store,
                encoder.as_ref(),
                config.batch.size,
                config.batch.retry_policy(),
            )
            .run()?;
            print_json(&report)
        }

        cli::Command::Recommend {
            category,
            query,
            lat,
            lon,
        } => {
            let service = recommend_service(&config)?;
            let request = RecommendRequest {
                category,
                query,
                user_lat: lat,
                user_lon: lon,
            };
            match service.recommend(&request) {
                Ok(recommendation) => print_json(&recommendation),
                Err(err) => {
                    log::error!("recommendation failed: {:?}", err);
                    bail!(err.user_message())
                }
            }
        }

        cli::Command::Seasonal { top } => {
            let store = BackendCsv::load(config.base_path())?;
            print_json(&seasonal::seasonal_tips(&store.reviews()?, top))
        }

        cli::Command::Scores { category, limit } => {
            let store = BackendCsv::load(config.base_path())?;
            let scores = scoring::composite_scores(
                &store.businesses()?,
                &store.reviews()?,
                category.as_deref(),
                Some(limit),
            );
            print_json(&scores)
        }
    }
}

/// `$FF_BASE_PATH`, or `~/.local/share/faultfinder`.
fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("FF_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }
    let home = my_home()
        .context("Could not determine home directory")?
        .context("Home directory path is empty")?;
    Ok(home.join(".local/share/faultfinder"))
}

fn acquire_lock(config: &Config) -> anyhow::Result<DirLock> {
    DirLock::acquire(config.base_path()).context("could not lock data directory")
}

fn encoder(config: &Config) -> anyhow::Result<Arc<dyn semantic::Encoder>> {
    Ok(semantic::encoder_for(
        &config.embedding.model,
        config.embedding.hash_dimensions,
        config.base_path().to_path_buf(),
    )?)
}

fn recommend_service(config: &Config) -> anyhow::Result<RecommendService> {
    let store: Arc<dyn RepairStore> = Arc::new(BackendCsv::load(config.base_path())?);
    Ok(RecommendService::new(
        store,
        encoder(config)?,
        config.recommend.similarity_k,
        config.recommend.max_results,
    ))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

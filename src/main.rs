use clap::Parser;

use log::{error, info, warn};
use std::process::ExitCode;

use sncurate::{discover_image_files, export_coco, Args, CacheStore};

fn run(args: &Args) -> sncurate::Result<()> {
    let classes = args.to_class_config()?;
    if !classes.is_identity() {
        info!(
            "Class filter: {:?}, class mapping: {:?}",
            classes.retain(),
            classes.remap()
        );
    }

    let image_files = discover_image_files(&args.dataset_dir)?;
    let store = CacheStore::for_split(&args.dataset_dir, args.cache_dir.as_deref(), &classes);
    let (artifact, from_cache) =
        store.load_or_curate(&image_files, &classes, args.workers, !args.no_cache)?;

    artifact.stats.print_summary();
    if from_cache {
        info!("Labels loaded from cache {}", store.path().display());
    }
    if !artifact.review.is_empty() {
        warn!(
            "{} boxes flagged for unit review (width or height close to 1.0)",
            artifact.review.len()
        );
    }

    if !artifact.has_labels() {
        warn!(
            "No labels found in {}; nothing to train on or export.",
            args.dataset_dir.display()
        );
        return Ok(());
    }
    let labels = artifact.require_labels(store.path())?;
    info!("{} labelled images ready for training.", labels.len());

    if let Some(coco_out) = &args.coco_out {
        export_coco(&labels, &args.class_names(), coco_out)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.dataset_dir.exists() {
        error!(
            "The specified dataset_dir does not exist: {}",
            args.dataset_dir.display()
        );
        return ExitCode::FAILURE;
    }

    info!("Starting label curation...");
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to curate labels: {}", e);
            ExitCode::FAILURE
        }
    }
}

//! The curation pass: sequences → annotation indexes → label records.

use log::{info, warn};
use rayon::prelude::*;
use std::path::PathBuf;

use crate::annotations::load_sequence_annotations;
use crate::config::ClassConfig;
use crate::error::{CurateError, Result};
use crate::normalize::{normalize_image, ImageOutcome};
use crate::sequence::{index_sequences, Sequence};
use crate::types::{CurationStats, LabelRecord, ReviewFlag};
use crate::utils::{create_progress_bar, create_worker_pool};

/// Everything one curation run produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurationResult {
    pub labels: Vec<LabelRecord>,
    pub stats: CurationStats,
    pub msgs: Vec<String>,
    pub review: Vec<ReviewFlag>,
}

impl CurationResult {
    /// Fold another partial result into this one. Counters add up, lists are
    /// concatenated.
    pub fn merge(mut self, other: Self) -> Self {
        self.labels.extend(other.labels);
        self.stats = self.stats.merge(other.stats);
        self.msgs.extend(other.msgs);
        self.review.extend(other.review);
        self
    }

    pub fn has_labels(&self) -> bool {
        !self.labels.is_empty()
    }
}

/// Curate a single sequence. Failures are reported through the counters and
/// messages of the returned value; a sequence never aborts the run.
pub fn curate_sequence(sequence: &Sequence, classes: &ClassConfig) -> CurationResult {
    let mut result = CurationResult::default();

    let Some(annotation_file) = &sequence.annotation_file else {
        result.stats.missing = sequence.images.len();
        result
            .msgs
            .push(format!("Missing JSON file for sequence {}", sequence.name));
        return result;
    };

    let annotations = match load_sequence_annotations(annotation_file) {
        Ok(annotations) => annotations,
        Err(e) => {
            result.stats.corrupt = 1;
            result
                .msgs
                .push(format!("Error processing {}: {}", sequence.name, e));
            return result;
        }
    };

    for image in &sequence.images {
        let normalized = normalize_image(image, &annotations, classes);
        match normalized.outcome {
            ImageOutcome::Labeled(record) => {
                result.stats.found += 1;
                result.labels.push(record);
            }
            ImageOutcome::Unmatched => {
                result.stats.missing += 1;
                result.stats.unmatched += 1;
            }
            ImageOutcome::Empty => result.stats.empty += 1,
        }
        result.review.extend(normalized.review);
    }

    result
}

/// Curate every sequence the given images belong to.
///
/// Sequences are parsed in parallel on a pool of `workers` threads and their
/// results reduced in sequence-name order. An empty input is a configuration
/// error; an input that yields no labels is not.
pub fn curate(
    image_files: &[PathBuf],
    classes: &ClassConfig,
    workers: usize,
) -> Result<CurationResult> {
    if image_files.is_empty() {
        return Err(CurateError::NoImages);
    }

    let sequences: Vec<Sequence> = index_sequences(image_files).into_values().collect();
    info!(
        "Curating {} images across {} sequences...",
        image_files.len(),
        sequences.len()
    );

    let pool = create_worker_pool(workers)?;
    let pb = create_progress_bar(sequences.len() as u64, "Sequences");
    let result = pool.install(|| {
        sequences
            .par_iter()
            .map(|sequence| {
                let result = curate_sequence(sequence, classes);
                pb.inc(1);
                result
            })
            .reduce(CurationResult::default, CurationResult::merge)
    });
    pb.finish_with_message("Curation complete");

    if !result.msgs.is_empty() {
        info!("{}", result.msgs.join("\n"));
    }
    if !result.review.is_empty() {
        warn!(
            "{} boxes have a width or height close to 1.0; their units may be misdetected",
            result.review.len()
        );
    }
    if !result.has_labels() {
        warn!("No labels found among {} images.", image_files.len());
    }

    let stats = &result.stats;
    info!(
        "Successfully loaded {} images with annotations, {} missing, {} empty, {} corrupt",
        stats.found, stats.missing, stats.empty, stats.corrupt
    );

    Ok(result)
}

//! Ground-truth label curation for multi-sequence video annotation corpora
//!
//! This library turns per-sequence annotation JSON files into a single,
//! normalized, class-filtered label index for object detection training, and
//! caches the result keyed by the input file set and class configuration.

pub mod annotations;
pub mod cache;
pub mod coco;
pub mod config;
pub mod curation;
pub mod error;
pub mod normalize;
pub mod sequence;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use cache::{CacheArtifact, CacheKey, CacheStore, CACHE_VERSION};
pub use config::{Args, ClassConfig};
pub use curation::{curate, CurationResult};
pub use error::{CurateError, Result};
pub use sequence::{discover_image_files, index_sequences, Sequence};
pub use types::{CurationStats, LabelRecord, LabelRow};

// COCO-specific exports
pub use coco::{export_coco, labels_to_coco, CocoFile};

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::{CurateError, Result};

/// Class names of the SoccerNet game-state corpus, indexed by category id.
pub const DEFAULT_CLASS_NAMES: &[&str] = &[
    "ball",
    "player",
    "goalkeeper",
    "referee",
    "staff",
    "other",
    "pitch",
];

/// Command-line arguments for curating sequence annotations into a label cache.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Args {
    /// Dataset split directory containing one sub-directory per sequence
    #[arg(short = 'd', long = "dataset_dir")]
    pub dataset_dir: PathBuf,

    /// Directory for the label cache (defaults to the parent of dataset_dir)
    #[arg(long = "cache_dir")]
    pub cache_dir: Option<PathBuf>,

    /// Category ids to retain; all others are dropped
    #[arg(long = "classes", value_delimiter = ',')]
    pub classes: Option<Vec<u32>>,

    /// Category remapping applied after filtering, e.g. 1:0,2:0,3:0
    #[arg(long = "class_map", value_delimiter = ',', value_parser = parse_class_pair)]
    pub class_map: Vec<(u32, u32)>,

    /// Class names, ordered by class id, used for COCO export
    #[arg(long = "names", value_delimiter = ',')]
    pub names: Vec<String>,

    /// Number of worker threads (0 uses all available cores)
    #[arg(long = "workers", default_value_t = 0)]
    pub workers: usize,

    /// Ignore any existing label cache and curate from scratch
    #[arg(long = "no_cache")]
    pub no_cache: bool,

    /// Write the curated labels as a COCO JSON file to this path
    #[arg(long = "coco_out")]
    pub coco_out: Option<PathBuf>,
}

impl Args {
    pub fn to_class_config(&self) -> Result<ClassConfig> {
        ClassConfig::new(self.classes.clone(), self.class_map.iter().copied())
    }

    /// Class names for export, falling back to the corpus defaults.
    pub fn class_names(&self) -> Vec<String> {
        if self.names.is_empty() {
            DEFAULT_CLASS_NAMES.iter().map(|name| name.to_string()).collect()
        } else {
            self.names.clone()
        }
    }
}

// Parse a `src:dst` category pair
pub fn parse_class_pair(s: &str) -> std::result::Result<(u32, u32), String> {
    let (src, dst) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SRC:DST, got '{}'", s))?;
    let src = src
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid source class '{}': {}", src, e))?;
    let dst = dst
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid target class '{}': {}", dst, e))?;
    Ok((src, dst))
}

/// Which categories survive curation and what they become.
///
/// Filtering happens first, remapping second. Both are validated once at
/// construction. Ordered collections keep the serialized form stable, which
/// the cache key relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassConfig {
    retain: Option<BTreeSet<u32>>,
    remap: BTreeMap<u32, u32>,
}

impl ClassConfig {
    pub fn new(
        retain: Option<impl IntoIterator<Item = u32>>,
        remap: impl IntoIterator<Item = (u32, u32)>,
    ) -> Result<Self> {
        let retain: Option<BTreeSet<u32>> = retain.map(|ids| ids.into_iter().collect());
        if retain.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Err(CurateError::InvalidClassConfig(
                "class filter is empty, nothing would be retained".to_string(),
            ));
        }

        let mut table = BTreeMap::new();
        for (src, dst) in remap {
            if let Some(prev) = table.insert(src, dst) {
                if prev != dst {
                    return Err(CurateError::InvalidClassConfig(format!(
                        "class {} is mapped to both {} and {}",
                        src, prev, dst
                    )));
                }
            }
        }

        if let Some(ids) = &retain {
            if let Some(src) = table.keys().find(|src| !ids.contains(*src)) {
                return Err(CurateError::InvalidClassConfig(format!(
                    "class {} is remapped but not in the class filter",
                    src
                )));
            }
        }

        Ok(Self {
            retain,
            remap: table,
        })
    }

    /// Keep every category unchanged.
    pub fn all() -> Self {
        Self::default()
    }

    /// True when neither a filter nor a remap table is configured.
    pub fn is_identity(&self) -> bool {
        self.retain.is_none() && self.remap.is_empty()
    }

    pub fn retain(&self) -> Option<&BTreeSet<u32>> {
        self.retain.as_ref()
    }

    pub fn remap(&self) -> &BTreeMap<u32, u32> {
        &self.remap
    }

    /// Apply filter then remap. `None` means the category is filtered out.
    pub fn resolve(&self, category_id: i64) -> Option<u32> {
        let category_id = u32::try_from(category_id).ok()?;
        if let Some(ids) = &self.retain {
            if !ids.contains(&category_id) {
                return None;
            }
        }
        Some(self.remap.get(&category_id).copied().unwrap_or(category_id))
    }
}

//! Grouping of frame images into sequences.
//!
//! A split directory holds one directory per recorded sequence:
//!
//! ```text
//! train/
//!   SNGS-060/
//!     SNGS-060.json
//!     img1/
//!       000001.jpg
//!       ...
//! ```

use glob::{glob, Pattern};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CurateError, Result};
use crate::types::is_image_file;

/// Name of the frame directory inside each sequence root
pub const IMAGE_DIR_NAME: &str = "img1";

/// Sequence collecting images that sit too shallow to have a sequence root.
/// It never has an annotation file, so its images count as missing.
pub const UNSEQUENCED: &str = "<unsequenced>";

/// One recording's frames and its annotation file, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub name: String,
    pub root: PathBuf,
    pub images: Vec<PathBuf>,
    pub annotation_file: Option<PathBuf>,
}

/// Conventional annotation file location: `<root>/<name>.json`
pub fn annotation_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{}.json", name))
}

/// Sequence root and name of a frame: the named directory two levels up
/// from the image file.
fn sequence_root(image: &Path) -> Option<(PathBuf, String)> {
    let root = image.parent()?.parent()?;
    let name = root.file_name()?.to_string_lossy().into_owned();
    Some((root.to_path_buf(), name))
}

/// Group image paths by sequence, keeping each sequence's images in input
/// order. The returned map iterates in sequence-name order.
///
/// Only path structure is inspected, plus one existence check per sequence
/// for the annotation file.
pub fn index_sequences(image_files: &[PathBuf]) -> BTreeMap<String, Sequence> {
    let mut sequences: BTreeMap<String, Sequence> = BTreeMap::new();

    for image in image_files {
        let Some((root, name)) = sequence_root(image) else {
            sequences
                .entry(UNSEQUENCED.to_string())
                .or_insert_with(|| Sequence {
                    name: UNSEQUENCED.to_string(),
                    root: PathBuf::new(),
                    images: Vec::new(),
                    annotation_file: None,
                })
                .images
                .push(image.clone());
            continue;
        };

        // Two splits may contain sequences with the same directory name
        let key = match sequences.get(&name) {
            Some(existing) if existing.root != root => root.display().to_string(),
            _ => name.clone(),
        };

        sequences
            .entry(key)
            .or_insert_with(|| {
                let candidate = annotation_path(&root, &name);
                Sequence {
                    annotation_file: candidate.is_file().then_some(candidate),
                    name,
                    root,
                    images: Vec::new(),
                }
            })
            .images
            .push(image.clone());
    }

    sequences
}

/// Collect the frame images of every sequence under `split_dir`.
///
/// Sequences are visited in name order and frames are sorted within each
/// sequence, so the result is stable across runs.
pub fn discover_image_files(split_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(split_dir).map_err(|e| CurateError::Io {
        path: split_dir.to_path_buf(),
        source: e,
    })?;

    let mut sequence_dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    sequence_dirs.sort();

    let mut image_files = Vec::new();
    for seq_dir in sequence_dirs {
        let img_dir = seq_dir.join(IMAGE_DIR_NAME);
        if !img_dir.is_dir() {
            continue;
        }

        let pattern = format!("{}/*", Pattern::escape(&img_dir.to_string_lossy()));
        let mut images: Vec<PathBuf> = match glob(&pattern) {
            Ok(paths) => paths
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file() && is_image_file(path))
                .collect(),
            Err(e) => {
                warn!("Invalid image pattern for {}: {}", img_dir.display(), e);
                continue;
            }
        };
        images.sort();
        image_files.extend(images);
    }

    if image_files.is_empty() {
        warn!("No images found in {}", split_dir.display());
    } else {
        info!(
            "Found {} images in {}",
            image_files.len(),
            split_dir.display()
        );
    }

    Ok(image_files)
}

//! Persisted curation results, keyed by input set and class configuration.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::ClassConfig;
use crate::curation::{curate, CurationResult};
use crate::error::{CurateError, Result};
use crate::types::{CurationStats, LabelRecord, ReviewFlag};

/// Bumped whenever the artifact layout or curation semantics change.
pub const CACHE_VERSION: &str = "1.2.0";

/// Length of the hex tag that separates artifacts of different class configurations.
const CONFIG_TAG_LEN: usize = 12;

/// SHA-256 over the total size of the files followed by their paths.
///
/// Only metadata is read, so this stays cheap for large corpora while still
/// catching added, removed, renamed or resized frames.
pub fn get_hash(paths: &[PathBuf]) -> String {
    let size: u64 = paths
        .iter()
        .filter_map(|path| fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum();

    let mut hasher = Sha256::new();
    hasher.update(size.to_string().as_bytes());
    for path in paths {
        hasher.update([0u8]);
        hasher.update(path.to_string_lossy().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Everything an artifact must agree with to be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    pub input_hash: String,
    pub classes: ClassConfig,
}

impl CacheKey {
    pub fn new(image_files: &[PathBuf], classes: &ClassConfig) -> Self {
        Self {
            input_hash: get_hash(image_files),
            classes: classes.clone(),
        }
    }
}

/// Short, stable identifier of a class configuration. `None` for the
/// identity configuration so the default artifact keeps its plain name.
pub fn config_tag(classes: &ClassConfig) -> Option<String> {
    if classes.is_identity() {
        return None;
    }
    let bytes = serde_json::to_vec(classes).unwrap_or_default();
    let digest = format!("{:x}", Sha256::digest(bytes));
    Some(digest[..CONFIG_TAG_LEN].to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheArtifact {
    pub version: String,
    pub key: CacheKey,
    pub labels: Vec<LabelRecord>,
    pub stats: CurationStats,
    pub msgs: Vec<String>,
    pub review: Vec<ReviewFlag>,
    pub total_images: usize,
}

impl CacheArtifact {
    pub fn new(key: CacheKey, result: CurationResult, total_images: usize) -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
            key,
            labels: result.labels,
            stats: result.stats,
            msgs: result.msgs,
            review: result.review,
            total_images,
        }
    }

    pub fn is_valid_for(&self, key: &CacheKey) -> bool {
        self.version == CACHE_VERSION && &self.key == key
    }

    pub fn has_labels(&self) -> bool {
        !self.labels.is_empty()
    }

    /// The label records, failing if there are none to train on. Every
    /// record holds at least one box, so a non-empty set is trainable.
    pub fn require_labels(self, path: &Path) -> Result<Vec<LabelRecord>> {
        if self.labels.is_empty() {
            return Err(CurateError::NoLabels {
                path: path.to_path_buf(),
            });
        }
        Ok(self.labels)
    }
}

/// Location of a label cache on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Cache file for a dataset split: `<dir>/<split>_labels[.<tag>].cache`,
    /// where `<dir>` defaults to the split's parent directory.
    pub fn for_split(split_dir: &Path, cache_dir: Option<&Path>, classes: &ClassConfig) -> Self {
        let split_name = split_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let dir = cache_dir
            .map(Path::to_path_buf)
            .or_else(|| split_dir.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let file_name = match config_tag(classes) {
            Some(tag) => format!("{}_labels.{}.cache", split_name, tag),
            None => format!("{}_labels.cache", split_name),
        };
        Self::new(dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CacheArtifact> {
        let file = File::open(&self.path).map_err(|e| CurateError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| CurateError::Json {
            path: self.path.clone(),
            source: e,
        })
    }

    /// The stored artifact, if there is one and it matches `key`.
    pub fn load_valid(&self, key: &CacheKey) -> Option<CacheArtifact> {
        match self.load() {
            Ok(artifact) if artifact.is_valid_for(key) => Some(artifact),
            Ok(artifact) => {
                debug!(
                    "Cache {} is stale (version {}, expected {}; key match: {})",
                    self.path.display(),
                    artifact.version,
                    CACHE_VERSION,
                    &artifact.key == key
                );
                None
            }
            Err(e) => {
                debug!("No usable cache: {}", e);
                None
            }
        }
    }

    /// Publish an artifact. It is written to a temporary file next to the
    /// target and renamed into place, so readers never see a partial file.
    pub fn save(&self, artifact: &CacheArtifact) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| CurateError::Io {
            path: parent.clone(),
            source: e,
        })?;

        let tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| CurateError::Io {
            path: parent.clone(),
            source: e,
        })?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, artifact).map_err(|e| CurateError::Json {
                path: tmp.path().to_path_buf(),
                source: e,
            })?;
            writer.flush().map_err(|e| CurateError::Io {
                path: tmp.path().to_path_buf(),
                source: e,
            })?;
        }
        tmp.as_file().sync_all().map_err(|e| CurateError::Io {
            path: tmp.path().to_path_buf(),
            source: e,
        })?;
        tmp.persist(&self.path).map_err(|e| CurateError::Cache {
            path: self.path.clone(),
            msg: e.error.to_string(),
        })?;
        Ok(())
    }

    /// Reuse the stored artifact when it matches the current input and class
    /// configuration, otherwise curate and store a fresh one.
    ///
    /// Returns the artifact and whether it came from the cache. A failure to
    /// write the cache is logged and does not fail the run.
    pub fn load_or_curate(
        &self,
        image_files: &[PathBuf],
        classes: &ClassConfig,
        workers: usize,
        use_cache: bool,
    ) -> Result<(CacheArtifact, bool)> {
        let key = CacheKey::new(image_files, classes);

        if use_cache {
            if let Some(artifact) = self.load_valid(&key) {
                let stats = &artifact.stats;
                info!(
                    "Scanning {}... {} images, {} backgrounds, {} corrupt",
                    self.path.display(),
                    stats.found,
                    stats.missing + stats.empty,
                    stats.corrupt
                );
                if !artifact.msgs.is_empty() {
                    info!("{}", artifact.msgs.join("\n"));
                }
                return Ok((artifact, true));
            }
        }

        let result = curate(image_files, classes, workers)?;
        let artifact = CacheArtifact::new(key, result, image_files.len());
        match self.save(&artifact) {
            Ok(()) => info!("New cache created: {}", self.path.display()),
            Err(e) => warn!("Cache directory is not writeable, cache not saved: {}", e),
        }
        Ok((artifact, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_depends_on_paths_and_order() {
        let a = vec![PathBuf::from("s/img1/1.jpg"), PathBuf::from("s/img1/2.jpg")];
        let b = vec![PathBuf::from("s/img1/2.jpg"), PathBuf::from("s/img1/1.jpg")];
        let c = vec![PathBuf::from("s/img1/1.jpgs/img1/2.jpg")];
        assert_eq!(get_hash(&a), get_hash(&a.clone()));
        assert_ne!(get_hash(&a), get_hash(&b));
        assert_ne!(get_hash(&a), get_hash(&c));
        assert_eq!(get_hash(&a).len(), 64);
    }

    #[test]
    fn test_hash_tracks_file_size() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("000001.jpg");
        fs::write(&path, b"abc").unwrap();
        let before = get_hash(&[path.clone()]);
        fs::write(&path, b"abcdef").unwrap();
        assert_ne!(before, get_hash(&[path]));
    }

    #[test]
    fn test_cache_path_is_tagged_by_class_config() {
        let split = Path::new("/data/soccernet/train");
        let plain = CacheStore::for_split(split, None, &ClassConfig::all());
        assert_eq!(plain.path(), Path::new("/data/soccernet/train_labels.cache"));

        let ball = ClassConfig::new(Some([0]), Vec::<(u32, u32)>::new()).unwrap();
        let people = ClassConfig::new(Some([1, 2, 3]), [(1, 0), (2, 0), (3, 0)]).unwrap();
        let ball_store = CacheStore::for_split(split, None, &ball);
        let people_store = CacheStore::for_split(split, Some(Path::new("/tmp/c")), &people);

        assert_ne!(ball_store.path(), plain.path());
        assert_ne!(ball_store.path(), people_store.path());
        assert!(people_store.path().starts_with("/tmp/c"));
        assert_eq!(config_tag(&ball), config_tag(&ball.clone()));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(temp_dir.path().join("nested/train_labels.cache"));
        let key = CacheKey::new(&[PathBuf::from("a.jpg")], &ClassConfig::all());
        let mut result = CurationResult::default();
        result.stats.missing = 1;
        result.msgs.push("Missing JSON file for sequence x".to_string());
        let artifact = CacheArtifact::new(key.clone(), result, 1);

        store.save(&artifact).unwrap();
        assert_eq!(store.load().unwrap(), artifact);
        assert!(store.load_valid(&key).is_some());

        // No temporary files are left next to the artifact
        let entries = fs::read_dir(temp_dir.path().join("nested")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_mismatched_key_or_version_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(temp_dir.path().join("train_labels.cache"));
        let key = CacheKey::new(&[PathBuf::from("a.jpg")], &ClassConfig::all());
        let mut artifact = CacheArtifact::new(key.clone(), CurationResult::default(), 1);
        store.save(&artifact).unwrap();

        let other_input = CacheKey::new(&[PathBuf::from("b.jpg")], &ClassConfig::all());
        let ball = ClassConfig::new(Some([0]), Vec::<(u32, u32)>::new()).unwrap();
        let other_classes = CacheKey::new(&[PathBuf::from("a.jpg")], &ball);
        assert!(store.load_valid(&other_input).is_none());
        assert!(store.load_valid(&other_classes).is_none());

        artifact.version = "0.0.1".to_string();
        store.save(&artifact).unwrap();
        assert!(store.load_valid(&key).is_none());
    }

    #[test]
    fn test_artifact_with_empty_record_is_not_reused() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(temp_dir.path().join("train_labels.cache"));
        let key = CacheKey::new(&[PathBuf::from("a.jpg")], &ClassConfig::all());
        let mut json = serde_json::to_value(CacheArtifact::new(
            key.clone(),
            CurationResult::default(),
            1,
        ))
        .unwrap();
        json["labels"] = serde_json::json!([{
            "im_file": "a.jpg",
            "shape": [1080, 1920],
            "cls": [],
            "bboxes": [],
            "normalized": true,
            "bbox_format": "xywh"
        }]);
        fs::write(store.path(), serde_json::to_vec(&json).unwrap()).unwrap();

        assert!(matches!(store.load(), Err(CurateError::Json { .. })));
        assert!(store.load_valid(&key).is_none());
    }

    #[test]
    fn test_truncated_artifact_is_not_reused() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(temp_dir.path().join("train_labels.cache"));
        let key = CacheKey::new(&[PathBuf::from("a.jpg")], &ClassConfig::all());
        let artifact = CacheArtifact::new(key.clone(), CurationResult::default(), 1);
        let full = serde_json::to_string(&artifact).unwrap();
        fs::write(store.path(), &full[..full.len() / 2]).unwrap();

        assert!(store.load_valid(&key).is_none());
    }

    #[test]
    fn test_require_labels() {
        let key = CacheKey::new(&[PathBuf::from("a.jpg")], &ClassConfig::all());
        let artifact = CacheArtifact::new(key, CurationResult::default(), 1);
        assert!(!artifact.has_labels());
        assert!(matches!(
            artifact.require_labels(Path::new("train_labels.cache")),
            Err(CurateError::NoLabels { .. })
        ));
    }
}

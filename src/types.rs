use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// Supported image formats
pub const IMG_FORMATS: &[&str] = &[
    "bmp", "dng", "jpeg", "jpg", "mpo", "png", "tif", "tiff", "webp", "pfm",
];

// Precomputed HashSet of image extensions for fast lookup
pub static IMAGE_EXTENSIONS_SET: OnceLock<HashSet<String>> = OnceLock::new();

/// Get the image extensions set
pub fn get_image_extensions_set() -> &'static HashSet<String> {
    IMAGE_EXTENSIONS_SET.get_or_init(|| IMG_FORMATS.iter().map(|ext| ext.to_lowercase()).collect())
}

/// Returns true if the path carries one of the supported image extensions.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| get_image_extensions_set().contains(&ext.to_lowercase()))
}

/// Image identifier as found in the annotation file. Corpora use either
/// integers or strings, sometimes both across sequences.
///
/// Integral floats (`1.0`) are read as the integer they spell so that
/// `images` and `annotations` written by different tools still match; any
/// other float is kept by its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged, from = "RawImageId")]
pub enum ImageId {
    Int(i64),
    Str(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawImageId {
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<RawImageId> for ImageId {
    fn from(raw: RawImageId) -> Self {
        match raw {
            RawImageId::Int(id) => ImageId::Int(id),
            RawImageId::Float(id)
                if id.fract() == 0.0 && id >= i64::MIN as f64 && id < i64::MAX as f64 =>
            {
                ImageId::Int(id as i64)
            }
            RawImageId::Float(id) => ImageId::Str(id.to_string()),
            RawImageId::Str(id) => ImageId::Str(id),
        }
    }
}

// One entry of the `images` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMeta {
    pub image_id: ImageId,
    pub file_name: String,
    pub height: u32,
    pub width: u32,
}

/// Box fields of an annotation. Which of them are meaningful depends on the
/// encoding: normalized boxes use `x_center`/`y_center`, pixel boxes use the
/// top-left `x`/`y`. `w` and `h` are shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BboxImage {
    pub x_center: f64,
    pub y_center: f64,
    pub w: f64,
    pub h: f64,
    pub x: f64,
    pub y: f64,
}

// One entry of the `annotations` collection. `category_id` is kept as read;
// ids that cannot be a class (negative, too large) are discarded when the
// class configuration resolves them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAnnotation {
    pub image_id: ImageId,
    pub category_id: i64,
    #[serde(default)]
    pub bbox_image: Option<BboxImage>,
}

/// Top-level layout of a per-sequence annotation file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationFile {
    pub images: Vec<ImageMeta>,
    pub annotations: Vec<RawAnnotation>,
}

/// Geometry convention of the boxes stored in a [`LabelRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BboxFormat {
    /// Center x, center y, width, height.
    Xywh,
}

/// A single training-ready box: class id and center/size geometry as
/// fractions of the image dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelRow {
    pub class_id: u32,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl LabelRow {
    pub fn bbox(&self) -> [f64; 4] {
        [self.x_center, self.y_center, self.width, self.height]
    }
}

/// All retained boxes of one image.
///
/// `cls` and `bboxes` always have the same, non-zero length; records are
/// built with [`LabelRecord::from_rows`], and reading one back from a cache
/// rejects anything that breaks this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredLabelRecord")]
pub struct LabelRecord {
    im_file: PathBuf,
    /// (height, width) in pixels
    shape: (u32, u32),
    cls: Vec<u32>,
    bboxes: Vec<[f64; 4]>,
    normalized: bool,
    bbox_format: BboxFormat,
}

// Unchecked on-disk layout of a `LabelRecord`
#[derive(Deserialize)]
struct StoredLabelRecord {
    im_file: PathBuf,
    shape: (u32, u32),
    cls: Vec<u32>,
    bboxes: Vec<[f64; 4]>,
    normalized: bool,
    bbox_format: BboxFormat,
}

impl TryFrom<StoredLabelRecord> for LabelRecord {
    type Error = String;

    fn try_from(stored: StoredLabelRecord) -> std::result::Result<Self, Self::Error> {
        if stored.cls.is_empty() {
            return Err(format!("label record for {} has no boxes", stored.im_file.display()));
        }
        if stored.cls.len() != stored.bboxes.len() {
            return Err(format!(
                "label record for {} has {} classes but {} boxes",
                stored.im_file.display(),
                stored.cls.len(),
                stored.bboxes.len()
            ));
        }
        Ok(Self {
            im_file: stored.im_file,
            shape: stored.shape,
            cls: stored.cls,
            bboxes: stored.bboxes,
            normalized: stored.normalized,
            bbox_format: stored.bbox_format,
        })
    }
}

impl LabelRecord {
    /// Build a record from normalized rows. Returns `None` for an empty row set,
    /// since an image without objects is not a detection sample.
    pub fn from_rows(im_file: PathBuf, height: u32, width: u32, rows: &[LabelRow]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        Some(Self {
            im_file,
            shape: (height, width),
            cls: rows.iter().map(|row| row.class_id).collect(),
            bboxes: rows.iter().map(LabelRow::bbox).collect(),
            normalized: true,
            bbox_format: BboxFormat::Xywh,
        })
    }

    pub fn im_file(&self) -> &Path {
        &self.im_file
    }

    pub fn shape(&self) -> (u32, u32) {
        self.shape
    }

    pub fn cls(&self) -> &[u32] {
        &self.cls
    }

    pub fn bboxes(&self) -> &[[f64; 4]] {
        &self.bboxes
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn bbox_format(&self) -> BboxFormat {
        self.bbox_format
    }

    pub fn rows(&self) -> impl Iterator<Item = LabelRow> + '_ {
        self.cls
            .iter()
            .zip(&self.bboxes)
            .map(|(&class_id, &[x_center, y_center, width, height])| LabelRow {
                class_id,
                x_center,
                y_center,
                width,
                height,
            })
    }
}

/// A box whose raw width or height sits just below 1.0, where the
/// pixel-vs-normalized heuristic cannot tell a normalized box from a
/// one-pixel one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub image: PathBuf,
    pub category_id: i64,
    pub width: f64,
    pub height: f64,
}

// Counters accumulated over a curation run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurationStats {
    /// Images that produced a label record
    pub found: usize,
    /// Images without an annotation source (no JSON, or not listed in the JSON)
    pub missing: usize,
    /// Subset of `missing`: image not listed in an otherwise valid JSON
    pub unmatched: usize,
    /// Images listed in the JSON but with no retained objects
    pub empty: usize,
    /// Sequences whose annotation file could not be read or parsed
    pub corrupt: usize,
}

impl CurationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine two partial counts. Order-independent, so it can be used as a
    /// parallel reduction.
    pub fn merge(self, other: Self) -> Self {
        Self {
            found: self.found + other.found,
            missing: self.missing + other.missing,
            unmatched: self.unmatched + other.unmatched,
            empty: self.empty + other.empty,
            corrupt: self.corrupt + other.corrupt,
        }
    }

    pub fn print_summary(&self) {
        log::info!("=== Curation Summary ===");
        log::info!("Images with labels: {}", self.found);
        log::info!(
            "Missing annotation source: {} (not listed in sequence JSON: {})",
            self.missing,
            self.unmatched
        );
        log::info!("Empty (no retained objects): {}", self.empty);
        log::info!("Corrupt sequences: {}", self.corrupt);

        if self.found == 0 {
            log::warn!("No labels found. Training on this dataset will not work.");
        }
    }
}

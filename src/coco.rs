//! COCO format export of curated labels
//!
//! Curated records hold normalized center/size boxes; COCO wants absolute
//! top-left/size boxes in pixels. Category ids are kept as curated (after
//! filtering and remapping) so the export lines up with the label cache.

use chrono::Datelike;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::cache::CACHE_VERSION;
use crate::error::{CurateError, Result};
use crate::types::LabelRecord;

/// COCO dataset information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    pub year: u32,
    pub version: String,
    pub description: String,
    pub contributor: String,
    pub url: String,
    pub date_created: String,
}

impl Default for Info {
    fn default() -> Self {
        let now = chrono::Utc::now();
        Self {
            year: now.year() as u32,
            version: CACHE_VERSION.to_string(),
            description: "SoccerNet converted to COCO".to_string(),
            contributor: "sncurate".to_string(),
            url: String::new(),
            date_created: now.to_rfc3339(),
        }
    }
}

/// COCO category information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: u32,
    pub name: String,
    pub supercategory: String,
}

/// COCO image information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: u32,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// COCO annotation information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u32,
    pub image_id: u32,
    pub category_id: u32,
    pub bbox: [f64; 4], // [x, y, width, height]
    pub area: f64,
    pub iscrowd: u32,
    pub segmentation: Vec<Vec<f64>>,
}

/// Complete COCO dataset structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoFile {
    pub info: Info,
    pub licenses: Vec<serde_json::Value>,
    pub categories: Vec<Category>,
    pub images: Vec<Image>,
    pub annotations: Vec<Annotation>,
}

/// Convert a normalized center/size box to absolute `[x, y, w, h]` pixels.
pub fn to_absolute_bbox(
    [x_center, y_center, width, height]: [f64; 4],
    image_width: u32,
    image_height: u32,
) -> [f64; 4] {
    let (img_w, img_h) = (image_width as f64, image_height as f64);
    [
        (x_center - width / 2.0) * img_w,
        (y_center - height / 2.0) * img_h,
        width * img_w,
        height * img_h,
    ]
}

/// Categories for every named class, plus any class id that occurs in the
/// labels without a name.
fn build_categories(labels: &[LabelRecord], class_names: &[String]) -> Vec<Category> {
    let mut ids: BTreeSet<u32> = (0..class_names.len() as u32).collect();
    ids.extend(labels.iter().flat_map(|record| record.cls().iter().copied()));

    ids.into_iter()
        .map(|id| Category {
            id,
            name: class_names
                .get(id as usize)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", id)),
            supercategory: "object".to_string(),
        })
        .collect()
}

/// Build a COCO dataset from curated records. Image and annotation ids are
/// assigned sequentially from 1 in record order.
pub fn labels_to_coco(labels: &[LabelRecord], class_names: &[String]) -> CocoFile {
    let mut images = Vec::with_capacity(labels.len());
    let mut annotations = Vec::new();
    let mut ann_id = 1;

    for (image_id, record) in (1u32..).zip(labels) {
        let (height, width) = record.shape();
        images.push(Image {
            id: image_id,
            file_name: record
                .im_file()
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            width,
            height,
        });

        for row in record.rows() {
            let bbox = to_absolute_bbox(row.bbox(), width, height);
            annotations.push(Annotation {
                id: ann_id,
                image_id,
                category_id: row.class_id,
                bbox,
                area: bbox[2] * bbox[3],
                iscrowd: 0,
                segmentation: Vec::new(),
            });
            ann_id += 1;
        }
    }

    CocoFile {
        info: Info::default(),
        licenses: Vec::new(),
        categories: build_categories(labels, class_names),
        images,
        annotations,
    }
}

/// Write curated labels as a COCO JSON file, replacing `save_path` atomically.
pub fn export_coco(
    labels: &[LabelRecord],
    class_names: &[String],
    save_path: &Path,
) -> Result<CocoFile> {
    let coco = labels_to_coco(labels, class_names);

    let parent = match save_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
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
        serde_json::to_writer(&mut writer, &coco).map_err(|e| CurateError::Json {
            path: save_path.to_path_buf(),
            source: e,
        })?;
        writer.flush().map_err(|e| CurateError::Io {
            path: save_path.to_path_buf(),
            source: e,
        })?;
    }
    tmp.persist(save_path).map_err(|e| CurateError::Io {
        path: save_path.to_path_buf(),
        source: e.error,
    })?;

    info!(
        "Saved COCO annotations to {} ({} images, {} annotations)",
        save_path.display(),
        coco.images.len(),
        coco.annotations.len()
    );
    Ok(coco)
}

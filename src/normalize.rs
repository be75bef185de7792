//! Conversion of raw annotation boxes into normalized center/size rows.

use std::path::Path;

use crate::annotations::SequenceAnnotations;
use crate::config::ClassConfig;
use crate::types::{BboxImage, LabelRecord, LabelRow, ReviewFlag};

/// Raw widths/heights above this (and at most 1.0) are treated as normalized
/// but flagged, since a 1-pixel box looks the same.
pub const AMBIGUOUS_UNIT_THRESHOLD: f64 = 0.98;

/// Unit system of a raw box, inferred from its size fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxUnits {
    /// Fractions of the image, center/size
    Normalized,
    /// Pixels, top-left corner plus width/height
    Pixel,
}

/// Anything wider or taller than 1 cannot be a fraction of the image.
pub fn detect_units(bbox: &BboxImage) -> BoxUnits {
    if bbox.w > 1.0 || bbox.h > 1.0 {
        BoxUnits::Pixel
    } else {
        BoxUnits::Normalized
    }
}

/// Normalized box whose size is close enough to 1.0 that the unit heuristic
/// may have guessed wrong.
pub fn is_ambiguous(bbox: &BboxImage) -> bool {
    detect_units(bbox) == BoxUnits::Normalized
        && (bbox.w > AMBIGUOUS_UNIT_THRESHOLD || bbox.h > AMBIGUOUS_UNIT_THRESHOLD)
}

/// Convert a raw box to `[x_center, y_center, width, height]` in image
/// fractions. Returns `None` for degenerate geometry.
pub fn normalize_bbox(bbox: &BboxImage, image_width: u32, image_height: u32) -> Option<[f64; 4]> {
    let xywh = match detect_units(bbox) {
        BoxUnits::Normalized => [bbox.x_center, bbox.y_center, bbox.w, bbox.h],
        BoxUnits::Pixel => {
            if image_width == 0 || image_height == 0 {
                return None;
            }
            let (img_w, img_h) = (image_width as f64, image_height as f64);
            [
                (bbox.x + bbox.w / 2.0) / img_w,
                (bbox.y + bbox.h / 2.0) / img_h,
                bbox.w / img_w,
                bbox.h / img_h,
            ]
        }
    };

    if xywh.iter().any(|v| !v.is_finite()) || xywh[2] <= 0.0 || xywh[3] <= 0.0 {
        return None;
    }
    clip_to_unit(xywh)
}

/// Clip a center/size box to the image. Boxes already inside are returned
/// untouched so that in-range values are not perturbed by re-derivation.
fn clip_to_unit([x_center, y_center, width, height]: [f64; 4]) -> Option<[f64; 4]> {
    let (x1, y1) = (x_center - width / 2.0, y_center - height / 2.0);
    let (x2, y2) = (x_center + width / 2.0, y_center + height / 2.0);
    if x1 >= 0.0 && y1 >= 0.0 && x2 <= 1.0 && y2 <= 1.0 {
        return Some([x_center, y_center, width, height]);
    }

    let (x1, y1) = (x1.clamp(0.0, 1.0), y1.clamp(0.0, 1.0));
    let (x2, y2) = (x2.clamp(0.0, 1.0), y2.clamp(0.0, 1.0));
    let (width, height) = (x2 - x1, y2 - y1);
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some([(x1 + x2) / 2.0, (y1 + y2) / 2.0, width, height])
}

/// What became of one image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Labeled(LabelRecord),
    /// Not listed in the sequence's `images`
    Unmatched,
    /// Listed, but no object survived filtering and geometry checks
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pub outcome: ImageOutcome,
    pub review: Vec<ReviewFlag>,
}

/// Build the label record for one image of a sequence.
pub fn normalize_image(
    image_path: &Path,
    annotations: &SequenceAnnotations,
    classes: &ClassConfig,
) -> NormalizedImage {
    let file_name = image_path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();

    let Some(meta) = annotations.image_by_file_name(&file_name) else {
        return NormalizedImage {
            outcome: ImageOutcome::Unmatched,
            review: Vec::new(),
        };
    };

    let mut rows = Vec::new();
    let mut review = Vec::new();
    for annotation in annotations.annotations_for(&meta.image_id) {
        let Some(class_id) = classes.resolve(annotation.category_id) else {
            continue;
        };
        let Some(bbox) = &annotation.bbox_image else {
            continue;
        };
        let Some([x_center, y_center, width, height]) =
            normalize_bbox(bbox, meta.width, meta.height)
        else {
            continue;
        };

        if is_ambiguous(bbox) {
            review.push(ReviewFlag {
                image: image_path.to_path_buf(),
                category_id: annotation.category_id,
                width: bbox.w,
                height: bbox.h,
            });
        }

        rows.push(LabelRow {
            class_id,
            x_center,
            y_center,
            width,
            height,
        });
    }

    let outcome = match LabelRecord::from_rows(image_path.to_path_buf(), meta.height, meta.width, &rows)
    {
        Some(record) => ImageOutcome::Labeled(record),
        None => ImageOutcome::Empty,
    };
    NormalizedImage { outcome, review }
}

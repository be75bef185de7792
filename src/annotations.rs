use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{CurateError, Result};
use crate::types::{AnnotationFile, ImageId, ImageMeta, RawAnnotation};

/// In-memory indexes over one sequence's annotation file.
#[derive(Debug, Default)]
pub struct SequenceAnnotations {
    images: Vec<ImageMeta>,
    by_file_name: HashMap<String, usize>,
    by_image_id: HashMap<ImageId, Vec<RawAnnotation>>,
}

impl SequenceAnnotations {
    pub fn new(file: AnnotationFile) -> Self {
        let mut by_file_name = HashMap::with_capacity(file.images.len());
        for (idx, image) in file.images.iter().enumerate() {
            // First listing wins when a file name is repeated
            by_file_name.entry(image.file_name.clone()).or_insert(idx);
        }

        let mut by_image_id: HashMap<ImageId, Vec<RawAnnotation>> = HashMap::new();
        for annotation in file.annotations {
            by_image_id
                .entry(annotation.image_id.clone())
                .or_default()
                .push(annotation);
        }

        Self {
            images: file.images,
            by_file_name,
            by_image_id,
        }
    }

    /// Image metadata matched by bare file name, not by path.
    pub fn image_by_file_name(&self, file_name: &str) -> Option<&ImageMeta> {
        self.by_file_name
            .get(file_name)
            .map(|&idx| &self.images[idx])
    }

    /// Annotations attached to an image id, empty if there are none.
    pub fn annotations_for(&self, image_id: &ImageId) -> &[RawAnnotation] {
        self.by_image_id
            .get(image_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// Read and parse a sequence annotation file, streaming from disk.
pub fn load_sequence_annotations(path: &Path) -> Result<SequenceAnnotations> {
    let file = File::open(path).map_err(|e| CurateError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let parsed: AnnotationFile =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| CurateError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(SequenceAnnotations::new(parsed))
}

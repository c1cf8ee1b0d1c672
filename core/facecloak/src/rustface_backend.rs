use std::path::Path;

use image::GrayImage;

use crate::detector::ObjectDetector;
use crate::error::CloakError;
use crate::geometry::BoundingBox;

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// SeetaFace scores each window instead of voting, so `min_neighbors` is
/// ignored and a fixed score threshold applies. Only suitable for faces; pair
/// it with a Haar eye cascade in [`crate::ZoneLocator::new`].
pub struct RustfaceDetector {
    model: rustface::Model,
    score_threshold: f64,
}

impl RustfaceDetector {
    /// Load a SeetaFace model such as `seeta_fd_frontal_v1.0.bin`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CloakError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| CloakError::CascadeLoad(format!("{}: {e}", path.display())))?;
        Self::from_bytes(&data)
    }

    /// Load a SeetaFace model from memory.
    pub fn from_bytes(model_data: &[u8]) -> Result<Self, CloakError> {
        let model = rustface::read_model(std::io::Cursor::new(model_data))
            .map_err(|e| CloakError::CascadeLoad(format!("SeetaFace model: {e}")))?;
        Ok(Self {
            model,
            score_threshold: 2.0,
        })
    }

    /// Minimum classifier score for a face (default: 2.0).
    pub fn score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = threshold;
        self
    }
}

impl ObjectDetector for RustfaceDetector {
    fn detect(&self, luma: &GrayImage, min_side: u32, _min_neighbors: u32) -> Vec<BoundingBox> {
        // rustface rejects minimum sizes below 20px.
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(min_side.max(20));
        detector.set_score_thresh(self.score_threshold);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let image = rustface::ImageData::new(luma.as_raw(), luma.width(), luma.height());
        let faces = detector.detect(&image);
        tracing::trace!(faces = faces.len(), "seetaface scan finished");

        faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                BoundingBox::from_signed(
                    bbox.x() as i64,
                    bbox.y() as i64,
                    bbox.width() as i64,
                    bbox.height() as i64,
                )
            })
            .collect()
    }
}

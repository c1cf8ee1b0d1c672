use image::GrayImage;

use crate::geometry::BoundingBox;

/// Pluggable object detection backend, used for both faces and eyes.
///
/// Implement this trait to bind any detector library (Haar cascades, SeetaFace,
/// ONNX models) and pass it to [`crate::ZoneLocator::new`]. Implementations must
/// not mutate shared state in `detect`, so a single instance can serve
/// concurrent requests.
pub trait ObjectDetector: Send + Sync {
    /// Detect objects in a luminance image.
    ///
    /// `min_side` is the smallest box side, in pixels, worth reporting.
    /// `min_neighbors` is the number of overlapping raw hits a detection needs
    /// before it is accepted; backends without a vote step may ignore it.
    /// Returned boxes are in the coordinate space of `luma`. No ordering is
    /// guaranteed.
    fn detect(&self, luma: &GrayImage, min_side: u32, min_neighbors: u32) -> Vec<BoundingBox>;
}

impl<T: ObjectDetector + ?Sized> ObjectDetector for Box<T> {
    fn detect(&self, luma: &GrayImage, min_side: u32, min_neighbors: u32) -> Vec<BoundingBox> {
        (**self).detect(luma, min_side, min_neighbors)
    }
}

impl<T: ObjectDetector + ?Sized> ObjectDetector for std::sync::Arc<T> {
    fn detect(&self, luma: &GrayImage, min_side: u32, min_neighbors: u32) -> Vec<BoundingBox> {
        (**self).detect(luma, min_side, min_neighbors)
    }
}

use std::path::Path;

use image::{GrayImage, RgbImage};
use serde::Serialize;

use crate::cascade::HaarCascade;
use crate::detector::ObjectDetector;
use crate::error::CloakError;
use crate::geometry::{nose_bridge, BoundingBox};

/// Which facial feature a zone covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    /// An eye, as reported by the eye detector.
    Eye,
    /// The estimated nose-bridge region.
    NoseBridge,
}

/// A region selected for perturbation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Zone {
    /// Feature covered by the zone.
    pub kind: ZoneKind,
    /// Region in image coordinates.
    pub bbox: BoundingBox,
}

/// A detected face with its sub-zones, all in image coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Face {
    /// Face bounding box.
    pub bbox: BoundingBox,
    /// Eye boxes found inside the face, in detector order.
    pub eyes: Vec<BoundingBox>,
    /// Nose-bridge box derived from the face box.
    pub nose_bridge: BoundingBox,
}

/// Detector thresholds used by [`ZoneLocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatorSettings {
    /// Smallest face side in pixels (default: 30).
    pub face_min_side: u32,
    /// Neighbor votes a face needs (default: 5).
    pub face_min_neighbors: u32,
    /// Smallest eye side in pixels (default: 15).
    pub eye_min_side: u32,
    /// Neighbor votes an eye needs (default: 10). Higher than for faces to
    /// suppress false eyes in textured skin and hair.
    pub eye_min_neighbors: u32,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            face_min_side: 30,
            face_min_neighbors: 5,
            eye_min_side: 15,
            eye_min_neighbors: 10,
        }
    }
}

/// Finds faces and derives the zones to perturb inside each of them.
///
/// Detectors are never mutated after construction, so one locator can be
/// shared across threads.
pub struct ZoneLocator {
    face_detector: Box<dyn ObjectDetector>,
    eye_detector: Box<dyn ObjectDetector>,
    settings: LocatorSettings,
}

impl ZoneLocator {
    /// Create a locator from a face detector and an eye detector.
    pub fn new(
        face_detector: impl ObjectDetector + 'static,
        eye_detector: impl ObjectDetector + 'static,
    ) -> Self {
        Self {
            face_detector: Box::new(face_detector),
            eye_detector: Box::new(eye_detector),
            settings: LocatorSettings::default(),
        }
    }

    /// Create a locator from two OpenCV Haar cascade files, e.g.
    /// `haarcascade_frontalface_default.xml` and `haarcascade_eye.xml`.
    pub fn from_cascade_files(
        face_cascade: impl AsRef<Path>,
        eye_cascade: impl AsRef<Path>,
    ) -> Result<Self, CloakError> {
        let face = HaarCascade::from_path(face_cascade)?;
        let eye = HaarCascade::from_path(eye_cascade)?;
        Ok(Self::new(face, eye))
    }

    /// Override the detector thresholds.
    pub fn with_settings(mut self, settings: LocatorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current detector thresholds.
    pub fn settings(&self) -> &LocatorSettings {
        &self.settings
    }

    /// Locate every face in a color image.
    pub fn locate(&self, image: &RgbImage) -> Vec<Face> {
        let luma = image::imageops::grayscale(image);
        self.locate_luma(&luma)
    }

    /// Locate every face in a luminance image.
    ///
    /// Returns an empty list when nothing is found.
    pub fn locate_luma(&self, luma: &GrayImage) -> Vec<Face> {
        let (width, height) = luma.dimensions();
        let s = &self.settings;

        self.face_detector
            .detect(luma, s.face_min_side, s.face_min_neighbors)
            .into_iter()
            .filter_map(|raw| raw.clamp_to(width, height))
            .filter(|bbox| bbox.width >= s.face_min_side && bbox.height >= s.face_min_side)
            .map(|bbox| Face {
                bbox,
                eyes: self.locate_eyes(luma, &bbox),
                nose_bridge: nose_bridge(&bbox),
            })
            .collect()
    }

    fn locate_eyes(&self, luma: &GrayImage, face: &BoundingBox) -> Vec<BoundingBox> {
        let s = &self.settings;
        let crop =
            image::imageops::crop_imm(luma, face.x, face.y, face.width, face.height).to_image();

        self.eye_detector
            .detect(&crop, s.eye_min_side, s.eye_min_neighbors)
            .into_iter()
            .filter_map(|raw| raw.clamp_to(face.width, face.height))
            .filter(|eye| eye.width >= s.eye_min_side && eye.height >= s.eye_min_side)
            .map(|eye| eye.translate(face.x, face.y))
            .collect()
    }
}

/// Zones of one face in perturbation order: eyes first, then the nose-bridge.
pub fn zones_for(face: &Face) -> Vec<Zone> {
    face.eyes
        .iter()
        .map(|&bbox| Zone {
            kind: ZoneKind::Eye,
            bbox,
        })
        .chain(std::iter::once(Zone {
            kind: ZoneKind::NoseBridge,
            bbox: face.nose_bridge,
        }))
        .collect()
}

/// Zones of all faces, face by face.
pub fn flatten_zones(faces: &[Face]) -> Vec<Zone> {
    faces.iter().flat_map(zones_for).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns the same boxes for any input and records the thresholds it saw.
    struct FixedDetector {
        boxes: Vec<BoundingBox>,
        calls: Mutex<Vec<(u32, u32, u32, u32)>>,
    }

    impl FixedDetector {
        fn new(boxes: Vec<BoundingBox>) -> Self {
            Self {
                boxes,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ObjectDetector for FixedDetector {
        fn detect(&self, luma: &GrayImage, min_side: u32, min_neighbors: u32) -> Vec<BoundingBox> {
            self.calls
                .lock()
                .unwrap()
                .push((luma.width(), luma.height(), min_side, min_neighbors));
            self.boxes.clone()
        }
    }

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb([128, 128, 128]))
    }

    #[test]
    fn eyes_are_translated_into_image_space() {
        let faces = FixedDetector::new(vec![BoundingBox::new(40, 50, 100, 100)]);
        let eyes = FixedDetector::new(vec![
            BoundingBox::new(20, 25, 20, 20),
            BoundingBox::new(60, 25, 20, 20),
        ]);
        let located = ZoneLocator::new(faces, eyes).locate(&blank(200, 200));

        assert_eq!(located.len(), 1);
        assert_eq!(
            located[0].eyes,
            vec![BoundingBox::new(60, 75, 20, 20), BoundingBox::new(100, 75, 20, 20)]
        );
        assert_eq!(located[0].nose_bridge, BoundingBox::new(75, 80, 30, 30));
    }

    #[test]
    fn detectors_receive_configured_thresholds() {
        let faces = std::sync::Arc::new(FixedDetector::new(vec![BoundingBox::new(0, 0, 60, 80)]));
        let eyes = std::sync::Arc::new(FixedDetector::new(vec![]));
        let locator = ZoneLocator::new(faces.clone(), eyes.clone());
        locator.locate(&blank(100, 100));

        assert_eq!(*faces.calls.lock().unwrap(), vec![(100, 100, 30, 5)]);
        // The eye detector only sees the face crop.
        assert_eq!(*eyes.calls.lock().unwrap(), vec![(60, 80, 15, 10)]);
    }

    #[test]
    fn no_faces_yields_empty_list() {
        let locator = ZoneLocator::new(FixedDetector::new(vec![]), FixedDetector::new(vec![]));
        assert!(locator.locate(&blank(64, 64)).is_empty());
    }

    #[test]
    fn undersized_and_offscreen_faces_are_dropped() {
        let faces = FixedDetector::new(vec![
            BoundingBox::new(0, 0, 20, 20),
            BoundingBox::new(500, 500, 40, 40),
            BoundingBox::new(80, 80, 60, 60),
        ]);
        let located = ZoneLocator::new(faces, FixedDetector::new(vec![])).locate(&blank(100, 100));
        // The third clamps to 20x20 at the image edge, below the minimum side.
        assert_eq!(located.len(), 0);

        let faces = FixedDetector::new(vec![BoundingBox::new(60, 60, 60, 60)]);
        let located = ZoneLocator::new(faces, FixedDetector::new(vec![])).locate(&blank(100, 100));
        assert_eq!(located.len(), 1);
        assert_eq!(located[0].bbox, BoundingBox::new(60, 60, 40, 40));
    }

    #[test]
    fn eye_boxes_are_clamped_to_face() {
        let faces = FixedDetector::new(vec![BoundingBox::new(10, 10, 50, 50)]);
        let eyes = FixedDetector::new(vec![
            BoundingBox::new(40, 5, 20, 20),
            BoundingBox::new(2, 2, 10, 10),
        ]);
        let located = ZoneLocator::new(faces, eyes).locate(&blank(100, 100));
        // The first is clipped to 10px wide and then rejected; the second is too small.
        assert!(located[0].eyes.is_empty());
    }

    #[test]
    fn custom_settings_are_used() {
        let faces = std::sync::Arc::new(FixedDetector::new(vec![BoundingBox::new(0, 0, 20, 20)]));
        let settings = LocatorSettings {
            face_min_side: 10,
            face_min_neighbors: 2,
            eye_min_side: 5,
            eye_min_neighbors: 3,
        };
        let locator =
            ZoneLocator::new(faces.clone(), FixedDetector::new(vec![])).with_settings(settings);
        let located = locator.locate(&blank(50, 50));
        assert_eq!(located.len(), 1);
        assert_eq!(faces.calls.lock().unwrap()[0], (50, 50, 10, 2));
    }

    /// 12x12 cascade: the top half must be brighter than the bottom half and
    /// the left and right halves must roughly match.
    const BLOCK_CASCADE: &str = r#"<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>12</height>
  <width>12</width>
  <stages>
    <_>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>0 -1 0 0.7</internalNodes>
          <leafValues>-1. 1.</leafValues></_></weakClassifiers></_>
    <_>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>0 1 1 -0.2 -1 -2 1 0.2</internalNodes>
          <leafValues>-1. 1. -1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_><rects><_>0 0 12 6 1.</_><_>0 6 12 6 -1.</_></rects></_>
    <_><rects><_>0 0 6 12 1.</_><_>6 0 6 12 -1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    #[test]
    fn haar_cascade_finds_shaded_block() {
        let face = HaarCascade::from_xml(BLOCK_CASCADE).unwrap();
        let settings = LocatorSettings {
            face_min_side: 12,
            face_min_neighbors: 3,
            eye_min_side: 15,
            eye_min_neighbors: 10,
        };
        let locator = ZoneLocator::new(face, FixedDetector::new(vec![])).with_settings(settings);

        let white = GrayImage::from_pixel(64, 64, image::Luma([255]));
        assert!(locator.locate_luma(&white).is_empty());

        let mut block = white.clone();
        for y in 26..38 {
            for x in 26..38 {
                let v = if y < 32 { 160 } else { 40 };
                block.put_pixel(x, y, image::Luma([v]));
            }
        }
        let faces = locator.locate_luma(&block);
        assert!(!faces.is_empty());
        for face in &faces {
            let (cx, cy) = face.bbox.center();
            assert!((26.0..=38.0).contains(&cx), "{face:?}");
            assert!((18.0..=46.0).contains(&cy), "{face:?}");
            assert!(face.eyes.is_empty());
        }
    }

    #[test]
    fn zones_put_eyes_before_nose_bridge() {
        let face = Face {
            bbox: BoundingBox::new(0, 0, 100, 100),
            eyes: vec![BoundingBox::new(20, 20, 20, 20), BoundingBox::new(60, 20, 20, 20)],
            nose_bridge: BoundingBox::new(35, 30, 30, 30),
        };
        let zones = zones_for(&face);
        let kinds: Vec<ZoneKind> = zones.iter().map(|z| z.kind).collect();
        assert_eq!(kinds, vec![ZoneKind::Eye, ZoneKind::Eye, ZoneKind::NoseBridge]);
        assert_eq!(zones[1].bbox, face.eyes[1]);
    }

    #[test]
    fn flatten_counts_eyes_plus_one_per_face() {
        let one_eye = Face {
            bbox: BoundingBox::new(0, 0, 50, 50),
            eyes: vec![BoundingBox::new(5, 5, 15, 15)],
            nose_bridge: BoundingBox::new(17, 15, 15, 15),
        };
        let no_eyes = Face {
            bbox: BoundingBox::new(60, 0, 50, 50),
            eyes: vec![],
            nose_bridge: BoundingBox::new(77, 15, 15, 15),
        };
        let zones = flatten_zones(&[one_eye, no_eyes]);
        assert_eq!(zones.len(), 3);
        assert_eq!(zones[2].kind, ZoneKind::NoseBridge);
        assert_eq!(zones[2].bbox.x, 77);
    }
}

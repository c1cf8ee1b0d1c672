use facecloak_core::{
    BoundingBox, CloakError, Cloaker, ObjectDetector, Profile, ZoneKind, ZoneLocator,
};
use image::{GrayImage, ImageEncoder, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

const SKIN: Rgb<u8> = Rgb([196, 150, 122]);
const IRIS: Rgb<u8> = Rgb([40, 30, 25]);

/// Render a face-like pattern: a skin ellipse with two dark eyes.
fn draw_face(img: &mut RgbImage, cx: f32, cy: f32, rx: f32, ry: f32) {
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = (x as f32 - cx) / rx;
        let dy = (y as f32 - cy) / ry;
        if dx * dx + dy * dy <= 1.0 {
            *pixel = SKIN;
        }
    }
    let eye_r = rx * 0.22;
    for eye_cx in [cx - rx * 0.4, cx + rx * 0.4] {
        let eye_cy = cy - ry * 0.2;
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let dx = x as f32 - eye_cx;
            let dy = y as f32 - eye_cy;
            if dx * dx + dy * dy <= eye_r * eye_r {
                *pixel = IRIS;
            }
        }
    }
}

fn portrait(width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, Rgb([245, 245, 240]));
    draw_face(&mut img, width as f32 / 2.0, height as f32 / 2.0, 55.0, 70.0);
    img
}

fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buffer)
        .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .unwrap();
    buffer
}

/// Finds connected regions darker than `threshold`, one box per region.
struct BlobDetector {
    threshold: u8,
}

impl ObjectDetector for BlobDetector {
    fn detect(&self, luma: &GrayImage, min_side: u32, _min_neighbors: u32) -> Vec<BoundingBox> {
        let (w, h) = luma.dimensions();
        let mut seen = vec![false; (w * h) as usize];
        let mut boxes = Vec::new();

        for start in 0..(w * h) {
            let (sx, sy) = (start % w, start / w);
            if seen[start as usize] || luma.get_pixel(sx, sy).0[0] >= self.threshold {
                continue;
            }
            let (mut x0, mut y0, mut x1, mut y1) = (sx, sy, sx, sy);
            let mut stack = vec![(sx, sy)];
            seen[start as usize] = true;
            while let Some((x, y)) = stack.pop() {
                x0 = x0.min(x);
                y0 = y0.min(y);
                x1 = x1.max(x);
                y1 = y1.max(y);
                let neighbors = [
                    (x.wrapping_sub(1), y),
                    (x + 1, y),
                    (x, y.wrapping_sub(1)),
                    (x, y + 1),
                ];
                for (nx, ny) in neighbors {
                    if nx < w && ny < h {
                        let idx = (ny * w + nx) as usize;
                        if !seen[idx] && luma.get_pixel(nx, ny).0[0] < self.threshold {
                            seen[idx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
            let bbox = BoundingBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1);
            if bbox.width >= min_side && bbox.height >= min_side {
                boxes.push(bbox);
            }
        }
        boxes
    }
}

fn blob_cloaker() -> Cloaker {
    // The face is everything darker than the background; eyes are the dark discs.
    Cloaker::new(ZoneLocator::new(
        BlobDetector { threshold: 230 },
        BlobDetector { threshold: 80 },
    ))
}

#[test]
fn end_to_end_single_face_max_privacy() {
    let input = portrait(200, 200);
    let png = encode_png(&input);
    let cloaker = blob_cloaker();

    let result = cloaker.process_with_seed(&png, "max_privacy", 2024).unwrap();
    assert_eq!(result.metadata.faces_processed, 1);
    assert_eq!(result.metadata.zones_modified, 3);
    assert_eq!(result.metadata.profile_name, "Max Privacy");
    assert_eq!((result.width, result.height), (200, 200));

    let decoded = image::load_from_memory(&result.data).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 200));

    // Before JPEG encoding, only the padded zones may differ from the input.
    let cloaked = cloaker
        .cloak_image(&input, "max_privacy", &mut StdRng::seed_from_u64(2024))
        .unwrap();
    assert_eq!(cloaked.faces.len(), 1);
    assert_eq!(cloaked.faces[0].eyes.len(), 2);
    let padded: Vec<BoundingBox> = cloaked
        .zones
        .iter()
        .map(|z| z.bbox.pad(5, 200, 200).unwrap())
        .collect();
    let mut changed = 0;
    for (x, y, pixel) in cloaked.image.enumerate_pixels() {
        if pixel != input.get_pixel(x, y) {
            changed += 1;
            assert!(
                padded.iter().any(|r| r.contains(x, y)),
                "pixel ({x}, {y}) changed outside every zone"
            );
        }
    }
    assert!(changed > 0, "nothing was perturbed");
}

#[test]
fn eyes_come_before_nose_bridge() {
    let cloaked = blob_cloaker()
        .cloak_image(&portrait(200, 200), "genai_safe", &mut StdRng::seed_from_u64(1))
        .unwrap();
    let kinds: Vec<ZoneKind> = cloaked.zones.iter().map(|z| z.kind).collect();
    assert_eq!(kinds, vec![ZoneKind::Eye, ZoneKind::Eye, ZoneKind::NoseBridge]);
}

#[test]
fn blank_canvas_has_no_face() {
    let blank = RgbImage::from_pixel(160, 120, Rgb([250, 250, 250]));
    let err = blob_cloaker()
        .process(&encode_png(&blank), "genai_safe")
        .unwrap_err();
    assert!(matches!(err, CloakError::NoFaceDetected));
    assert_eq!(err.public_message(), "no faces detected in image");
}

#[test]
fn same_seed_same_bytes() {
    let png = encode_png(&portrait(200, 200));
    let cloaker = blob_cloaker();
    let a = cloaker.process_with_seed(&png, "social_safe", 7).unwrap();
    let b = cloaker.process_with_seed(&png, "social_safe", 7).unwrap();
    let c = cloaker.process_with_seed(&png, "social_safe", 8).unwrap();
    assert_eq!(a.data, b.data);
    assert_ne!(a.data, c.data);
}

#[test]
fn zones_stay_in_bounds_for_faces_at_the_edge() {
    let mut img = RgbImage::from_pixel(220, 160, Rgb([245, 245, 240]));
    // Partially outside the frame on the left and bottom.
    draw_face(&mut img, 30.0, 120.0, 45.0, 55.0);
    let cloaked = blob_cloaker()
        .cloak_image(&img, "max_privacy", &mut StdRng::seed_from_u64(3))
        .unwrap();

    for zone in &cloaked.zones {
        assert!(zone.bbox.fits_within(220, 160), "{zone:?} outside image");
        let padded = zone.bbox.pad(5, 220, 160).unwrap();
        assert!(padded.fits_within(220, 160), "{padded:?} outside image");
    }
    assert_eq!(cloaked.image.dimensions(), (220, 160));
}

#[test]
fn metadata_counts_every_face() {
    let mut img = RgbImage::from_pixel(400, 200, Rgb([245, 245, 240]));
    draw_face(&mut img, 100.0, 100.0, 55.0, 70.0);
    draw_face(&mut img, 300.0, 100.0, 55.0, 70.0);
    let cloaked = blob_cloaker()
        .cloak_image(&img, "genai_safe", &mut StdRng::seed_from_u64(4))
        .unwrap();

    let expected: usize = cloaked.faces.iter().map(|f| f.eyes.len() + 1).sum();
    assert_eq!(cloaked.metadata.faces_processed, 2);
    assert_eq!(cloaked.metadata.zones_modified, expected);
    assert_eq!(expected, 6);
}

#[test]
fn analyze_reports_without_changing_anything() {
    let png = encode_png(&portrait(200, 180));
    let analysis = blob_cloaker().analyze(&png).unwrap();
    assert_eq!(analysis.faces_detected, 1);
    assert!(analysis.processable);
    assert_eq!((analysis.width, analysis.height), (200, 180));
}

#[test]
fn jpeg_input_is_accepted() {
    let mut jpeg = Vec::new();
    let img = portrait(200, 200);
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 98)
        .write_image(img.as_raw(), 200, 200, image::ExtendedColorType::Rgb8)
        .unwrap();
    let result = blob_cloaker().process_with_seed(&jpeg, "genai_safe", 5).unwrap();
    assert_eq!(result.metadata.faces_processed, 1);
}

#[test]
fn every_profile_processes() {
    let png = encode_png(&portrait(200, 200));
    let cloaker = blob_cloaker();
    for profile in Profile::ALL {
        let result = cloaker.process_with_seed(&png, profile.key(), 1).unwrap();
        assert_eq!(result.metadata.profile_name, profile.settings().name);
    }
}

#[test]
fn shared_cloaker_is_usable_across_threads() {
    let png = encode_png(&portrait(200, 200));
    let cloaker = std::sync::Arc::new(blob_cloaker());
    let expected = cloaker.process_with_seed(&png, "genai_safe", 11).unwrap().data;

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cloaker = cloaker.clone();
                let png = &png;
                scope.spawn(move || cloaker.process_with_seed(png, "genai_safe", 11).unwrap().data)
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn metadata_serializes_to_json() {
    let png = encode_png(&portrait(200, 200));
    let result = blob_cloaker().process_with_seed(&png, "max_privacy", 1).unwrap();
    let json = serde_json::to_value(&result.metadata).unwrap();
    assert_eq!(json["faces_processed"], 1);
    assert_eq!(json["zones_modified"], 3);
    assert_eq!(json["profile_name"], "Max Privacy");
    assert_eq!(json["profile_settings"]["shift_amount"], 3);
}

#[test]
fn cascade_files_load_through_locator() {
    let dir = std::env::temp_dir().join(format!("facecloak-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("edge.xml");
    std::fs::write(&path, EDGE_CASCADE).unwrap();

    let locator = ZoneLocator::from_cascade_files(&path, &path).unwrap();
    let flat = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
    assert!(locator.locate(&flat).is_empty());

    let missing = ZoneLocator::from_cascade_files(dir.join("nope.xml"), &path);
    assert!(matches!(missing, Err(CloakError::CascadeLoad(_))));

    std::fs::remove_dir_all(&dir).ok();
}

const EDGE_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>8</height>
  <width>8</width>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>0 -1 0 0.1</internalNodes>
          <leafValues>-1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>0 0 8 4 1.</_>
        <_>0 4 8 4 -1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

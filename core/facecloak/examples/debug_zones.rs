//! Print the faces and zones found in images, and save an annotated copy.
//!
//! Usage:
//!   cargo run --example debug_zones -- <face_cascade.xml> <eye_cascade.xml> <image>...

use facecloak_core::{zones_for, ZoneKind, ZoneLocator};
use image::{Rgb, RgbImage};

fn outline(img: &mut RgbImage, bbox: &facecloak_core::BoundingBox, color: Rgb<u8>) {
    for x in bbox.x..bbox.right() {
        img.put_pixel(x, bbox.y, color);
        img.put_pixel(x, bbox.bottom() - 1, color);
    }
    for y in bbox.y..bbox.bottom() {
        img.put_pixel(bbox.x, y, color);
        img.put_pixel(bbox.right() - 1, y, color);
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [face_cascade, eye_cascade, images @ ..] = args.as_slice() else {
        eprintln!("usage: debug_zones <face_cascade.xml> <eye_cascade.xml> <image>...");
        std::process::exit(2);
    };

    let locator = ZoneLocator::from_cascade_files(face_cascade, eye_cascade)
        .expect("failed to load cascades");

    for path in images {
        let mut img = image::open(path).unwrap().to_rgb8();
        let (width, height) = img.dimensions();
        println!("=== {path} ({width}x{height}) ===");

        let faces = locator.locate(&img);
        if faces.is_empty() {
            println!("  NO FACES DETECTED");
        }
        for (i, face) in faces.iter().enumerate() {
            let b = face.bbox;
            let eyes = face.eyes.len();
            println!("  face {i}: ({}, {}, {}x{}), {eyes} eye(s)", b.x, b.y, b.width, b.height);
            outline(&mut img, &face.bbox, Rgb([0, 255, 0]));
            for zone in zones_for(face) {
                let z = zone.bbox;
                let color = match zone.kind {
                    ZoneKind::Eye => Rgb([255, 0, 0]),
                    ZoneKind::NoseBridge => Rgb([0, 0, 255]),
                };
                println!("    {:?}: ({}, {}, {}x{})", zone.kind, z.x, z.y, z.width, z.height);
                outline(&mut img, &zone.bbox, color);
            }
        }

        let annotated = format!("{path}.zones.png");
        img.save(&annotated).unwrap();
        println!("  → {annotated}");
        println!();
    }
}

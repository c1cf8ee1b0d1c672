//! Face privacy processing: perturb the eye and nose-bridge regions of every
//! face in a photo so automated face matching becomes less consistent, while
//! the photo looks unchanged to a person.
//!
//! # Example
//!
//! ```no_run
//! use facecloak_core::{Cloaker, ZoneLocator};
//!
//! let locator = ZoneLocator::from_cascade_files(
//!     "haarcascade_frontalface_default.xml",
//!     "haarcascade_eye.xml",
//! )
//! .unwrap();
//! let raw_bytes = std::fs::read("photo.jpg").unwrap();
//! let result = Cloaker::new(locator).process(&raw_bytes, "max_privacy").unwrap();
//! println!(
//!     "{} faces, {} zones, {} bytes",
//!     result.metadata.faces_processed,
//!     result.metadata.zones_modified,
//!     result.data.len()
//! );
//! ```
#![warn(missing_docs)]

/// OpenCV-format Haar cascade detector.
pub mod cascade;
mod codec;
/// sRGB and CIE L\*a\*b\* conversion.
pub mod color;
/// Object detection trait.
pub mod detector;
mod error;
mod geometry;
mod locator;
mod pipeline;
mod profile;
#[cfg(feature = "rustface")]
/// SeetaFace-based face detector backend.
pub mod rustface_backend;
/// Zone perturbation stages.
pub mod transform;

use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

pub use cascade::HaarCascade;
pub use detector::ObjectDetector;
/// Error type returned by facecloak operations.
pub use error::CloakError;
pub use geometry::{nose_bridge, BoundingBox};
pub use locator::{flatten_zones, zones_for, Face, LocatorSettings, Zone, ZoneKind, ZoneLocator};
pub use profile::{PrivacyProfile, Profile, ProfileSettings};
#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceDetector;

/// Default JPEG quality of processed output.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Summary of one processing run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingMetadata {
    /// Number of faces found and processed.
    pub faces_processed: usize,

    /// Number of zones perturbed: every eye plus one nose-bridge per face.
    pub zones_modified: usize,

    /// Display name of the profile applied, e.g. `Max Privacy`.
    pub profile_name: String,

    /// Strengths of the profile applied.
    pub profile_settings: ProfileSettings,
}

/// Result of [`Cloaker::process`].
#[derive(Debug, Clone)]
pub struct CloakedPhoto {
    /// JPEG-encoded output.
    pub data: Vec<u8>,

    /// Width of the output image in pixels (same as the input).
    pub width: u32,

    /// Height of the output image in pixels (same as the input).
    pub height: u32,

    /// Size of the original input in bytes.
    pub original_size: usize,

    /// Counts and profile of the run.
    pub metadata: ProcessingMetadata,
}

/// Result of [`Cloaker::cloak_image`], before encoding.
#[derive(Debug, Clone)]
pub struct CloakedImage {
    /// The perturbed raster.
    pub image: RgbImage,

    /// Faces found in the input.
    pub faces: Vec<Face>,

    /// Zones perturbed, in processing order.
    pub zones: Vec<Zone>,

    /// Counts and profile of the run.
    pub metadata: ProcessingMetadata,
}

/// Result of [`Cloaker::analyze`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaceAnalysis {
    /// Number of faces found.
    pub faces_detected: usize,

    /// Whether [`Cloaker::process`] would accept the image.
    pub processable: bool,

    /// Image width in pixels.
    pub width: u32,

    /// Image height in pixels.
    pub height: u32,
}

/// Pipeline entry point: decode, locate zones, perturb them, and encode.
///
/// Holds no per-request state, so one instance can serve concurrent callers.
pub struct Cloaker {
    locator: ZoneLocator,
    jpeg_quality: u8,
}

impl Cloaker {
    /// Create a cloaker around a zone locator.
    pub fn new(locator: ZoneLocator) -> Self {
        Self {
            locator,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set the output JPEG quality from 1 to 100 (default: 95).
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// The locator used to find zones.
    pub fn locator(&self) -> &ZoneLocator {
        &self.locator
    }

    /// Process encoded image bytes (JPEG or PNG) with the named profile.
    ///
    /// Unknown profile names fall back to `genai_safe`. Noise is seeded from
    /// the thread-local generator, so repeated calls differ; use
    /// [`Cloaker::process_with_seed`] for reproducible output.
    pub fn process(&self, input: &[u8], profile: &str) -> Result<CloakedPhoto, CloakError> {
        self.process_with_rng(input, profile, &mut rand::rng())
    }

    /// Like [`Cloaker::process`], with a fixed noise seed. Output is
    /// byte-for-byte reproducible for the same input, profile and seed.
    pub fn process_with_seed(
        &self,
        input: &[u8],
        profile: &str,
        seed: u64,
    ) -> Result<CloakedPhoto, CloakError> {
        self.process_with_rng(input, profile, &mut StdRng::seed_from_u64(seed))
    }

    /// Like [`Cloaker::process`], drawing noise from `rng`.
    pub fn process_with_rng<R: Rng + ?Sized>(
        &self,
        input: &[u8],
        profile: &str,
        rng: &mut R,
    ) -> Result<CloakedPhoto, CloakError> {
        self.validate()?;
        pipeline::process_pipeline(input, profile, &self.locator, self.jpeg_quality, rng)
    }

    /// Perturb an already decoded image without encoding it.
    pub fn cloak_image<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        profile: &str,
        rng: &mut R,
    ) -> Result<CloakedImage, CloakError> {
        pipeline::cloak_raster(image, profile, &self.locator, rng)
    }

    /// Count faces without modifying anything.
    pub fn analyze(&self, input: &[u8]) -> Result<FaceAnalysis, CloakError> {
        pipeline::analyze_pipeline(input, &self.locator)
    }

    fn validate(&self) -> Result<(), CloakError> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(CloakError::InvalidQuality(self.jpeg_quality));
        }
        Ok(())
    }
}

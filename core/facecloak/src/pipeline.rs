use image::RgbImage;
use rand::Rng;

use crate::codec::{decode_image, encode_jpeg};
use crate::error::CloakError;
use crate::locator::{flatten_zones, ZoneLocator};
use crate::profile::Profile;
use crate::transform::transform;
use crate::{CloakedImage, CloakedPhoto, FaceAnalysis, ProcessingMetadata};

/// Locate → reject empty → resolve profile → transform, on a decoded raster.
pub(crate) fn cloak_raster<R: Rng + ?Sized>(
    image: &RgbImage,
    profile_key: &str,
    locator: &ZoneLocator,
    rng: &mut R,
) -> Result<CloakedImage, CloakError> {
    let faces = locator.locate(image);
    if faces.is_empty() {
        return Err(CloakError::NoFaceDetected);
    }

    let zones = flatten_zones(&faces);
    let profile = Profile::from_key(profile_key).settings();
    let cloaked = transform(image, &zones, &profile, rng);

    let metadata = ProcessingMetadata {
        faces_processed: faces.len(),
        zones_modified: zones.len(),
        profile_name: profile.name.to_string(),
        profile_settings: profile.report(),
    };

    Ok(CloakedImage {
        image: cloaked,
        faces,
        zones,
        metadata,
    })
}

/// Full pipeline: decode → locate → transform → encode.
pub(crate) fn process_pipeline<R: Rng + ?Sized>(
    input: &[u8],
    profile_key: &str,
    locator: &ZoneLocator,
    jpeg_quality: u8,
    rng: &mut R,
) -> Result<CloakedPhoto, CloakError> {
    let decoded = decode_image(input)?;
    let cloaked = cloak_raster(&decoded, profile_key, locator, rng)?;
    let data = encode_jpeg(&cloaked.image, jpeg_quality)?;

    tracing::info!(
        faces = cloaked.metadata.faces_processed,
        zones = cloaked.metadata.zones_modified,
        profile = %cloaked.metadata.profile_name,
        "image processed"
    );

    Ok(CloakedPhoto {
        data,
        width: cloaked.image.width(),
        height: cloaked.image.height(),
        original_size: input.len(),
        metadata: cloaked.metadata,
    })
}

/// Decode and locate only; never transforms or re-encodes.
pub(crate) fn analyze_pipeline(
    input: &[u8],
    locator: &ZoneLocator,
) -> Result<FaceAnalysis, CloakError> {
    let decoded = decode_image(input)?;
    let faces = locator.locate(&decoded);

    tracing::info!(faces = faces.len(), "image analyzed");

    Ok(FaceAnalysis {
        faces_detected: faces.len(),
        processable: !faces.is_empty(),
        width: decoded.width(),
        height: decoded.height(),
    })
}

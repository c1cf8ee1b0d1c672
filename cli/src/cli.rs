use std::path::Path;

use anyhow::Context;
use facecloak_core::{CloakError, Cloaker, HaarCascade, ZoneLocator};

use crate::ModelArgs;

fn build_locator(models: &ModelArgs) -> anyhow::Result<ZoneLocator> {
    let eye = HaarCascade::from_path(&models.eye_cascade)
        .with_context(|| format!("loading eye cascade {}", models.eye_cascade.display()))?;

    #[cfg(feature = "rustface")]
    if let Some(model) = &models.rustface_model {
        let face = facecloak_core::RustfaceDetector::from_path(model)
            .with_context(|| format!("loading SeetaFace model {}", model.display()))?;
        tracing::info!(model = %model.display(), "using SeetaFace face detector");
        return Ok(ZoneLocator::new(face, eye));
    }

    let face_path = models
        .face_cascade
        .as_ref()
        .context("a face cascade is required (--face-cascade)")?;
    let face = HaarCascade::from_path(face_path)
        .with_context(|| format!("loading face cascade {}", face_path.display()))?;
    Ok(ZoneLocator::new(face, eye))
}

/// Client-facing failures print the short public message; internal ones keep
/// the full chain for the operator.
fn report(err: CloakError) -> anyhow::Error {
    if err.is_client_error() {
        tracing::debug!(error = %err, "rejected input");
        anyhow::anyhow!(err.public_message())
    } else {
        anyhow::Error::new(err)
    }
}

pub fn process(
    input: &Path,
    output: &Path,
    profile: &str,
    seed: Option<u64>,
    quality: u8,
    models: &ModelArgs,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let cloaker = Cloaker::new(build_locator(models)?).jpeg_quality(quality);

    let result = match seed {
        Some(seed) => cloaker.process_with_seed(&bytes, profile, seed),
        None => cloaker.process(&bytes, profile),
    }
    .map_err(report)?;

    std::fs::write(output, &result.data).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(
        output = %output.display(),
        bytes = result.data.len(),
        original_size = result.original_size,
        "wrote cloaked image"
    );

    println!("{}", serde_json::to_string_pretty(&result.metadata)?);
    Ok(())
}

pub fn analyze(input: &Path, models: &ModelArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let analysis = Cloaker::new(build_locator(models)?)
        .analyze(&bytes)
        .map_err(report)?;

    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

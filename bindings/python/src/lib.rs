use facecloak_core::{CloakError, Cloaker, ZoneLocator};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

fn to_py_err(e: CloakError) -> PyErr {
    if e.is_client_error() {
        PyValueError::new_err(e.public_message())
    } else {
        PyRuntimeError::new_err(e.to_string())
    }
}

fn cloaker(face_cascade: &str, eye_cascade: &str) -> PyResult<Cloaker> {
    let locator = ZoneLocator::from_cascade_files(face_cascade, eye_cascade).map_err(to_py_err)?;
    Ok(Cloaker::new(locator))
}

/// Perturb the eye and nose-bridge zones of every face in a photo.
///
/// Args:
///     input: Raw image bytes (JPEG or PNG)
///     face_cascade: Path to an OpenCV face cascade XML
///     eye_cascade: Path to an OpenCV eye cascade XML
///     profile: "social_safe", "genai_safe" or "max_privacy" (default: "genai_safe")
///     seed: Noise seed for reproducible output (default: random)
///     quality: JPEG quality 1-100 (default: 95)
///
/// Returns:
///     dict with keys: data (bytes), width (int), height (int), original_size (int),
///                     faces_processed (int), zones_modified (int), profile_name (str),
///                     profile_settings (dict)
#[pyfunction]
#[pyo3(signature = (
    input, face_cascade, eye_cascade, *, profile="genai_safe", seed=None, quality=None
))]
fn process(
    py: Python<'_>,
    input: Vec<u8>,
    face_cascade: &str,
    eye_cascade: &str,
    profile: &str,
    seed: Option<u64>,
    quality: Option<u8>,
) -> PyResult<Py<PyDict>> {
    let mut cloaker = cloaker(face_cascade, eye_cascade)?;
    if let Some(q) = quality {
        cloaker = cloaker.jpeg_quality(q);
    }

    let result = py
        .allow_threads(|| match seed {
            Some(seed) => cloaker.process_with_seed(&input, profile, seed),
            None => cloaker.process(&input, profile),
        })
        .map_err(to_py_err)?;

    let settings = PyDict::new(py);
    settings.set_item("blur_strength", result.metadata.profile_settings.blur_strength)?;
    settings.set_item("noise_strength", result.metadata.profile_settings.noise_strength)?;
    settings.set_item("shift_amount", result.metadata.profile_settings.shift_amount)?;

    let dict = PyDict::new(py);
    dict.set_item("data", pyo3::types::PyBytes::new(py, &result.data))?;
    dict.set_item("width", result.width)?;
    dict.set_item("height", result.height)?;
    dict.set_item("original_size", result.original_size)?;
    dict.set_item("faces_processed", result.metadata.faces_processed)?;
    dict.set_item("zones_modified", result.metadata.zones_modified)?;
    dict.set_item("profile_name", &result.metadata.profile_name)?;
    dict.set_item("profile_settings", settings)?;
    Ok(dict.into())
}

/// Count faces in a photo without modifying it.
///
/// Returns:
///     dict with keys: faces_detected (int), processable (bool), width (int), height (int)
#[pyfunction]
fn analyze(
    py: Python<'_>,
    input: Vec<u8>,
    face_cascade: &str,
    eye_cascade: &str,
) -> PyResult<Py<PyDict>> {
    let cloaker = cloaker(face_cascade, eye_cascade)?;
    let analysis = py.allow_threads(|| cloaker.analyze(&input)).map_err(to_py_err)?;

    let dict = PyDict::new(py);
    dict.set_item("faces_detected", analysis.faces_detected)?;
    dict.set_item("processable", analysis.processable)?;
    dict.set_item("width", analysis.width)?;
    dict.set_item("height", analysis.height)?;
    Ok(dict.into())
}

#[pymodule]
fn facecloak(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(process, m)?)?;
    m.add_function(wrap_pyfunction!(analyze, m)?)?;
    Ok(())
}

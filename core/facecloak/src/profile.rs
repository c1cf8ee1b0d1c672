use serde::Serialize;

/// Pre-configured perturbation strengths.
///
/// Resolve a profile by its registry key with [`Profile::from_key`]; unknown
/// keys fall back to [`Profile::GenAiSafe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Light touch for photos shared on social networks.
    ///
    /// - 3px bilateral diameter
    /// - 2% luminance noise
    /// - 1px shift
    SocialSafe,

    /// Balanced setting against generative-AI face models.
    ///
    /// - 5px bilateral diameter
    /// - 5% luminance noise
    /// - 2px shift
    #[default]
    GenAiSafe,

    /// Strongest perturbation that stays visually unobtrusive.
    ///
    /// - 7px bilateral diameter
    /// - 8% luminance noise
    /// - 3px shift
    MaxPrivacy,
}

impl Profile {
    /// All profiles in order of increasing strength.
    pub const ALL: [Profile; 3] = [Profile::SocialSafe, Profile::GenAiSafe, Profile::MaxPrivacy];

    /// Look up a profile by registry key, falling back to the default.
    pub fn from_key(key: &str) -> Self {
        match key {
            "social_safe" => Profile::SocialSafe,
            "genai_safe" => Profile::GenAiSafe,
            "max_privacy" => Profile::MaxPrivacy,
            other => {
                tracing::debug!(requested = other, "unknown profile, using genai_safe");
                Profile::default()
            }
        }
    }

    /// Registry key, e.g. `max_privacy`.
    pub fn key(self) -> &'static str {
        self.settings().key
    }

    /// Full settings for this profile.
    pub fn settings(self) -> PrivacyProfile {
        match self {
            Profile::SocialSafe => PrivacyProfile {
                key: "social_safe",
                name: "Social Safe",
                blur_strength: 3,
                noise_strength: 0.02,
                shift_amount: 1,
            },
            Profile::GenAiSafe => PrivacyProfile {
                key: "genai_safe",
                name: "GenAI Safe",
                blur_strength: 5,
                noise_strength: 0.05,
                shift_amount: 2,
            },
            Profile::MaxPrivacy => PrivacyProfile {
                key: "max_privacy",
                name: "Max Privacy",
                blur_strength: 7,
                noise_strength: 0.08,
                shift_amount: 3,
            },
        }
    }
}

/// Transform strengths applied to every zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrivacyProfile {
    /// Registry key.
    pub key: &'static str,
    /// Human-readable name reported in metadata.
    pub name: &'static str,
    /// Bilateral filter diameter in pixels; even values are rounded up.
    pub blur_strength: u32,
    /// Standard deviation of luminance noise as a fraction of full scale.
    pub noise_strength: f64,
    /// Translation in pixels.
    pub shift_amount: u32,
}

impl PrivacyProfile {
    /// Bilateral diameter rounded up to the next odd number.
    pub fn kernel_diameter(&self) -> u32 {
        self.blur_strength | 1
    }

    /// The subset of settings reported in processing metadata.
    pub fn report(&self) -> ProfileSettings {
        ProfileSettings {
            blur_strength: self.blur_strength,
            noise_strength: self.noise_strength,
            shift_amount: self.shift_amount,
        }
    }
}

/// Profile strengths as reported in [`crate::ProcessingMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileSettings {
    /// Bilateral filter diameter.
    pub blur_strength: u32,
    /// Luminance noise strength.
    pub noise_strength: f64,
    /// Shift in pixels.
    pub shift_amount: u32,
}

//! Color-Profile Resolver
//!
//! The root folder's name decides which profile every exported image uses.
//! This table is the single source for that decision.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::ValidationError;

pub const PS_PROFILE_SRGB: &str = "sRGB IEC61966-2.1";
pub const PS_PROFILE_P3: &str = "Display P3";
pub const PS_PROFILE_UNTAGGED: &str = "Untagged RGB";

pub const JSON_PROFILE_SRGB: &str = "sRGB";
pub const JSON_PROFILE_P3: &str = "display-P3";

/// One of the three reserved root folder names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootVariant {
    #[serde(rename = "art")]
    Art,
    #[serde(rename = "art-p3")]
    ArtP3,
    #[serde(rename = "art-p3@2x")]
    ArtP3At2x,
}

impl RootVariant {
    pub const ALL: [RootVariant; 3] = [Self::Art, Self::ArtP3, Self::ArtP3At2x];

    pub fn from_layer_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "art" => Some(Self::Art),
            "art-p3" => Some(Self::ArtP3),
            "art-p3@2x" => Some(Self::ArtP3At2x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Art => "art",
            Self::ArtP3 => "art-p3",
            Self::ArtP3At2x => "art-p3@2x",
        }
    }

    /// Folder name as users see it in the layers panel.
    pub fn folder_label(&self) -> &'static str {
        match self {
            Self::Art => "Art",
            Self::ArtP3 => "Art-P3",
            Self::ArtP3At2x => "Art-P3@2x",
        }
    }

    pub fn color_profile(&self) -> ColorProfile {
        match self {
            Self::Art => ColorProfile {
                editor_profile: PS_PROFILE_SRGB,
                display_gamut: JSON_PROFILE_SRGB,
                scale_tag: "1x",
            },
            Self::ArtP3 => ColorProfile {
                editor_profile: PS_PROFILE_P3,
                display_gamut: JSON_PROFILE_P3,
                scale_tag: "",
            },
            Self::ArtP3At2x => ColorProfile {
                editor_profile: PS_PROFILE_P3,
                display_gamut: JSON_PROFILE_P3,
                scale_tag: "2x",
            },
        }
    }

    pub fn is_p3(&self) -> bool {
        !matches!(self, Self::Art)
    }
}

impl fmt::Display for RootVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile, gamut and scale every exported image of a run carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorProfile {
    /// Profile name the rasterizer converts into.
    pub editor_profile: &'static str,
    /// `display-gamut` value written to image-set metadata.
    pub display_gamut: &'static str,
    /// Empty when the variant carries no scale.
    pub scale_tag: &'static str,
}

impl ColorProfile {
    pub fn scale(&self) -> Option<&'static str> {
        if self.scale_tag.is_empty() { None } else { Some(self.scale_tag) }
    }

    /// Short label used in mismatch messages.
    pub fn short_name(&self) -> &'static str {
        if self.editor_profile == PS_PROFILE_P3 { "P3" } else { "sRGB" }
    }
}

/// What the document's own profile string says about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentProfile {
    DisplayP3,
    Srgb,
    Untagged,
    Other,
}

impl DocumentProfile {
    pub fn classify(profile: &str) -> Self {
        if profile == PS_PROFILE_P3 {
            Self::DisplayP3
        } else if profile.contains(PS_PROFILE_SRGB) {
            Self::Srgb
        } else if profile == PS_PROFILE_UNTAGGED {
            Self::Untagged
        } else {
            Self::Other
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::DisplayP3 => "is using the P3 color profile",
            Self::Srgb => "is using the sRGB color profile",
            Self::Untagged => "does not have a color profile assigned",
            Self::Other => "is not using the sRGB or P3 color profile",
        }
    }
}

/// Exported images are converted into the folder's profile; any document
/// profile that would lose or invent color there is rejected.
pub fn check_consistency(profile: &str, variant: RootVariant) -> Result<(), ValidationError> {
    let document = DocumentProfile::classify(profile);
    let compatible = match document {
        DocumentProfile::DisplayP3 => variant.is_p3(),
        DocumentProfile::Srgb => true,
        DocumentProfile::Untagged | DocumentProfile::Other => false,
    };

    if compatible {
        Ok(())
    } else {
        Err(ValidationError::ProfileMismatch { document, variant })
    }
}

//! Naming Policy
//!
//! Maps raw layer names to the identifiers used for directories, image files
//! and metadata. A layer's sanitized name is computed once ([`LayerNames`])
//! and shared by file emission and metadata emission.

use serde::{Deserialize, Serialize};

use crate::profile::RootVariant;

pub const STACK_LAYER_EXT: &str = "imagestacklayer";
pub const IMAGE_SET_DIR: &str = "Content.imageset";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Unix }
    }

    /// 128 characters minus the `.png` extension. Windows paths are capped at
    /// 260 characters, so names there stay much shorter.
    pub fn max_name_len(&self) -> usize {
        match self {
            Self::Windows => 30,
            Self::Unix => 124,
        }
    }

    pub fn home_var(&self) -> &'static str {
        match self {
            Self::Windows => "USERPROFILE",
            Self::Unix => "HOME",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::Unix => "macOS",
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuffixMode {
    #[default]
    Enabled,
    Disabled,
}

impl From<bool> for SuffixMode {
    fn from(enabled: bool) -> Self {
        if enabled { Self::Enabled } else { Self::Disabled }
    }
}

/// Lowercase, replace anything outside `[A-Za-z0-9_]` with `-`, truncate.
///
/// Replacement is per UTF-16 code unit, so a character outside the BMP
/// becomes `--`. The result is pure ASCII, so it is already in NFC form.
pub fn sanitize(raw: &str, platform: Platform) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.extend(std::iter::repeat('-').take(c.len_utf16()));
        }
    }
    out.truncate(platform.max_name_len());
    out
}

pub fn suffix_for(variant: RootVariant) -> &'static str {
    match variant {
        RootVariant::Art => "-srgb",
        RootVariant::ArtP3 => "-p3",
        RootVariant::ArtP3At2x => "-p3@2x",
    }
}

pub fn filename_for(
    raw_name: &str,
    variant: RootVariant,
    suffix_mode: SuffixMode,
    platform: Platform,
) -> String {
    image_filename(&sanitize(raw_name, platform), variant, suffix_mode)
}

fn image_filename(sanitized: &str, variant: RootVariant, suffix_mode: SuffixMode) -> String {
    match suffix_mode {
        SuffixMode::Disabled => format!("{}.png", sanitized),
        SuffixMode::Enabled => format!("{}{}.png", sanitized, suffix_for(variant)),
    }
}

/// Naming inputs that stay fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingConfig {
    pub platform: Platform,
    pub suffix_mode: SuffixMode,
}

/// Every name derived from one exportable layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerNames {
    pub sanitized: String,
    pub filename: String,
}

impl LayerNames {
    pub fn new(raw_name: &str, variant: RootVariant, naming: &NamingConfig) -> Self {
        let sanitized = sanitize(raw_name, naming.platform);
        let filename = image_filename(&sanitized, variant, naming.suffix_mode);
        Self { sanitized, filename }
    }

    /// `<name>.imagestacklayer`
    pub fn stack_dir(&self) -> String {
        format!("{}.{}", self.sanitized, STACK_LAYER_EXT)
    }

    /// Image path relative to the output root, always `/`-separated.
    pub fn relative_image_path(&self) -> String {
        format!("{}/{}/{}", self.stack_dir(), IMAGE_SET_DIR, self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_non_word_characters() {
        let name = sanitize("My Layer/Name@2x", Platform::Unix);
        assert_eq!(name, "my-layer-name-2x");
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn test_sanitize_non_ascii_letters_become_dashes() {
        assert_eq!(sanitize("Café_1", Platform::Unix), "caf-_1");
    }

    #[test]
    fn test_sanitize_astral_characters_take_two_dashes() {
        assert_eq!(sanitize("Sun\u{1F31E}", Platform::Unix), "sun--");
        let name = format!("{}\u{1F31E}b", "a".repeat(29));
        assert_eq!(sanitize(&name, Platform::Windows), format!("{}-", "a".repeat(29)));
    }

    #[test]
    fn test_sanitize_truncates_per_platform() {
        let long = "a".repeat(200);
        assert_eq!(sanitize(&long, Platform::Unix).len(), 124);
        assert_eq!(sanitize(&long, Platform::Windows).len(), 30);
    }

    #[test]
    fn test_filename_suffixes() {
        let p = Platform::Unix;
        assert_eq!(filename_for("Sky", RootVariant::Art, SuffixMode::Enabled, p), "sky-srgb.png");
        assert_eq!(filename_for("Sky", RootVariant::ArtP3, SuffixMode::Enabled, p), "sky-p3.png");
        assert_eq!(filename_for("Sky", RootVariant::ArtP3At2x, SuffixMode::Enabled, p), "sky-p3@2x.png");
        for variant in [RootVariant::Art, RootVariant::ArtP3, RootVariant::ArtP3At2x] {
            assert_eq!(filename_for("Sky", variant, SuffixMode::Disabled, p), "sky.png");
        }
    }

    #[test]
    fn test_layer_names_share_sanitized_name() {
        let naming = NamingConfig { platform: Platform::Unix, suffix_mode: SuffixMode::Enabled };
        let names = LayerNames::new("Front Layer", RootVariant::ArtP3, &naming);
        assert_eq!(names.stack_dir(), "front-layer.imagestacklayer");
        assert_eq!(
            names.relative_image_path(),
            "front-layer.imagestacklayer/Content.imageset/front-layer-p3.png"
        );
    }
}

//! Structure Validation - Ordered Rules
//!
//! Decides whether a document's layer structure can be exported.
//! Rules run in a fixed order and the first failure wins. Nothing here
//! touches the host or the filesystem.

use thiserror::Error;

use crate::document::{Document, Layer};
use crate::profile::{check_consistency, ColorProfile, DocumentProfile, RootVariant};

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

/// Rules about names and uniqueness only look at this many children.
pub const MAX_EXPORT_LAYERS: usize = 5;
pub const MIN_EXPORT_LAYERS: usize = 2;

pub const VALIDATION_CATEGORY: &str = "previewValidationError";

const FORBIDDEN_NAME_CHARS: [char; 3] = ['@', '/', ','];

/// Empty layers whose name contains this tag (case-sensitive) still export.
const SPACER_TAG: &str = "spacer";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("A preview couldn't be generated because there's more than one Art, Art-P3, or Art-P3@2x folder in the PSD file.")]
    MultipleRootFolders,

    #[error("A preview couldn't be generated because there's no Art, Art-P3, or Art-P3@2x folder in the PSD file.")]
    NoRootFolder,

    #[error("A preview couldn't be generated because the Art folder is not visible.")]
    RootFolderNotVisible,

    #[error("An error occurred creating uncompressed assets due to invalid characters in layer name. Layer names cannot contain \"@\", \",\" or \"/\"")]
    InvalidLayerName { name: String },

    #[error("A preview couldn't be generated because the names of visible layers or subfolders must be unique.")]
    DuplicateLayerNames { name: String },

    #[error("A preview couldn't be generated because there are more than five visible layers or folders.")]
    TooManyLayers { count: usize },

    #[error("A preview couldn't be generated because the Art folder in the PSD file is empty.")]
    EmptyRootFolder,

    #[error("To update the preview, make at least two subfolders or layers visible.")]
    NotEnoughLayers,

    #[error(
        "Error: Mismatched color space. This PSD file {}. But the \"{}\" folder exports images using the {} color profile.",
        .document.describe(),
        .variant.folder_label(),
        .variant.color_profile().short_name()
    )]
    ProfileMismatch {
        document: DocumentProfile,
        variant: RootVariant,
    },

    #[error("A preview couldn’t be generated because there is no background layer, or the background layer isn’t visible.")]
    NoBackgroundLayer,
}

impl ValidationError {
    /// Machine-readable category surfaced to the host.
    pub fn category(&self) -> &'static str {
        VALIDATION_CATEGORY
    }

    /// Stable identifier of the rule that failed.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MultipleRootFolders => "multiple_root_folders",
            Self::NoRootFolder => "no_root_folder",
            Self::RootFolderNotVisible => "root_folder_not_visible",
            Self::InvalidLayerName { .. } => "invalid_layer_name",
            Self::DuplicateLayerNames { .. } => "duplicate_layer_names",
            Self::TooManyLayers { .. } => "too_many_layers",
            Self::EmptyRootFolder => "empty_root_folder",
            Self::NotEnoughLayers => "not_enough_layers",
            Self::ProfileMismatch { .. } => "profile_mismatch",
            Self::NoBackgroundLayer => "no_background_layer",
        }
    }
}

/// The validated, ordered layers of the root folder.
#[derive(Debug, Clone)]
pub struct ExportLayerSet<'a> {
    pub root: &'a Layer,
    pub variant: RootVariant,
    pub layers: Vec<&'a Layer>,
}

impl<'a> ExportLayerSet<'a> {
    pub fn profile(&self) -> ColorProfile {
        self.variant.color_profile()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Everything the ordered rules need once the root folder is known.
#[derive(Debug)]
pub struct StructureContext<'a> {
    pub document: &'a Document,
    pub root: &'a Layer,
    pub variant: RootVariant,
    /// Visible, non-empty (or spacer) children of the root, in order.
    pub candidates: Vec<&'a Layer>,
    /// The first [`MAX_EXPORT_LAYERS`] candidates.
    pub head: Vec<&'a Layer>,
}

/// A single structure rule. Returns the first problem it finds.
pub trait StructureRule {
    fn name(&self) -> &'static str;
    fn check(&self, ctx: &StructureContext<'_>) -> Result<(), ValidationError>;
}

// --- Concrete Rules ---

pub struct LayerNameCharactersRule;

impl StructureRule for LayerNameCharactersRule {
    fn name(&self) -> &'static str { "layer_name_characters" }

    fn check(&self, ctx: &StructureContext<'_>) -> Result<(), ValidationError> {
        match ctx.head.iter().find(|l| l.name.contains(FORBIDDEN_NAME_CHARS)) {
            Some(layer) => Err(ValidationError::InvalidLayerName { name: layer.name.clone() }),
            None => Ok(()),
        }
    }
}

pub struct UniqueNamesRule;

impl StructureRule for UniqueNamesRule {
    fn name(&self) -> &'static str { "unique_names" }

    fn check(&self, ctx: &StructureContext<'_>) -> Result<(), ValidationError> {
        let mut seen = std::collections::HashSet::new();
        for layer in &ctx.head {
            if !seen.insert(layer.name.to_lowercase()) {
                return Err(ValidationError::DuplicateLayerNames { name: layer.name.clone() });
            }
        }
        Ok(())
    }
}

pub struct LayerCountRule;

impl StructureRule for LayerCountRule {
    fn name(&self) -> &'static str { "layer_count" }

    fn check(&self, ctx: &StructureContext<'_>) -> Result<(), ValidationError> {
        if ctx.candidates.len() > MAX_EXPORT_LAYERS {
            return Err(ValidationError::TooManyLayers { count: ctx.candidates.len() });
        }
        if ctx.head.is_empty() {
            return Err(ValidationError::EmptyRootFolder);
        }
        if ctx.head.len() < MIN_EXPORT_LAYERS {
            return Err(ValidationError::NotEnoughLayers);
        }
        Ok(())
    }
}

pub struct ProfileConsistencyRule;

impl StructureRule for ProfileConsistencyRule {
    fn name(&self) -> &'static str { "profile_consistency" }

    fn check(&self, ctx: &StructureContext<'_>) -> Result<(), ValidationError> {
        check_consistency(&ctx.document.profile, ctx.variant)
    }
}

/// Runs root resolution and then the ordered rule list.
pub struct StructureValidator {
    rules: Vec<Box<dyn StructureRule>>,
}

impl StructureValidator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(LayerNameCharactersRule),
                Box::new(UniqueNamesRule),
                Box::new(LayerCountRule),
                Box::new(ProfileConsistencyRule),
            ],
        }
    }

    pub fn validate<'a>(&self, document: &'a Document) -> Result<ExportLayerSet<'a>, ValidationError> {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        let ctx = resolve_root(document)?;
        tracing::debug!(
            profile = %document.profile.to_lowercase(),
            root = %ctx.root.name,
            "validating document structure"
        );

        for rule in &self.rules {
            if let Err(err) = rule.check(&ctx) {
                tracing::debug!(rule = rule.name(), error = %err, "structure rule failed");
                return Err(err);
            }
        }

        Ok(ExportLayerSet {
            root: ctx.root,
            variant: ctx.variant,
            layers: ctx.head,
        })
    }
}

impl Default for StructureValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn reserved_variant(layer: &Layer) -> Option<RootVariant> {
    if layer.is_container() {
        RootVariant::from_layer_name(&layer.name)
    } else {
        None
    }
}

fn resolve_root(document: &Document) -> Result<StructureContext<'_>, ValidationError> {
    let reserved = document
        .all_layers()
        .filter(|l| reserved_variant(l).is_some())
        .count();
    if reserved > 1 {
        return Err(ValidationError::MultipleRootFolders);
    }

    let (root, variant) = document
        .layers
        .iter()
        .find_map(|l| reserved_variant(l).map(|v| (l, v)))
        .ok_or(ValidationError::NoRootFolder)?;

    if !root.visible {
        return Err(ValidationError::RootFolderNotVisible);
    }

    let candidates: Vec<&Layer> = root
        .layers
        .iter()
        .filter(|l| l.visible && (!l.bounds.is_zero_area() || l.name.contains(SPACER_TAG)))
        .collect();
    let head = candidates.iter().copied().take(MAX_EXPORT_LAYERS).collect();

    Ok(StructureContext { document, root, variant, candidates, head })
}

/// Returns the exportable layers of `document` in document order.
pub fn validate_structure(document: &Document) -> Result<ExportLayerSet<'_>, ValidationError> {
    StructureValidator::new().validate(document)
}

/// A preview also needs a layer that covers the whole canvas.
pub fn validate_background_layer(document: &Document) -> Result<ExportLayerSet<'_>, ValidationError> {
    let set = validate_structure(document)?;
    if set.layers.iter().any(|l| l.bounds.covers(&document.bounds)) {
        Ok(set)
    } else {
        Err(ValidationError::NoBackgroundLayer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Bounds;

    fn full() -> Bounds {
        Bounds::new(0.0, 0.0, 100.0, 100.0)
    }

    fn doc_with(profile: &str, layers: Vec<Layer>) -> Document {
        Document {
            id: 1,
            file: None,
            profile: profile.to_string(),
            bounds: full(),
            resolution: 72.0,
            layers,
        }
    }

    fn art(children: Vec<Layer>) -> Document {
        doc_with("sRGB IEC61966-2.1", vec![Layer::container(100, "Art", children)])
    }

    fn leaves(names: &[&str]) -> Vec<Layer> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Layer::leaf(i as u32 + 1, *n, full()))
            .collect()
    }

    #[test]
    fn test_valid_structure_keeps_document_order() {
        let doc = art(leaves(&["Back", "Front"]));
        let set = validate_structure(&doc).unwrap();
        let names: Vec<_> = set.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Back", "Front"]);
        assert_eq!(set.variant, RootVariant::Art);
    }

    #[test]
    fn test_no_root_folder() {
        let doc = doc_with("sRGB IEC61966-2.1", leaves(&["a", "b"]));
        assert_eq!(validate_structure(&doc).unwrap_err(), ValidationError::NoRootFolder);
    }

    #[test]
    fn test_leaf_named_art_is_not_a_root() {
        let doc = doc_with("sRGB IEC61966-2.1", vec![Layer::leaf(1, "art", full())]);
        assert_eq!(validate_structure(&doc).unwrap_err(), ValidationError::NoRootFolder);
    }

    #[test]
    fn test_multiple_root_folders_anywhere_in_tree() {
        let mut children = leaves(&["a", "b"]);
        children.push(Layer::container(50, "ART-P3", leaves(&["c"])));
        let doc = art(children);
        assert_eq!(validate_structure(&doc).unwrap_err(), ValidationError::MultipleRootFolders);

        let doc = doc_with("sRGB IEC61966-2.1", vec![
            Layer::container(1, "art", leaves(&["a", "b"])),
            Layer::container(2, "art-p3@2x", leaves(&["a", "b"])),
        ]);
        assert_eq!(validate_structure(&doc).unwrap_err(), ValidationError::MultipleRootFolders);
    }

    #[test]
    fn test_hidden_root_folder() {
        let doc = doc_with("sRGB IEC61966-2.1", vec![Layer::container(1, "art", leaves(&["a", "b"])).hidden()]);
        assert_eq!(validate_structure(&doc).unwrap_err(), ValidationError::RootFolderNotVisible);
    }

    #[test]
    fn test_hidden_and_empty_children_are_skipped() {
        let mut children = leaves(&["a", "b"]);
        children.push(Layer::leaf(10, "hidden", full()).hidden());
        children.push(Layer::leaf(11, "empty", Bounds::default()));
        let doc = art(children);
        assert_eq!(validate_structure(&doc).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_spacer_is_kept() {
        let mut children = leaves(&["a"]);
        children.push(Layer::leaf(10, "top spacer", Bounds::default()));
        let doc = art(children);
        let set = validate_structure(&doc).unwrap();
        assert_eq!(set.layers[1].name, "top spacer");
    }

    #[test]
    fn test_empty_capitalized_spacer_is_dropped() {
        let mut children = leaves(&["a", "b"]);
        children.push(Layer::leaf(10, "Spacer", Bounds::default()));
        let doc = art(children);
        let set = validate_structure(&doc).unwrap();
        let names: Vec<_> = set.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let mut children = leaves(&["a"]);
        children.push(Layer::leaf(10, "Spacer", Bounds::default()));
        let doc = art(children);
        assert_eq!(validate_structure(&doc).unwrap_err(), ValidationError::NotEnoughLayers);
    }

    #[test]
    fn test_forbidden_characters() {
        for bad in ["a@2x", "a/b", "a,b"] {
            let doc = art(leaves(&["ok", bad]));
            assert!(matches!(
                validate_structure(&doc).unwrap_err(),
                ValidationError::InvalidLayerName { .. }
            ));
        }
    }

    #[test]
    fn test_names_must_be_unique_ignoring_case() {
        let doc = art(leaves(&["Sky", "sky"]));
        assert!(matches!(
            validate_structure(&doc).unwrap_err(),
            ValidationError::DuplicateLayerNames { .. }
        ));
    }

    #[test]
    fn test_sixth_layer_reports_count_not_name() {
        let doc = art(leaves(&["a", "b", "c", "d", "e", "a@bad"]));
        assert_eq!(
            validate_structure(&doc).unwrap_err(),
            ValidationError::TooManyLayers { count: 6 }
        );
        let doc = art(leaves(&["a", "b", "c", "d", "e", "A"]));
        assert_eq!(
            validate_structure(&doc).unwrap_err(),
            ValidationError::TooManyLayers { count: 6 }
        );
    }

    #[test]
    fn test_bad_name_in_head_wins_over_count() {
        let doc = art(leaves(&["a", "b@", "c", "d", "e", "f"]));
        assert!(matches!(
            validate_structure(&doc).unwrap_err(),
            ValidationError::InvalidLayerName { .. }
        ));
    }

    #[test]
    fn test_count_bounds() {
        assert_eq!(validate_structure(&art(vec![])).unwrap_err(), ValidationError::EmptyRootFolder);
        assert_eq!(validate_structure(&art(leaves(&["a"]))).unwrap_err(), ValidationError::NotEnoughLayers);
        for n in 2..=5 {
            let names: Vec<String> = (0..n).map(|i| format!("l{}", i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            assert_eq!(validate_structure(&art(leaves(&refs))).unwrap().len(), n);
        }
    }

    #[test]
    fn test_profile_checked_last() {
        let doc = doc_with("Display P3", vec![Layer::container(1, "art", leaves(&["a"]))]);
        assert_eq!(validate_structure(&doc).unwrap_err(), ValidationError::NotEnoughLayers);

        let doc = doc_with("Display P3", vec![Layer::container(1, "art", leaves(&["a", "b"]))]);
        assert!(matches!(
            validate_structure(&doc).unwrap_err(),
            ValidationError::ProfileMismatch { variant: RootVariant::Art, .. }
        ));
    }

    #[test]
    fn test_background_layer_required_for_preview_check() {
        let mut children = vec![Layer::leaf(1, "small", Bounds::new(10.0, 10.0, 20.0, 20.0))];
        children.push(Layer::leaf(2, "small2", Bounds::new(0.0, 0.0, 50.0, 100.0)));
        let doc = art(children);
        assert!(validate_structure(&doc).is_ok());
        assert_eq!(validate_background_layer(&doc).unwrap_err(), ValidationError::NoBackgroundLayer);

        let doc = art(leaves(&["back", "front"]));
        assert!(validate_background_layer(&doc).is_ok());
    }

    #[test]
    fn test_every_error_has_category() {
        assert_eq!(ValidationError::NoBackgroundLayer.category(), "previewValidationError");
        assert_eq!(ValidationError::TooManyLayers { count: 6 }.code(), "too_many_layers");
    }
}

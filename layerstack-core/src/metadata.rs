//! Metadata Assembly
//!
//! Builds the image-stack, image-set and manifest documents from the
//! validated layers and the geometry the layer pass computed. Assembly is
//! pure; [`MetadataSet::write`] does the file output.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::path::Path;

use crate::document::Document;
use crate::hashing::EmittedFile;
use crate::naming::{LayerNames, NamingConfig, Platform, IMAGE_SET_DIR, STACK_LAYER_EXT};
use crate::pipeline::{LayerPass, PipelineError};
use crate::progress::{self, ProgressObserver, ProgressStage};
use crate::validation::ExportLayerSet;
use crate::workspace::OutputMode;
use crate::{ENGINE_VERSION, SCHEMA_VERSION};

pub const CONTENTS_FILE: &str = "Contents.json";
pub const IDIOM_UNIVERSAL: &str = "universal";

pub fn author(platform: Platform) -> String {
    format!("photoshop lsr plugin({}) v{}", platform.label(), ENGINE_VERSION)
}

/// JSON number that prints integral values without a fraction (`100`, not `100.0`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Number(pub f64);

impl Serialize for Number {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_finite() && self.0.fract() == 0.0 && self.0.abs() < 9.0e15 {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Number {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub version: u32,
    pub author: String,
}

impl Info {
    pub fn new(platform: Platform) -> Self {
        Self { version: SCHEMA_VERSION, author: author(platform) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: Number,
    pub height: Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: Number,
    pub y: Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StackProperties {
    pub frame_size: Size,
    pub frame_center: Point,
}

/// `<name>.imagestacklayer/Contents.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStackMeta {
    pub info: Info,
    pub properties: StackProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImageEntry {
    pub idiom: String,
    pub filename: String,
    pub display_gamut: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
}

/// `<name>.imagestacklayer/Content.imageset/Contents.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSetMeta {
    pub info: Info,
    pub images: Vec<ImageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StructureDimensions {
    pub frame_size: Size,
    pub frame_center: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureEntry {
    pub dimensions: StructureDimensions,
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureDocument {
    pub dimensions: Size,
}

/// Preview-mode top-level manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureManifest {
    pub document: StructureDocument,
    pub layers: Vec<StructureEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalEntry {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalProperties {
    pub canvas_size: Size,
}

/// Final-mode top-level manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalManifest {
    pub layers: Vec<FinalEntry>,
    pub info: Info,
    pub properties: FinalProperties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerMetadata {
    pub names: LayerNames,
    pub stack: ImageStackMeta,
    pub image_set: ImageSetMeta,
}

/// All metadata of one run, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataSet {
    pub layers: Vec<LayerMetadata>,
    pub structure: StructureManifest,
    pub final_manifest: FinalManifest,
}

/// Names come from the layer pass records; geometry from its dimension table.
pub fn assemble(
    set: &ExportLayerSet<'_>,
    pass: &LayerPass,
    document: &Document,
    naming: &NamingConfig,
) -> Result<MetadataSet, PipelineError> {
    let profile = set.profile();
    let scale = profile.scale().map(str::to_string);
    let canvas = Size {
        width: Number(document.bounds.right),
        height: Number(document.bounds.bottom),
    };

    let mut layers = Vec::with_capacity(set.len());
    let mut structure_entries = Vec::with_capacity(set.len());
    let mut final_entries = Vec::with_capacity(set.len());

    for (index, layer) in set.layers.iter().enumerate() {
        let missing = || PipelineError::MissingDimensions(layer.name.clone());
        let record = pass
            .records
            .get(index)
            .filter(|r| r.layer_id == layer.id)
            .ok_or_else(missing)?;
        let dims = pass.dimensions.get(layer.id).ok_or_else(missing)?;
        let names = record.names.clone();

        let (cx, cy) = dims.center();
        let frame_size = Size { width: Number(dims.width), height: Number(dims.height) };
        let frame_center = Point { x: Number(cx), y: Number(cy) };

        let stack = ImageStackMeta {
            info: Info::new(naming.platform),
            properties: StackProperties { frame_size, frame_center },
        };
        let image_set = ImageSetMeta {
            info: Info::new(naming.platform),
            images: vec![ImageEntry {
                idiom: IDIOM_UNIVERSAL.to_string(),
                filename: names.filename.clone(),
                display_gamut: profile.display_gamut.to_string(),
                scale: scale.clone(),
            }],
        };

        structure_entries.push(StructureEntry {
            dimensions: StructureDimensions { frame_size, frame_center, scale: scale.clone() },
            path: names.relative_image_path(),
            name: names.sanitized.clone(),
        });
        final_entries.push(FinalEntry {
            filename: format!("{}.{}", names.sanitized, STACK_LAYER_EXT),
        });
        layers.push(LayerMetadata { names, stack, image_set });
    }

    Ok(MetadataSet {
        layers,
        structure: StructureManifest {
            document: StructureDocument { dimensions: canvas },
            layers: structure_entries,
        },
        final_manifest: FinalManifest {
            layers: final_entries,
            info: Info::new(naming.platform),
            properties: FinalProperties { canvas_size: canvas },
        },
    })
}

/// Pretty JSON with 2-space indentation.
pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(value)
}

impl MetadataSet {
    /// Writes per-layer metadata, then exactly one top-level manifest for
    /// `mode`. Stops at the first failure; files already written stay.
    pub fn write(
        &self,
        root: &Path,
        mode: OutputMode,
        progress: &mut dyn ProgressObserver,
    ) -> Result<Vec<EmittedFile>, PipelineError> {
        let mut emitted = Vec::with_capacity(self.layers.len() * 2 + 1);
        let total = self.layers.len();

        for (index, layer) in self.layers.iter().enumerate() {
            let stack_rel = format!("{}/{}", layer.names.stack_dir(), CONTENTS_FILE);
            let set_rel = format!("{}/{}/{}", layer.names.stack_dir(), IMAGE_SET_DIR, CONTENTS_FILE);

            emitted.push(write_json(root, &stack_rel, &layer.stack)?);
            emitted.push(write_json(root, &set_rel, &layer.image_set)?);
            progress::report(progress, ProgressStage::Metadata, index, total);
        }

        let manifest = match mode {
            OutputMode::Preview => write_json(root, CONTENTS_FILE, &self.structure)?,
            OutputMode::Final => write_json(root, CONTENTS_FILE, &self.final_manifest)?,
        };
        emitted.push(manifest);

        tracing::info!(root = %root.display(), ?mode, files = emitted.len(), "metadata written");
        Ok(emitted)
    }
}

fn write_json<T: Serialize>(root: &Path, relative: &str, value: &T) -> Result<EmittedFile, PipelineError> {
    let bytes = to_json_bytes(value)?;
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| PipelineError::io(parent, source))?;
    }
    fs::write(&path, &bytes).map_err(|source| PipelineError::io(&path, source))?;
    Ok(EmittedFile::from_bytes(relative, &bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Bounds, CalculatedDimensions, Layer};
    use crate::pipeline::LayerRecord;
    use crate::naming::SuffixMode;
    use crate::validation::validate_structure;

    fn document(profile: &str, root: &str) -> Document {
        Document {
            id: 1,
            file: None,
            profile: profile.to_string(),
            bounds: Bounds::new(0.0, 0.0, 200.0, 100.0),
            resolution: 144.0,
            layers: vec![Layer::container(10, root, vec![
                Layer::leaf(1, "Back", Bounds::new(0.0, 0.0, 200.0, 100.0)),
                Layer::leaf(2, "Front Star", Bounds::new(10.0, 20.0, 41.0, 60.0)),
            ])],
        }
    }

    fn naming() -> NamingConfig {
        NamingConfig { platform: Platform::Unix, suffix_mode: SuffixMode::Enabled }
    }

    /// What the layer pass would hand over for `set`.
    fn pass_for(set: &ExportLayerSet<'_>) -> LayerPass {
        let mut pass = LayerPass::default();
        for layer in &set.layers {
            let dimensions = CalculatedDimensions::from_bounds(&layer.bounds);
            let names = LayerNames::new(&layer.name, set.variant, &naming());
            pass.dimensions.record(layer.id, dimensions);
            pass.records.push(LayerRecord {
                layer_id: layer.id,
                name: layer.name.clone(),
                image: EmittedFile::from_bytes(names.relative_image_path(), b""),
                names,
                spacer: false,
                dimensions,
            });
        }
        pass
    }

    #[test]
    fn test_number_prints_integers_without_fraction() {
        assert_eq!(serde_json::to_string(&Number(100.0)).unwrap(), "100");
        assert_eq!(serde_json::to_string(&Number(25.5)).unwrap(), "25.5");
        assert_eq!(serde_json::to_string(&Number(-3.0)).unwrap(), "-3");
    }

    #[test]
    fn test_frame_center_and_names() {
        let doc = document("sRGB IEC61966-2.1", "art");
        let set = validate_structure(&doc).unwrap();
        let meta = assemble(&set, &pass_for(&set), &doc, &naming()).unwrap();

        let front = &meta.layers[1];
        assert_eq!(front.stack.properties.frame_size, Size { width: Number(31.0), height: Number(40.0) });
        assert_eq!(front.stack.properties.frame_center, Point { x: Number(25.5), y: Number(40.0) });
        assert_eq!(front.image_set.images[0].filename, "front-star-srgb.png");
        assert_eq!(front.image_set.images[0].display_gamut, "sRGB");
        assert_eq!(front.image_set.images[0].scale.as_deref(), Some("1x"));

        let entry = &meta.structure.layers[1];
        assert_eq!(entry.name, "front-star");
        assert_eq!(entry.path, "front-star.imagestacklayer/Content.imageset/front-star-srgb.png");
        assert_eq!(meta.final_manifest.layers[1].filename, "front-star.imagestacklayer");
    }

    #[test]
    fn test_names_are_taken_from_layer_records() {
        let doc = document("sRGB IEC61966-2.1", "art");
        let set = validate_structure(&doc).unwrap();
        let mut pass = pass_for(&set);
        pass.records[1].names = LayerNames { sanitized: "renamed".into(), filename: "renamed-srgb.png".into() };

        let meta = assemble(&set, &pass, &doc, &naming()).unwrap();
        assert_eq!(meta.layers[1].image_set.images[0].filename, "renamed-srgb.png");
        assert_eq!(meta.structure.layers[1].name, "renamed");
        assert_eq!(meta.final_manifest.layers[1].filename, "renamed.imagestacklayer");
    }

    #[test]
    fn test_p3_root_omits_scale() {
        let doc = document("Display P3", "Art-P3");
        let set = validate_structure(&doc).unwrap();
        let meta = assemble(&set, &pass_for(&set), &doc, &naming()).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&to_json_bytes(&meta.layers[0].image_set).unwrap()).unwrap();
        assert_eq!(json["images"][0]["display-gamut"], "display-P3");
        assert!(json["images"][0].get("scale").is_none());

        let json: serde_json::Value = serde_json::from_slice(&to_json_bytes(&meta.structure).unwrap()).unwrap();
        assert!(json["layers"][0]["dimensions"].get("scale").is_none());
        assert_eq!(json["document"]["dimensions"]["width"], 200);
    }

    #[test]
    fn test_missing_dimensions_is_an_error() {
        let doc = document("sRGB IEC61966-2.1", "art");
        let set = validate_structure(&doc).unwrap();
        let err = assemble(&set, &LayerPass::default(), &doc, &naming()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingDimensions(name) if name == "Back"));

        let mut pass = pass_for(&set);
        pass.dimensions = Default::default();
        let err = assemble(&set, &pass, &doc, &naming()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingDimensions(name) if name == "Back"));
    }

    #[test]
    fn test_json_layout_uses_two_space_indent_and_key_order() {
        let stack = ImageStackMeta {
            info: Info { version: 1, author: "a".into() },
            properties: StackProperties {
                frame_size: Size { width: Number(2.0), height: Number(4.0) },
                frame_center: Point { x: Number(1.0), y: Number(2.0) },
            },
        };
        let text = String::from_utf8(to_json_bytes(&stack).unwrap()).unwrap();
        assert!(text.starts_with("{\n  \"info\": {\n    \"version\": 1,"));
        assert!(text.find("frame-size").unwrap() < text.find("frame-center").unwrap());
    }
}

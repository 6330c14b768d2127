//! Document Model - Host Snapshot
//!
//! Read-only view of the host's layered document. The only derived state the
//! core produces about a layer (its calculated dimensions) lives in a side
//! table keyed by layer id, never on the host objects themselves.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to read document {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid document snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Layer id {0:?} is used by more than one layer")]
    DuplicateLayerId(LayerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u32);

/// Pixel rectangle as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Hosts report layers without pixels as a zero-area rectangle.
    pub fn is_zero_area(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn covers(&self, other: &Bounds) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    pub fn intersect(&self, other: &Bounds) -> Bounds {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        Bounds {
            left,
            top,
            right: self.right.min(other.right).max(left),
            bottom: self.bottom.min(other.bottom).max(top),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    #[serde(
        rename = "layer",
        alias = "textLayer",
        alias = "shapeLayer",
        alias = "smartObjectLayer",
        alias = "adjustmentLayer"
    )]
    Leaf,
    #[serde(rename = "layerSection")]
    Container,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub bounds: Bounds,
    #[serde(default)]
    pub layers: Vec<Layer>,
    /// Base64 RGBA8 raster covering `bounds`, present only in snapshots
    /// that carry pixel data for offline rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixels: Option<String>,
}

fn default_true() -> bool { true }

impl Layer {
    pub fn leaf(id: u32, name: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            id: LayerId(id),
            name: name.into(),
            kind: LayerKind::Leaf,
            visible: true,
            bounds,
            layers: vec![],
            pixels: None,
        }
    }

    pub fn container(id: u32, name: impl Into<String>, layers: Vec<Layer>) -> Self {
        Self {
            id: LayerId(id),
            name: name.into(),
            kind: LayerKind::Container,
            visible: true,
            bounds: Bounds::default(),
            layers,
            pixels: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn is_container(&self) -> bool {
        self.kind == LayerKind::Container
    }

    /// Spacers are zero-content placeholders exported as a canned 1x1 image.
    pub fn is_spacer(&self) -> bool {
        self.name.to_lowercase().contains("spacer")
    }

    /// Depth-first walk over this layer and all of its descendants.
    pub fn walk(&self) -> LayerWalk<'_> {
        LayerWalk { stack: vec![self] }
    }
}

pub struct LayerWalk<'a> {
    stack: Vec<&'a Layer>,
}

impl<'a> Iterator for LayerWalk<'a> {
    type Item = &'a Layer;

    fn next(&mut self) -> Option<Self::Item> {
        let layer = self.stack.pop()?;
        self.stack.extend(layer.layers.iter().rev());
        Some(layer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: u32,
    #[serde(default)]
    pub file: Option<PathBuf>,
    pub profile: String,
    pub bounds: Bounds,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

fn default_resolution() -> f64 { 72.0 }

impl Document {
    pub fn load_from_file(path: &Path) -> Result<Self, DocumentError> {
        let content = fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Document = serde_json::from_str(&content)?;
        document.check_unique_ids()?;
        Ok(document)
    }

    /// Geometry is keyed by layer id, so ids must be unique across the tree.
    pub fn check_unique_ids(&self) -> Result<(), DocumentError> {
        let mut seen = BTreeSet::new();
        match self.all_layers().find(|l| !seen.insert(l.id)) {
            Some(dup) => Err(DocumentError::DuplicateLayerId(dup.id)),
            None => Ok(()),
        }
    }

    /// Every layer in the document, depth first, in document order.
    pub fn all_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().flat_map(Layer::walk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalculatedDimensions {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CalculatedDimensions {
    /// Canned geometry for spacer layers.
    pub const UNIT: Self = Self { x: 0.0, y: 0.0, width: 1.0, height: 1.0 };

    pub fn from_bounds(bounds: &Bounds) -> Self {
        let left = bounds.left.round();
        let top = bounds.top.round();
        let right = bounds.right.round();
        let bottom = bounds.bottom.round();
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Geometry computed during the layer pass, consumed by metadata assembly.
#[derive(Debug, Clone, Default)]
pub struct DimensionTable {
    entries: BTreeMap<LayerId, CalculatedDimensions>,
}

impl DimensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: LayerId, dimensions: CalculatedDimensions) {
        self.entries.insert(id, dimensions);
    }

    pub fn get(&self, id: LayerId) -> Option<&CalculatedDimensions> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

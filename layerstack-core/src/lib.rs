//! LayerStack Core - Layered Image Stack Exporter
//!
//! Turns a layered document into an image-stack asset tree: one
//! `<layer>.imagestacklayer/Content.imageset/<layer>.png` per exported layer
//! plus `Contents.json` metadata at every level.
//!
//! # The Rules
//! 1. Validation Runs First, Every Time
//! 2. First Failure Wins
//! 3. One Layer At A Time
//! 4. Names Are Computed Once
//! 5. Metadata Is A Pure Function Of Layers And Geometry

pub mod config;
pub mod document;
pub mod hashing;
pub mod host;
pub mod metadata;
pub mod naming;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod validation;
pub mod workspace;

pub use config::GeneratorConfig;
pub use document::{Bounds, CalculatedDimensions, DimensionTable, Document, Layer, LayerId, LayerKind};
pub use hashing::{canonical_json, compute_report_hash, sha256_hex, EmittedFile};
pub use host::{PixmapEncoder, PngEncoder, Rasterizer, SnapshotRasterizer, SpacerAssets};
pub use naming::{filename_for, sanitize, Platform, SuffixMode};
pub use pipeline::{GenerationReport, Generator, LayerPipeline, PipelineError, RunReport};
pub use profile::{ColorProfile, RootVariant};
pub use progress::{ProgressObserver, ProgressStage};
pub use validation::{validate_background_layer, validate_structure, ExportLayerSet, ValidationError};
pub use workspace::{OutputMode, PlatformInfo, Workspace};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
/// `info.version` written into every metadata document.
pub const SCHEMA_VERSION: u32 = 1;

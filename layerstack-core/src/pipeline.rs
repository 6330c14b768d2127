//! Generation Pipeline - Single Entry Point
//!
//! Every generation validates the document structure first. Layers are then
//! processed strictly one after another, and the first failure ends the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::{CalculatedDimensions, DimensionTable, Document, Layer, LayerId};
use crate::hashing::{compute_report_hash, EmittedFile, HashingWriter};
use crate::host::{EncodeSettings, HostError, OutputFormat, PixmapEncoder, PixmapRequest, Rasterizer, SpacerAssets};
use crate::metadata;
use crate::naming::{LayerNames, NamingConfig, IMAGE_SET_DIR};
use crate::profile::RootVariant;
use crate::progress::{self, NoProgress, ProgressObserver, ProgressStage};
use crate::validation::{validate_background_layer, validate_structure, ExportLayerSet, ValidationError};
use crate::workspace::{OutputMode, Workspace};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    ValidationFailed(#[from] ValidationError),

    #[error("Failed to rasterize layer \"{layer}\": {source}")]
    Rasterize {
        layer: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to encode {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: HostError,
    },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No calculated dimensions for layer \"{0}\"")]
    MissingDimensions(String),

    #[error("Layer id {0:?} appears more than once in the export set")]
    DuplicateLayerId(LayerId),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationFailed(_))
    }
}

/// Per-layer processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerState {
    Pending,
    PixmapRequested,
    DimensionsComputed,
    FileWritten,
    Done,
    Failed,
}

/// One layer that reached [`LayerState::Done`].
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRecord {
    pub layer_id: LayerId,
    pub name: String,
    pub names: LayerNames,
    pub spacer: bool,
    pub dimensions: CalculatedDimensions,
    pub image: EmittedFile,
}

/// Everything the layer pass hands to metadata assembly.
#[derive(Debug, Clone, Default)]
pub struct LayerPass {
    pub records: Vec<LayerRecord>,
    pub dimensions: DimensionTable,
}

/// Processes the export set one layer per `next()`; stops after the first
/// error. Layer N+1's pixmap is never requested before layer N is written.
pub struct LayerPipeline<'a> {
    set: &'a ExportLayerSet<'a>,
    document: &'a Document,
    rasterizer: &'a dyn Rasterizer,
    encoder: &'a dyn PixmapEncoder,
    spacer: &'a [u8],
    naming: NamingConfig,
    root: &'a Path,
    mode: OutputMode,
    index: usize,
    failed: bool,
}

impl<'a> LayerPipeline<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        set: &'a ExportLayerSet<'a>,
        document: &'a Document,
        rasterizer: &'a dyn Rasterizer,
        encoder: &'a dyn PixmapEncoder,
        spacers: &'a SpacerAssets,
        naming: NamingConfig,
        root: &'a Path,
        mode: OutputMode,
    ) -> Self {
        Self {
            set,
            document,
            rasterizer,
            encoder,
            spacer: spacers.for_variant(set.variant),
            naming,
            root,
            mode,
            index: 0,
            failed: false,
        }
    }

    /// Drain the pipeline, reporting progress after each finished layer.
    pub fn run(mut self, progress: &mut dyn ProgressObserver) -> Result<LayerPass, PipelineError> {
        let total = self.set.len();
        let mut seen = BTreeSet::new();
        if let Some(dup) = self.set.layers.iter().find(|l| !seen.insert(l.id)) {
            return Err(PipelineError::DuplicateLayerId(dup.id));
        }

        let mut pass = LayerPass::default();
        while let Some(result) = self.next() {
            let record = result?;
            pass.dimensions.record(record.layer_id, record.dimensions);
            progress::report(progress, ProgressStage::Layers, pass.records.len(), total);
            pass.records.push(record);
        }
        Ok(pass)
    }

    fn process(&self, layer: &Layer) -> Result<LayerRecord, PipelineError> {
        let mut state = LayerState::Pending;
        let result = self.advance(layer, &mut state);
        if result.is_err() {
            transition(layer, &mut state, LayerState::Failed);
        }
        result
    }

    fn advance(&self, layer: &Layer, state: &mut LayerState) -> Result<LayerRecord, PipelineError> {
        let profile = self.set.profile();
        let names = LayerNames::new(&layer.name, self.set.variant, &self.naming);
        let spacer = layer.is_spacer();

        transition(layer, state, LayerState::PixmapRequested);
        let request = PixmapRequest {
            document_id: self.document.id,
            layer_id: layer.id,
            clip_to: Some(self.document.bounds),
            icc_profile: profile.editor_profile,
            include_icc_data: true,
        };
        let pixmap = self
            .rasterizer
            .get_pixmap(layer, &request)
            .map_err(|source| PipelineError::Rasterize { layer: layer.name.clone(), source })?;

        let dimensions = if spacer {
            CalculatedDimensions::UNIT
        } else {
            CalculatedDimensions::from_bounds(&pixmap.bounds)
        };
        transition(layer, state, LayerState::DimensionsComputed);

        let dir = self.root.join(names.stack_dir()).join(IMAGE_SET_DIR);
        fs::create_dir_all(&dir).map_err(|source| PipelineError::io(&dir, source))?;
        let path = dir.join(&names.filename);

        let digest = if spacer {
            write_spacer(&path, self.spacer)?
        } else {
            let settings = EncodeSettings {
                format: OutputFormat::Png,
                ppi: self.document.resolution,
                scale: match self.mode {
                    OutputMode::Preview => Some(1),
                    OutputMode::Final => None,
                },
                icc_profile: profile.editor_profile,
            };
            stream_to_file(self.encoder, &pixmap, &path, &settings)?
        };
        transition(layer, state, LayerState::FileWritten);

        let record = LayerRecord {
            layer_id: layer.id,
            name: layer.name.clone(),
            image: EmittedFile { path: names.relative_image_path(), sha256: digest },
            names,
            spacer,
            dimensions,
        };
        transition(layer, state, LayerState::Done);
        Ok(record)
    }
}

impl<'a> Iterator for LayerPipeline<'a> {
    type Item = Result<LayerRecord, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let layer = *self.set.layers.get(self.index)?;
        let result = self.process(layer);
        match result {
            Ok(_) => self.index += 1,
            Err(_) => self.failed = true,
        }
        Some(result)
    }
}

fn transition(layer: &Layer, state: &mut LayerState, next: LayerState) {
    debug!(layer = %layer.name, from = ?state, to = ?next, "layer state");
    *state = next;
}

fn write_spacer(path: &Path, bytes: &[u8]) -> Result<String, PipelineError> {
    match fs::write(path, bytes) {
        Ok(()) => Ok(crate::hashing::sha256_hex(bytes)),
        Err(source) => {
            remove_partial(path);
            Err(PipelineError::io(path, source))
        }
    }
}

fn stream_to_file(
    encoder: &dyn PixmapEncoder,
    pixmap: &crate::host::Pixmap,
    path: &Path,
    settings: &EncodeSettings,
) -> Result<String, PipelineError> {
    let file = File::create(path).map_err(|source| PipelineError::io(path, source))?;
    let mut writer = HashingWriter::new(BufWriter::new(file));

    let result = match encoder.stream_pixmap(pixmap, &mut writer, settings) {
        Ok(()) => writer
            .finish()
            .map(|(_, digest)| digest)
            .map_err(|source| PipelineError::io(path, source)),
        Err(source) => {
            drop(writer);
            Err(PipelineError::Encode { path: path.to_path_buf(), source })
        }
    };

    if result.is_err() {
        remove_partial(path);
    }
    result
}

/// Delete whatever a failed write left behind at `path`.
fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove partial output");
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub name: String,
    pub sanitized_name: String,
    pub spacer: bool,
    pub dimensions: CalculatedDimensions,
    pub image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub engine_version: String,
    pub mode: OutputMode,
    pub root_variant: RootVariant,
    pub output_root: PathBuf,
    pub layers: Vec<LayerReport>,
    pub files: Vec<EmittedFile>,
    /// Identical for runs that emit identical files.
    pub report_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub preview: Option<GenerationReport>,
    #[serde(rename = "final")]
    pub final_pass: GenerationReport,
}

/// Bundles a document with its collaborators and output layout.
pub struct Generator<'a> {
    document: &'a Document,
    workspace: Workspace,
    naming: NamingConfig,
    spacers: SpacerAssets,
    rasterizer: &'a dyn Rasterizer,
    encoder: &'a dyn PixmapEncoder,
}

impl<'a> Generator<'a> {
    pub fn new(
        document: &'a Document,
        workspace: Workspace,
        naming: NamingConfig,
        rasterizer: &'a dyn Rasterizer,
        encoder: &'a dyn PixmapEncoder,
    ) -> Self {
        Self {
            document,
            workspace,
            naming,
            spacers: SpacerAssets::builtin(),
            rasterizer,
            encoder,
        }
    }

    pub fn with_spacers(mut self, spacers: SpacerAssets) -> Self {
        self.spacers = spacers;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Clear previous output and recreate the output roots.
    pub fn setup(&self, include_preview: bool) -> Result<(), PipelineError> {
        self.workspace
            .reset(include_preview)
            .map_err(|source| PipelineError::io(&self.workspace.save_dir, source))
    }

    /// Can a preview be built at all? Needs a full-canvas background layer.
    pub fn check_preview(&self) -> Result<(), ValidationError> {
        validate_background_layer(self.document).map(|_| ())
    }

    pub fn generate_preview(
        &self,
        progress: Option<&mut dyn ProgressObserver>,
    ) -> Result<GenerationReport, PipelineError> {
        self.generate(OutputMode::Preview, progress)
    }

    pub fn generate_final(
        &self,
        progress: Option<&mut dyn ProgressObserver>,
    ) -> Result<GenerationReport, PipelineError> {
        self.generate(OutputMode::Final, progress)
    }

    /// Preview pass when requested, then the final pass.
    pub fn run(
        &self,
        include_preview: bool,
        progress: Option<&mut dyn ProgressObserver>,
    ) -> Result<RunReport, PipelineError> {
        let mut noop = NoProgress;
        let progress: &mut dyn ProgressObserver = match progress {
            Some(observer) => observer,
            None => &mut noop,
        };
        let preview = if include_preview {
            Some(self.generate_with(OutputMode::Preview, &mut *progress)?)
        } else {
            info!("skipping preview");
            None
        };
        let final_pass = self.generate_with(OutputMode::Final, progress)?;
        Ok(RunReport { preview, final_pass })
    }

    pub fn generate(
        &self,
        mode: OutputMode,
        progress: Option<&mut dyn ProgressObserver>,
    ) -> Result<GenerationReport, PipelineError> {
        match progress {
            Some(observer) => self.generate_with(mode, observer),
            None => self.generate_with(mode, &mut NoProgress),
        }
    }

    /// Validate, render every layer in order, then write metadata.
    #[tracing::instrument(skip(self, progress), fields(document = self.document.id))]
    fn generate_with(
        &self,
        mode: OutputMode,
        progress: &mut dyn ProgressObserver,
    ) -> Result<GenerationReport, PipelineError> {
        let set = validate_structure(self.document)?;
        let profile = set.profile();
        let root = mode.root_in(&self.workspace);

        info!(
            profile = %self.document.profile,
            root = %set.root.name,
            layers = set.len(),
            "generating assets"
        );
        if !self.document.profile.eq_ignore_ascii_case(profile.editor_profile) {
            info!("modifying image profile for exported images to {}", profile.editor_profile);
        }

        let pass = LayerPipeline::new(
            &set,
            self.document,
            self.rasterizer,
            self.encoder,
            &self.spacers,
            self.naming,
            root,
            mode,
        )
        .run(&mut *progress)?;

        let meta = metadata::assemble(&set, &pass, self.document, &self.naming)?;
        let mut files: Vec<EmittedFile> = pass.records.iter().map(|r| r.image.clone()).collect();
        files.extend(meta.write(root, mode, progress)?);

        let report_hash = compute_report_hash(&files)?;
        Ok(GenerationReport {
            run_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
            mode,
            root_variant: set.variant,
            output_root: root.to_path_buf(),
            layers: pass
                .records
                .into_iter()
                .map(|r| LayerReport {
                    image: r.image.path,
                    sanitized_name: r.names.sanitized,
                    name: r.name,
                    spacer: r.spacer,
                    dimensions: r.dimensions,
                })
                .collect(),
            files,
            report_hash,
        })
    }
}

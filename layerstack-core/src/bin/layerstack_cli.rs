//! LayerStack CLI - Bridge interface for the image host
//!
//! Commands: validate, check-preview, paths, generate
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on validation failure, 1 on any other error

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

use layerstack_core::{
    validate_background_layer, validate_structure, Document, Generator, GeneratorConfig,
    PipelineError, PlatformInfo, PngEncoder, ProgressObserver, ProgressStage, SnapshotRasterizer, ValidationError,
    Workspace,
};

#[derive(Parser)]
#[command(name = "layerstack-cli")]
#[command(about = "LayerStack CLI - Layered Image Stack Exporter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a generator config (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the document structure can be exported
    Validate {
        /// Document snapshot (JSON)
        #[arg(short, long)]
        document: PathBuf,
    },

    /// Check that a preview can be built (needs a full-canvas background layer)
    CheckPreview {
        #[arg(short, long)]
        document: PathBuf,
    },

    /// Print the output layout derived for the document
    Paths {
        #[arg(short, long)]
        document: PathBuf,
    },

    /// Export the image stack
    Generate {
        #[arg(short, long)]
        document: PathBuf,

        /// Also run the preview pass
        #[arg(long)]
        preview: bool,

        /// Write bare `<name>.png` files without profile suffixes
        #[arg(long)]
        no_suffixes: bool,

        /// Do not clear previous output first
        #[arg(long)]
        keep_existing: bool,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("failed to serialize output: {}", e),
    }
}

fn validation_failure(err: &ValidationError) -> ExitCode {
    print_json(&serde_json::json!({
        "valid": false,
        "category": err.category(),
        "code": err.code(),
        "error": err.to_string(),
    }));
    ExitCode::from(2)
}

fn failure(message: String) -> ExitCode {
    print_json(&serde_json::json!({ "success": false, "error": message }));
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => match GeneratorConfig::load_from_file(path) {
            Ok(c) => c,
            Err(e) => return failure(e.to_string()),
        },
        None => GeneratorConfig::default(),
    };

    let document_path = match &cli.command {
        Commands::Validate { document }
        | Commands::CheckPreview { document }
        | Commands::Paths { document }
        | Commands::Generate { document, .. } => document.clone(),
    };
    let document = match Document::load_from_file(&document_path) {
        Ok(d) => d,
        Err(e) => return failure(e.to_string()),
    };

    match cli.command {
        Commands::Validate { .. } => match validate_structure(&document) {
            Ok(set) => {
                let layers: Vec<_> = set.layers.iter().map(|l| l.name.clone()).collect();
                print_json(&serde_json::json!({
                    "valid": true,
                    "root": set.variant,
                    "layers": layers,
                }));
                ExitCode::SUCCESS
            }
            Err(e) => validation_failure(&e),
        },

        Commands::CheckPreview { .. } => match validate_background_layer(&document) {
            Ok(_) => {
                print_json(&serde_json::json!({ "valid": true }));
                ExitCode::SUCCESS
            }
            Err(e) => validation_failure(&e),
        },

        Commands::Paths { .. } => {
            let info = PlatformInfo::detect_for(config.platform);
            let workspace = Workspace::derive(document.file.as_deref(), &info);
            match serde_json::to_value(&workspace) {
                Ok(v) => {
                    print_json(&v);
                    ExitCode::SUCCESS
                }
                Err(e) => failure(e.to_string()),
            }
        }

        Commands::Generate { preview, no_suffixes, keep_existing, .. } => {
            if preview {
                config.needs_preview = true;
            }
            if no_suffixes {
                config.use_suffixes_in_filenames = false;
            }

            let spacers = match config.spacer_assets() {
                Ok(s) => s,
                Err(e) => return failure(e.to_string()),
            };
            let info = PlatformInfo::detect_for(config.platform);
            let workspace = Workspace::derive(document.file.as_deref(), &info);
            let generator = Generator::new(
                &document,
                workspace,
                config.naming(),
                &SnapshotRasterizer,
                &PngEncoder,
            )
            .with_spacers(spacers);

            if !keep_existing {
                if let Err(e) = generator.setup(config.needs_preview) {
                    return failure(e.to_string());
                }
            }

            let mut log_progress = |stage: ProgressStage, percent: f64| {
                tracing::info!(?stage, percent, "progress");
            };
            let progress: &mut dyn ProgressObserver = &mut log_progress;

            match generator.run(config.needs_preview, Some(progress)) {
                Ok(report) => {
                    print_json(&serde_json::json!({
                        "success": true,
                        "report": report,
                    }));
                    ExitCode::SUCCESS
                }
                Err(PipelineError::ValidationFailed(e)) => validation_failure(&e),
                Err(e) => failure(e.to_string()),
            }
        }
    }
}

//! urho-export - scene export tool
//!
//! Converts a scene description (JSON dump of the authoring tool) into
//! Urho3D resources: .mdl models, .ani animations, material and prefab XML.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use urho_common::{element_names, AnimationSummary, ModelSummary, ANIMATION_MAGIC, MODEL_MAGIC};
use urho_export::config::{load_settings, ExportSettings};
use urho_export::{export_materials, export_scene, ExportConfig, ExportOutcome, MemoryScene};

#[derive(Parser)]
#[command(name = "urho-export")]
#[command(about = "Urho3D scene export tool")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export models, animations, materials and prefabs of a scene
    Export {
        /// Scene description (JSON)
        scene: PathBuf,

        /// Export settings (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory (overrides settings)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fixed seed for node IDs and file ids
        #[arg(long)]
        seed: Option<u32>,
    },

    /// Export only the materials of a scene
    Materials {
        /// Scene description (JSON)
        scene: PathBuf,

        /// Export settings (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory (overrides settings)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate settings without exporting
    Check {
        /// Export settings (TOML)
        config: PathBuf,
    },

    /// Print the structure of an exported .mdl or .ani file
    Inspect {
        input: PathBuf,
    },
}

fn settings(config: Option<&Path>, output: Option<PathBuf>, seed: Option<u32>) -> Result<ExportConfig> {
    let mut settings = match config {
        Some(path) => load_settings(path)?,
        None => ExportSettings::default(),
    };
    if let Some(output) = output {
        settings.output.path = output;
    }
    if seed.is_some() {
        settings.scene.id_seed = seed;
    }
    Ok(settings.validate()?)
}

fn report(outcome: &ExportOutcome) -> Result<()> {
    let summary = outcome.report.summary();
    if !summary.is_empty() {
        println!("{}", summary.trim_end());
    }
    for category in outcome.ledger.names_with_errors() {
        println!("{}: {} vertices", category, outcome.ledger.count(category));
    }
    println!("{} files written", outcome.written.len());
    if !outcome.success {
        anyhow::bail!("Export finished with errors");
    }
    Ok(())
}

fn inspect(input: &Path) -> Result<()> {
    let data = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    if data.starts_with(MODEL_MAGIC) {
        let model = ModelSummary::parse(&data).with_context(|| format!("Invalid model {:?}", input))?;
        println!("Model {:?}", input);
        for (i, vb) in model.vertex_buffers.iter().enumerate() {
            println!(
                "  vertex buffer {}: {} vertices [{}] morph range {}+{}",
                i,
                vb.vertex_count,
                element_names(vb.element_mask).join(", "),
                vb.morph_range_start,
                vb.morph_range_count
            );
        }
        for (i, ib) in model.index_buffers.iter().enumerate() {
            println!("  index buffer {}: {} x {} bytes", i, ib.index_count, ib.index_size);
        }
        for (i, geometry) in model.geometries.iter().enumerate() {
            println!(
                "  geometry {}: {} LODs, {} mapped bones",
                i,
                geometry.lod_levels.len(),
                geometry.bone_mapping.len()
            );
        }
        for morph in &model.morphs {
            println!("  morph {} ({} buffers)", morph.name, morph.buffers.len());
        }
        for bone in &model.bones {
            println!("  bone {} parent {}", bone.name, bone.parent_index);
        }
        let (min, max) = model.bounding_box;
        println!("  bounds {} .. {}", min, max);
    } else if data.starts_with(ANIMATION_MAGIC) {
        let animation =
            AnimationSummary::parse(&data).with_context(|| format!("Invalid animation {:?}", input))?;
        println!("Animation {} ({}s)", animation.name, animation.length);
        for track in &animation.tracks {
            println!(
                "  track {} mask {:#x}: {} keyframes",
                track.name,
                track.mask,
                track.keyframe_times.len()
            );
        }
    } else {
        anyhow::bail!("Unknown file type: {:?}", input);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match cli.command {
        Commands::Export {
            scene,
            config,
            output,
            seed,
        } => {
            let config = settings(config.as_deref(), output, seed)?;
            let source = MemoryScene::load(&scene)?;
            let outcome = export_scene(&source, &config)?;
            report(&outcome)?;
        }

        Commands::Materials {
            scene,
            config,
            output,
        } => {
            let config = settings(config.as_deref(), output, None)?;
            let source = MemoryScene::load(&scene)?;
            let outcome = export_materials(&source, &config)?;
            report(&outcome)?;
        }

        Commands::Check { config } => {
            tracing::info!("Checking settings {:?}", config);
            let config = load_settings(&config)?.validate()?;
            for note in config.notes() {
                println!("note: {}", note);
            }
            tracing::info!("Settings are valid!");
        }

        Commands::Inspect { input } => inspect(&input)?,
    }

    Ok(())
}

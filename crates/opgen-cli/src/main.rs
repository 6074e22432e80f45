use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opgen_contracts::OPGEN_MANIFEST_SCHEMA_VERSION;
use opgen_core::{Generator, MappingFile};

#[derive(Parser, Debug)]
#[command(name = "opgen")]
#[command(about = "Deterministic operator generator: annotated C++ declarations + op graphs -> engine-backed kernels.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one C++ source file.
    Gen {
        /// Header with the annotated host declarations.
        #[arg(long)]
        decls: PathBuf,
        /// Mapping file (opgen.mappings@0.1.0).
        #[arg(long)]
        mappings: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Prefix for generated function names; overrides the mapping file.
        #[arg(long)]
        prefix: Option<String>,
        /// If set, fail if output differs; do not write.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Generate every entry of a manifest.
    Batch {
        #[arg(long)]
        manifest: PathBuf,
        /// If set, fail if any output differs; do not write.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Print the diagnostics catalog as markdown.
    Diagnostics,
}

fn main() -> Result<()> {
    init_tracing();
    try_main().map_err(|err| {
        eprintln!("{err:#}");
        err
    })
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opgen=info,opgen_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Gen {
            decls,
            mappings,
            out,
            prefix,
            check,
        } => run_gen(&decls, &mappings, &out, prefix.as_deref(), check),
        Command::Batch { manifest, check } => run_batch(&manifest, check),
        Command::Diagnostics => {
            print!("{}", opgen_core::diagnostics::render_diagnostics_md());
            Ok(())
        }
    }
}

fn run_gen(
    decls_path: &Path,
    mappings_path: &Path,
    out_path: &Path,
    prefix: Option<&str>,
    check: bool,
) -> Result<()> {
    let src = std::fs::read_to_string(decls_path)
        .with_context(|| format!("read declarations: {}", decls_path.display()))?;
    let bytes = std::fs::read(mappings_path)
        .with_context(|| format!("read mappings: {}", mappings_path.display()))?;
    let file = MappingFile::from_slice(&bytes)
        .with_context(|| format!("parse mappings: {}", mappings_path.display()))?;

    let mut generator = Generator::from_mapping_file(&file)
        .with_context(|| format!("build mappings: {}", mappings_path.display()))?;
    if let Some(prefix) = prefix {
        generator.options_mut().function_name_prefix = Some(prefix.to_string());
    }

    let origin = decls_path.display().to_string();
    let output = generator
        .run(&src, &origin)
        .with_context(|| format!("generate from {origin}"))?;
    tracing::info!(
        out = %out_path.display(),
        functions = output.generated.len(),
        "generated"
    );
    write_output(out_path, &output.text, check)
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    schema_version: String,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestEntry {
    decls: String,
    mappings: String,
    out: String,
    #[serde(default)]
    prefix: Option<String>,
}

fn run_batch(manifest_path: &Path, check: bool) -> Result<()> {
    let bytes = std::fs::read(manifest_path)
        .with_context(|| format!("read manifest: {}", manifest_path.display()))?;
    let m: Manifest = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse manifest JSON: {}", manifest_path.display()))?;
    if m.schema_version.trim() != OPGEN_MANIFEST_SCHEMA_VERSION {
        anyhow::bail!(
            "manifest schema_version mismatch: expected {OPGEN_MANIFEST_SCHEMA_VERSION} got {:?}",
            m.schema_version
        );
    }

    // Relative entries are resolved against the manifest's directory.
    let base = manifest_path.parent().unwrap_or_else(|| Path::new(""));
    for (idx, e) in m.entries.iter().enumerate() {
        run_gen(
            &base.join(&e.decls),
            &base.join(&e.mappings),
            &base.join(&e.out),
            e.prefix.as_deref(),
            check,
        )
        .with_context(|| format!("manifest entry[{idx}] {}", e.out))?;
    }
    Ok(())
}

fn write_output(out_path: &Path, src: &str, check: bool) -> Result<()> {
    if check {
        let cur = std::fs::read_to_string(out_path)
            .with_context(|| format!("read existing output: {}", out_path.display()))?;
        if cur != src {
            anyhow::bail!("generated output differs: {}", out_path.display());
        }
        return Ok(());
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }
    std::fs::write(out_path, src.as_bytes())
        .with_context(|| format!("write output: {}", out_path.display()))?;
    Ok(())
}

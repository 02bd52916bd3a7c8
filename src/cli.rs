// ============================================================================
// paintfe-core CLI — headless batch editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   paintfe-core -i photo.png --op gaussian-blur:sigma=3 -o result.png
//   paintfe-core -i photo.png --op select:x0=10,y0=10,x1=90,y1=90 --op invert-colors -o out.png
//   paintfe-core -i "shots/*.jpg" --op desaturate --output-dir processed/ --format png
//   paintfe-core -i photo.png --op fill:color=#ff0000 --op mean-blur --undo 1 -o out.png
//   paintfe-core --list-ops
//
// Every --op runs through the same path an interactive host uses: the
// operation applies to the workspace and publishes its history step, which
// the history records.  --undo then walks the history back.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use serde_json::json;

use crate::components::history::History;
use crate::error::EditError;
use crate::io::{ImageFileSurface, SaveFormat};
use crate::ops::{Operation, all_operations, find_operation};
use crate::params::Parameters;
use crate::settings::EditorSettings;
use crate::workspace::Workspace;
use crate::{log_err, log_info};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// paintfe-core headless image editor.
///
/// Apply tools and effects to image files without a GUI.
#[derive(Parser, Debug)]
#[command(
    name = "paintfe-core",
    about = "Headless layered image editing core",
    long_about = "Apply tools and effects to image files through the editing core.\n\
                  Operations are recorded in history exactly as in the editor,\n\
                  so --undo N reverts the last N of them before saving.\n\n\
                  Example:\n  \
                  paintfe-core -i photo.png --op gaussian-blur:sigma=3 -o result.png\n  \
                  paintfe-core --list-ops"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, num_args = 1.., required_unless_present = "list_ops")]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, tga, tiff.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Operation to apply, in order: NAME or NAME:key=value,key=value.
    /// Colours are written #rrggbb or #rrggbbaa.
    #[arg(long = "op", value_name = "NAME[:k=v,...]")]
    pub ops: Vec<String>,

    /// Undo this many recorded steps before saving.
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub undo: usize,

    /// Settings file (key=value). Defaults to the platform config location.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Session log file. Defaults to the platform data directory.
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Print every operation and its parameter descriptors as JSON, then exit.
    #[arg(long)]
    pub list_ops: bool,

    /// Print per-file timing and history information.
    #[arg(short, long)]
    pub verbose: bool,
}

/// One parsed `--op` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct OpSpec {
    pub name: String,
    pub args: Vec<(String, String)>,
}

impl OpSpec {
    /// Parse `name` or `name:k=v,k=v`.  A comma-separated piece without `=`
    /// continues the previous value, so `color=1,2,3` stays whole.
    pub fn parse(spec: &str) -> Result<Self, EditError> {
        let (name, rest) = match spec.split_once(':') {
            Some((n, r)) => (n.trim(), Some(r)),
            None => (spec.trim(), None),
        };
        if name.is_empty() {
            return Err(EditError::UnknownOperation(spec.to_string()));
        }
        let mut args: Vec<(String, String)> = Vec::new();
        for piece in rest.into_iter().flat_map(|r| r.split(',')) {
            match piece.split_once('=') {
                Some((k, v)) => args.push((k.trim().to_string(), v.trim().to_string())),
                None => match args.last_mut() {
                    Some((_, v)) => {
                        v.push(',');
                        v.push_str(piece.trim());
                    }
                    None if piece.trim().is_empty() => {}
                    None => {
                        return Err(EditError::invalid_param(piece.trim(), "expected key=value"));
                    }
                },
            }
        }
        Ok(Self {
            name: name.to_string(),
            args,
        })
    }

    /// Resolve the operation and fill its parameters.
    pub fn resolve(&self) -> Result<(Box<dyn Operation>, Parameters), EditError> {
        let op = find_operation(&self.name)?;
        let mut params = op.parameters();
        for (k, v) in &self.args {
            params.set_from_str(k, v)?;
        }
        Ok((op, params))
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    if args.list_ops {
        return list_ops();
    }

    let settings = match &args.settings {
        Some(path) => EditorSettings::load_from(path),
        None => EditorSettings::load(),
    };
    crate::logger::set_level(settings.log_level);

    // Parse every --op up front so a typo fails before any file is touched.
    let mut ops = Vec::with_capacity(args.ops.len());
    for spec in &args.ops {
        match OpSpec::parse(spec).and_then(|s| s.resolve()) {
            Ok(resolved) => ops.push(resolved),
            Err(e) => {
                eprintln!("error: --op '{}': {}", spec, e);
                return ExitCode::FAILURE;
            }
        }
    }

    // Resolve glob patterns / literal paths → concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let format = match args.format.as_deref() {
        Some(f) => match SaveFormat::from_name(f) {
            Some(format) => format,
            None => {
                eprintln!("error: unknown output format '{}'.", f);
                return ExitCode::FAILURE;
            }
        },
        None => args.output.as_deref().map_or(SaveFormat::Png, SaveFormat::from_path),
    };

    // Create output directory if specified
    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        let mut surface = ImageFileSurface::new(input_path, &output_path)
            .with_format(format)
            .with_quality(args.quality);

        match run_one(&mut surface, &ops, &settings, args.undo) {
            Ok(history) => {
                log_info!("{} -> {}", input_path.display(), output_path.display());
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
                if args.verbose {
                    for desc in history.undo_history() {
                        println!("  [history] {}", desc);
                    }
                }
            }
            Err(e) => {
                log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

/// Load, apply every operation through the history, undo, present.
pub fn run_one(
    surface: &mut ImageFileSurface,
    ops: &[(Box<dyn Operation>, Parameters)],
    settings: &EditorSettings,
    undo: usize,
) -> Result<History, EditError> {
    let mut workspace = Workspace::from_surface(surface)?;
    let mut history = History::from_settings(settings);

    for (op, params) in ops {
        op.apply(&mut workspace, params, &mut history)?;
    }

    let undone = history.undo_to(undo, &mut workspace);
    if undone < undo {
        log_info!("Requested {} undos, history held {}", undo, undone);
    }

    workspace.present(surface)?;
    Ok(history)
}

fn list_ops() -> ExitCode {
    let listing: Vec<_> = all_operations()
        .iter()
        .map(|op| {
            json!({
                "name": op.name(),
                "label": op.label(),
                "category": op.category().name(),
                "parameters": op.parameters(),
            })
        })
        .collect();
    match serde_json::to_string_pretty(&listing) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            // Literal path — use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input with `_out` appended to the stem
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>, format: SaveFormat) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    Some(parent.join(format!("{}_out.{}", stem, ext)))
}

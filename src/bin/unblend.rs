use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use unblend::{
    default_output_path, Engine, ProcessOptions, ProcessResult, TemplateSize, DEFAULT_THRESHOLD,
};

#[derive(Parser)]
#[command(
    name = "unblend",
    about = "Locate a known watermark overlay and remove it by inverting the alpha blend",
    version,
    after_help = "Simple usage: unblend <image>  (auto-detect at the bottom-right inset, \
                  write {name}_cleaned.{ext})"
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: {name}_cleaned.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// Report detection only, never modify the image
    #[arg(long)]
    detect_only: bool,

    /// Skip detection, remove unconditionally at the automatic placement
    #[arg(short, long)]
    force: bool,

    /// Detection confidence threshold (0-100)
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Manual watermark position as X,Y (trusted, bypasses detection)
    #[arg(long, value_name = "X,Y", value_parser = parse_position)]
    at: Option<Position>,

    /// Force the 48x48 template (images <= 1024px)
    #[arg(long)]
    force_small: bool,

    /// Force the 96x96 template (images > 1024px)
    #[arg(long)]
    force_large: bool,

    /// Emit one JSON object per file instead of human-readable lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug)]
struct Position {
    x: u32,
    y: u32,
}

fn parse_position(s: &str) -> Result<Position, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{s}'"))?;
    let x = x.trim().parse().map_err(|e| format!("bad X: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad Y: {e}"))?;
    Ok(Position { x, y })
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if cli.force_small && cli.force_large {
        eprintln!("Error: Cannot specify both --force-small and --force-large");
        process::exit(1);
    }

    if !(0.0..=100.0).contains(&cli.threshold) {
        eprintln!("Error: Threshold must be between 0 and 100");
        process::exit(1);
    }

    let force_size = if cli.force_small {
        Some(TemplateSize::Small)
    } else if cli.force_large {
        Some(TemplateSize::Large)
    } else {
        None
    };

    let opts = ProcessOptions {
        detect_only: cli.detect_only,
        force: cli.force,
        threshold: cli.threshold,
        manual_position: cli.at.map(|p| (p.x, p.y)),
        force_size,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let engine = match Engine::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Fatal: failed to load template masks: {e}");
            process::exit(1);
        }
    };

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    if !opts.quiet && !cli.json {
        if opts.force {
            eprintln!("WARNING: Force mode - processing ALL images without detection!");
        } else if opts.manual_position.is_none() {
            eprintln!("Auto-detection enabled (threshold: {:.0}%)", opts.threshold);
        }
        eprintln!();
    }

    let results = if input_path.is_dir() {
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: unblend <input_dir> -o <output_dir>");
            process::exit(1);
        };
        engine.process_directory(input_path, &output_dir, &opts)
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        vec![engine.process_file(input_path, &output_path, &opts)]
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        if cli.json {
            print_json(r);
        } else {
            print_result(r, &opts);
        }
        if r.skipped() {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !opts.quiet && !cli.json {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if skip_count > 0 {
            eprint!(", Skipped: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, opts: &ProcessOptions) {
    if opts.quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.skipped() {
        if !opts.quiet {
            eprintln!("[SKIP] {filename}: {}", result.message);
        }
    } else if result.success {
        if !opts.quiet {
            if result.confidence() > 0.0 {
                eprintln!("[OK] {filename} ({:.0}% confidence)", result.confidence());
            } else {
                eprintln!("[OK] {filename}");
            }
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if opts.verbose && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}

fn print_json(result: &ProcessResult) {
    let report = match &result.outcome {
        Some(o) => serde_json::json!({
            "file": result.path.display().to_string(),
            "success": result.success,
            "status": o.status.as_str(),
            "confidence": o.confidence,
            "message": result.message,
            "box": {
                "x": o.placement.x,
                "y": o.placement.y,
                "w": o.placement.width,
                "h": o.placement.height,
            },
        }),
        None => serde_json::json!({
            "file": result.path.display().to_string(),
            "success": false,
            "status": "error",
            "message": result.message,
        }),
    };
    println!("{report}");
}

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use docx_markers::{ImageData, ImageSpec, ImageWarning, Options};
use regex::Regex;

#[derive(Parser)]
#[command(
    name = "docx-markers",
    version,
    about = "Apply {{BOLD_*}}/{{HIGHLIGHT_*}} markers and {{IMAGE:<id>}} placeholders in a DOCX file"
)]
struct Cli {
    /// Input DOCX file
    input: PathBuf,

    /// Output DOCX file
    #[arg(short, long)]
    output: PathBuf,

    /// Image for a placeholder, as MARKER=PATH or MARKER=PATH@WIDTHxHEIGHT (pixels)
    #[arg(long = "image", value_name = "MARKER=PATH[@WxH]")]
    images: Vec<String>,

    /// JSON array of image descriptors ({marker, data, format, width, height, description})
    #[arg(long = "images", value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Highlight colour used for {{HIGHLIGHT_START}} text
    #[arg(long, default_value = "yellow")]
    highlight_color: String,

    /// Only inject images; leave text markers in place
    #[arg(long)]
    skip_text: bool,

    /// Log per-part details
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

/// Split an optional `@WIDTHxHEIGHT` suffix off an image path. An `@` that is
/// not followed by a size belongs to the path.
fn split_size(arg: &str) -> Result<(&str, Option<(u32, u32)>), String> {
    let size = Regex::new(r"^(.+)@(\d+)x(\d+)$").map_err(|e| e.to_string())?;
    let Some(caps) = size.captures(arg) else {
        return Ok((arg, None));
    };
    let group = |i| caps.get(i).map_or("", |m| m.as_str());
    let (path, w, h) = (group(1), group(2), group(3));
    let width = w.parse().map_err(|_| format!("bad width {w:?}"))?;
    let height = h.parse().map_err(|_| format!("bad height {h:?}"))?;
    Ok((path, Some((width, height))))
}

fn parse_image_arg(arg: &str) -> Result<ImageSpec, String> {
    let (marker, rest) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected MARKER=PATH, got {arg:?}"))?;
    let (path, size) = split_size(rest)?;
    let path = Path::new(path);
    let data = std::fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;

    let mut spec = ImageSpec::new(marker, ImageData::Bytes(data));
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        spec.format = ext.to_ascii_lowercase();
    }
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        spec.description = stem.to_string();
    }
    if let Some((width, height)) = size {
        spec.width = width;
        spec.height = height;
    }
    Ok(spec)
}

fn load_manifest(path: &Path) -> Result<Vec<ImageSpec>, String> {
    let content = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| format!("{}: {e}", path.display()))
}

fn run(cli: &Cli) -> Result<(), String> {
    let mut images = match &cli.manifest {
        Some(path) => load_manifest(path)?,
        None => Vec::new(),
    };
    for arg in &cli.images {
        images.push(parse_image_arg(arg)?);
    }

    let options = Options {
        highlight_color: cli.highlight_color.clone(),
    };

    let warnings = if cli.skip_text {
        let input = std::fs::read(&cli.input).map_err(|e| format!("{}: {e}", cli.input.display()))?;
        let injected = docx_markers::inject_images(&input, &images).map_err(|e| e.to_string())?;
        std::fs::write(&cli.output, &injected.bytes)
            .map_err(|e| format!("{}: {e}", cli.output.display()))?;
        injected.warnings
    } else {
        let processed = docx_markers::process_file(&cli.input, &cli.output, &images, &options)
            .map_err(|e| e.to_string())?;
        log::info!(
            "{} paragraph(s) reformatted",
            processed.containers_modified
        );
        processed.warnings
    };

    for warning in &warnings {
        match warning {
            ImageWarning::MarkerNotFound { marker, rel_id } => {
                eprintln!("warning: no placeholder for image {marker} ({rel_id} added unreferenced)");
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_suffix_is_optional() {
        assert_eq!(split_size("chart.png@100x50").unwrap(), ("chart.png", Some((100, 50))));
        assert_eq!(split_size("chart.png").unwrap(), ("chart.png", None));
    }

    #[test]
    fn at_sign_without_size_stays_in_path() {
        assert_eq!(
            split_size("/home/me@corp/x.png").unwrap(),
            ("/home/me@corp/x.png", None)
        );
        assert_eq!(
            split_size("/home/me@corp/x.png@20x30").unwrap(),
            ("/home/me@corp/x.png", Some((20, 30)))
        );
        assert_eq!(split_size("x.png@big").unwrap(), ("x.png@big", None));
    }

    #[test]
    fn oversized_dimension_is_an_error() {
        assert!(split_size("x.png@99999999999x1").is_err());
    }
}

mod docx;
mod error;
mod markers;
mod model;
mod package;
mod rebuild;

pub use error::Error;
pub use markers::{Marker, MarkerLexer, lexer};
pub use model::{
    BreakKind, ContentEvent, Format, FormatSet, Formatted, HIGHLIGHT_COLORS, ImageData,
    ImageSpec, ImageWarning, Injected, Options, Processed, Segment, SegmentKind,
};
pub use rebuild::rebuild;

use std::path::Path;
use std::time::Instant;

fn validate(options: &Options) -> Result<(), Error> {
    if !HIGHLIGHT_COLORS.contains(&options.highlight_color.as_str()) {
        return Err(Error::InvalidOption(format!(
            "unknown highlight color {:?} (expected one of: {})",
            options.highlight_color,
            HIGHLIGHT_COLORS.join(", ")
        )));
    }
    Ok(())
}

/// Apply `{{BOLD_*}}` / `{{HIGHLIGHT_*}}` markers in the body, tables, headers,
/// footers and content controls of a DOCX package.
pub fn format_markers(input: &[u8], options: &Options) -> Result<Formatted, Error> {
    validate(options)?;
    docx::rewrite_package(input, options, lexer())
}

/// Embed images at their `{{IMAGE:<marker>}}` placeholders.
pub fn inject_images(input: &[u8], images: &[ImageSpec]) -> Result<Injected, Error> {
    docx::inject(input, images)
}

/// Full pipeline: text markers first, then image placeholders in the result.
pub fn process_document(
    input: &[u8],
    images: &[ImageSpec],
    options: &Options,
) -> Result<Processed, Error> {
    let t0 = Instant::now();

    let formatted = format_markers(input, options)?;
    let t_format = t0.elapsed();

    let injected = inject_images(&formatted.bytes, images)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: format={:.1}ms, images={:.1}ms, total={:.1}ms ({} paragraph(s) rewritten, {} image(s), {} warning(s), output {} bytes)",
        t_format.as_secs_f64() * 1000.0,
        (t_total - t_format).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        formatted.containers_modified,
        images.len(),
        injected.warnings.len(),
        injected.bytes.len(),
    );

    Ok(Processed {
        bytes: injected.bytes,
        containers_modified: formatted.containers_modified,
        warnings: injected.warnings,
    })
}

pub fn process_file(
    input: &Path,
    output: &Path,
    images: &[ImageSpec],
    options: &Options,
) -> Result<Processed, Error> {
    let bytes = std::fs::read(input).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Error::Io(
            std::io::Error::new(e.kind(), format!("{}: {}", e, input.display())),
        ),
        _ => Error::Io(e),
    })?;

    let processed = process_document(&bytes, images, options)?;
    std::fs::write(output, &processed.bytes).map_err(Error::Io)?;
    Ok(processed)
}

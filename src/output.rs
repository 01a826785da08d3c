//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Export
//!
//! Events arrive as images finish, so lines may be out of input order; the
//! positional index ties each line back to the sorted input list.
//!
//! ```text
//! Watermarking 4 photos → holiday/holiday_watermark
//! 002 beach/dusk.jpg → beach/dusk.jpg
//!     Date: 2021-07-04 (exif)
//! 001 dawn.jpg → dawn.jpg
//!     Date: 2021-07-03 (file-mtime)
//! 003 scan.png: skipped, no date
//! 004 broken.jpg: failed (decode)
//!     cannot decode broken.jpg: ...
//!
//! Wrote 2, skipped 1, failed 1
//! Failed:
//!     broken.jpg (decode)
//! ```
//!
//! ## Templates
//!
//! ```text
//! signature *
//!     Text "(c) {{date}}", 48px #ffffffff, opacity 80, bottom-right
//! logo
//!     Image brand.png at 40%, opacity 100, 0.5,0.9, rotated 15°
//! ```
//!
//! `*` marks the last-used template.
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::export::{ExportEvent, ExportSummary};
use crate::templates::Template;
use crate::types::{Placement, WatermarkKind, WatermarkSpec};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// `path` relative to `base` when it lies inside it, as given otherwise.
fn relative(path: &Path, base: Option<&Path>) -> String {
    base.and_then(|b| path.strip_prefix(b).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}

// ============================================================================
// Export
// ============================================================================

/// Format a single export progress event as display lines.
///
/// Source paths are shown relative to `input_root`, output paths relative to
/// the output directory announced by [`ExportEvent::Started`].
pub fn format_export_event(
    event: &ExportEvent,
    input_root: Option<&Path>,
    output_root: Option<&Path>,
) -> Vec<String> {
    match event {
        ExportEvent::Started { total, output_dir } => {
            let noun = if *total == 1 { "photo" } else { "photos" };
            vec![format!(
                "Watermarking {} {} \u{2192} {}",
                total,
                noun,
                output_dir.display()
            )]
        }
        ExportEvent::Written {
            index,
            source,
            output,
            date,
            ..
        } => {
            let mut lines = vec![format!(
                "{} {} \u{2192} {}",
                format_index(*index),
                relative(source, input_root),
                relative(output, output_root)
            )];
            if let Some(date) = date {
                lines.push(format!("    Date: {} ({})", date.text, date.source));
            }
            lines
        }
        ExportEvent::Skipped { index, source, .. } => vec![format!(
            "{} {}: skipped, no date",
            format_index(*index),
            relative(source, input_root)
        )],
        ExportEvent::Failed {
            index,
            source,
            kind,
            message,
            ..
        } => vec![
            format!(
                "{} {}: failed ({})",
                format_index(*index),
                relative(source, input_root),
                kind
            ),
            format!("    {}", message),
        ],
    }
}

/// Format the end-of-run summary.
pub fn format_summary(summary: &ExportSummary, input_root: Option<&Path>) -> Vec<String> {
    let mut lines = vec![format!(
        "Wrote {}, skipped {}, failed {}",
        summary.written,
        summary.skipped,
        summary.failed()
    )];
    if summary.has_failures() {
        lines.push("Failed:".to_string());
        for (path, kind, _) in &summary.failures {
            lines.push(format!("    {} ({})", relative(path, input_root), kind));
        }
    }
    lines
}

pub fn print_summary(summary: &ExportSummary, input_root: Option<&Path>) {
    println!();
    for line in format_summary(summary, input_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Templates
// ============================================================================

/// One-line description of a watermark and where it goes.
pub fn describe(spec: &WatermarkSpec, placement: &Placement) -> String {
    let what = match &spec.kind {
        WatermarkKind::Text { text } => {
            let mut s = format!("Text \"{}\", {}px {}", text, spec.font_size, spec.color);
            if spec.stroke {
                s.push_str(", stroke");
            }
            if spec.shadow {
                s.push_str(", shadow");
            }
            s
        }
        WatermarkKind::Image {
            source,
            scale_percent,
        } => format!("Image {} at {}%", source.display(), scale_percent),
    };
    let mut line = format!("{}, opacity {}, {}", what, spec.opacity, placement);
    let rotation = spec.rotation();
    if rotation != 0.0 {
        line.push_str(&format!(", rotated {}\u{b0}", rotation));
    }
    line
}

/// Format the template list, marking the last-used one with `*`.
pub fn format_template_list(templates: &[Template], last_used: Option<&str>) -> Vec<String> {
    if templates.is_empty() {
        return vec!["No templates saved".to_string()];
    }
    let mut lines = Vec::new();
    for template in templates {
        let marker = if last_used == Some(template.name.as_str()) {
            " *"
        } else {
            ""
        };
        lines.push(format!("{}{}", template.name, marker));
        lines.push(format!("    {}", describe(&template.spec, &template.placement)));
    }
    lines
}

/// Format a single template with its timestamps.
pub fn format_template(template: &Template) -> Vec<String> {
    vec![
        template.name.clone(),
        format!("    {}", describe(&template.spec, &template.placement)),
        format!("    Created: {}", template.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
        format!("    Updated: {}", template.updated_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ]
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

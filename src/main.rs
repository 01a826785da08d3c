use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use photomark::config::{self, AppConfig};
use photomark::date::{self, MissingDatePolicy};
use photomark::export::{ExportJob, ExportRule, ExportSummary, Exporter};
use photomark::imaging::{OutputFormat, Quality, ResizeSpec, RustBackend};
use photomark::naming::NamingRule;
use photomark::output;
use photomark::scan::{self, ScanOptions, SourceImage};
use photomark::templates::{self, Template, TemplateStore};
use photomark::text::FontRasterizer;
use photomark::types::{
    Color, MAX_FONT_SIZE, MAX_SCALE_PERCENT, Placement, Preset, WatermarkKind, WatermarkSpec,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "photomark")]
#[command(about = "Batch date and logo watermarking for photo collections")]
#[command(long_about = "\
Batch date and logo watermarking for photo collections

Stamps every photo in IMAGE_DIRECTORY with its capture date (or any text, or
a logo) and writes the copies to IMAGE_DIRECTORY/<name>_watermark, mirroring
subdirectories. Originals are never modified.

Date lookup (first available wins):
  EXIF DateTimeOriginal → DateTimeDigitized → DateTime
  → file modification date (--use-file-date) → --default-date

Settings are layered: stock defaults, then photomark.toml, then a template
(--template / --last-used), then command-line flags.

Run 'photomark gen-config' to generate a documented photomark.toml.")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Config file (default: <config dir>/photomark/photomark.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Template store file (default: <config dir>/photomark/templates.json)
    #[arg(long, global = true)]
    templates: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Directory of photos to watermark (or a single photo)
    image_directory: Option<PathBuf>,

    /// Watermark text; {{date}} is replaced by the capture date
    #[arg(long, conflicts_with = "logo")]
    text: Option<String>,

    /// Stamp this image instead of text
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Logo scale in percent
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_SCALE_PERCENT as i64))]
    scale: Option<u32>,

    /// Font size in pixels
    #[arg(short = 's', long, value_parser = clap::value_parser!(u32).range(1..=MAX_FONT_SIZE as i64))]
    font_size: Option<u32>,

    /// Text color: name, #rgb, #rrggbb or #rrggbbaa
    #[arg(short = 'c', long)]
    color: Option<Color>,

    /// Opacity, 0-100
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    opacity: Option<u8>,

    /// Counter-clockwise rotation in degrees
    #[arg(long, allow_negative_numbers = true)]
    rotation: Option<f64>,

    /// Outline text in a contrasting color
    #[arg(long, overrides_with = "no_stroke")]
    stroke: bool,

    /// No outline, even if the config or template has one
    #[arg(long, overrides_with = "stroke")]
    no_stroke: bool,

    /// Drop shadow beneath text
    #[arg(long, overrides_with = "no_shadow")]
    shadow: bool,

    /// No drop shadow, even if the config or template has one
    #[arg(long, overrides_with = "shadow")]
    no_shadow: bool,

    /// Position preset (top-left ... bottom-right)
    #[arg(short = 'p', long, conflicts_with = "at")]
    position: Option<Preset>,

    /// Freeform position: watermark center as X,Y fractions of the image
    #[arg(long, value_name = "X,Y", value_parser = parse_freeform)]
    at: Option<Placement>,

    /// Fall back to the file modification date when EXIF has none
    #[arg(long)]
    use_file_date: bool,

    /// Fallback date when no other date is available
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = date::parse_default_date)]
    default_date: Option<NaiveDate>,

    /// What to do with photos that have no date: skip or empty
    #[arg(long, value_name = "POLICY")]
    on_missing_date: Option<MissingDatePolicy>,

    /// Output format: jpeg or png
    #[arg(long)]
    format: Option<OutputFormat>,

    /// JPEG quality, 1-100
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    quality: Option<u32>,

    /// Output naming: keep-original, prefix:<text> or suffix:<text>
    #[arg(long)]
    naming: Option<NamingRule>,

    /// Resize after watermarking: none, width:N, height:N or percent:N
    #[arg(long)]
    resize: Option<ResizeSpec>,

    /// Output directory (default: IMAGE_DIRECTORY/<name>_watermark)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Font file for text watermarks
    #[arg(long)]
    font: Option<PathBuf>,

    /// Start from a saved template
    #[arg(long, conflicts_with = "last_used")]
    template: Option<String>,

    /// Start from the template used last
    #[arg(long)]
    last_used: bool,

    /// Save the final watermark settings as a template
    #[arg(long, value_name = "NAME")]
    save_template: Option<String>,

    /// Parallel workers (default: all cores)
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u64).range(1..))]
    jobs: Option<u64>,

    /// Only watermark photos directly inside IMAGE_DIRECTORY
    #[arg(long)]
    no_recursive: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Manage saved watermark templates
    #[command(subcommand)]
    Templates(TemplatesCommand),
    /// Print a stock photomark.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum TemplatesCommand {
    /// List saved templates (* marks the last used)
    List,
    /// Show one template
    Show { name: String },
    /// Delete a template
    Delete { name: String },
}

fn parse_freeform(s: &str) -> Result<Placement, String> {
    if !s.contains(',') {
        return Err(format!("expected X,Y fractions, got '{s}'"));
    }
    s.parse::<Placement>().map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Some(Command::GenConfig) => {
            print!("{}", config::stock_config_toml());
        }
        Some(Command::Templates(command)) => {
            let config = config::load_config(cli.config.as_deref())?;
            let store = open_store(cli.templates.as_deref(), &config)?;
            match command {
                TemplatesCommand::List => {
                    let last = store.load_last_used().map(|t| t.name);
                    output::print_lines(&output::format_template_list(
                        &store.list(),
                        last.as_deref(),
                    ));
                }
                TemplatesCommand::Show { name } => {
                    output::print_lines(&output::format_template(&store.load(&name)?));
                }
                TemplatesCommand::Delete { name } => {
                    store.delete(&name)?;
                    println!("Deleted template '{}'", name);
                }
            }
        }
        None => {
            let config = config::load_config(cli.config.as_deref())?;
            let summary = watermark(&cli.run, cli.templates.as_deref(), &config)?;
            if summary.has_failures() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default: warnings only).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn open_store(explicit: Option<&Path>, config: &AppConfig) -> Result<TemplateStore, Box<dyn std::error::Error>> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| config.templates.path.clone())
        .or_else(templates::default_store_path)
        .ok_or("no config directory on this platform; pass --templates PATH")?;
    Ok(TemplateStore::open(path)?)
}

/// Layer template and flags over the configured watermark.
fn resolve_watermark(
    args: &RunArgs,
    config: &AppConfig,
    store: Option<&TemplateStore>,
) -> Result<(WatermarkSpec, Placement, Option<String>), Box<dyn std::error::Error>> {
    let (mut spec, mut placement, mut used) = (config.watermark_spec(), config.placement(), None);

    let template = match (store, &args.template, args.last_used) {
        (Some(store), Some(name), _) => Some(store.load(name)?),
        (Some(store), None, true) => Some(store.load_last_used().ok_or("no template has been used yet")?),
        _ => None,
    };
    if let Some(template) = template {
        spec = template.spec;
        placement = template.placement;
        used = Some(template.name);
    }

    if let Some(text) = &args.text {
        spec.kind = WatermarkKind::Text { text: text.clone() };
    }
    if let Some(logo) = &args.logo {
        spec.kind = WatermarkKind::Image {
            source: logo.clone(),
            scale_percent: config.watermark.scale,
        };
    }
    if let (Some(scale), WatermarkKind::Image { scale_percent, .. }) = (args.scale, &mut spec.kind) {
        *scale_percent = scale;
    }
    if let Some(font_size) = args.font_size {
        spec.font_size = font_size;
    }
    if let Some(color) = args.color {
        spec.color = color;
    }
    if let Some(opacity) = args.opacity {
        spec.opacity = opacity;
    }
    if let Some(rotation) = args.rotation {
        spec = spec.with_rotation(rotation);
    }
    if let Some(stroke) = switch(args.stroke, args.no_stroke) {
        spec.stroke = stroke;
    }
    if let Some(shadow) = switch(args.shadow, args.no_shadow) {
        spec.shadow = shadow;
    }
    if let Some(preset) = args.position {
        placement = preset.into();
    }
    if let Some(at) = args.at {
        placement = at;
    }

    spec.validate()?;
    placement.validate()?;
    Ok((spec, placement, used))
}

/// An `--x` / `--no-x` pair; `None` when neither was given.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// `<dir>/<dir name>_watermark`, or beside a single file.
fn default_output_dir(input: &Path) -> PathBuf {
    let dir = if input.is_file() {
        input.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        input.to_path_buf()
    };
    let name = dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "photos".to_string());
    dir.join(format!("{name}_watermark"))
}

fn watermark(
    args: &RunArgs,
    templates_path: Option<&Path>,
    config: &AppConfig,
) -> Result<ExportSummary, Box<dyn std::error::Error>> {
    let input = args
        .image_directory
        .as_deref()
        .ok_or("IMAGE_DIRECTORY is required (see --help)")?;

    let needs_store = args.template.is_some() || args.last_used || args.save_template.is_some();
    let store = if needs_store {
        Some(open_store(templates_path, config)?)
    } else {
        None
    };

    let (spec, placement, used) = resolve_watermark(args, config, store.as_ref())?;
    if let Some(store) = &store {
        // Saving marks the template last-used on its own.
        match (&args.save_template, &used) {
            (Some(name), _) => {
                store.save(Template::new(name.clone(), spec.clone(), placement))?;
                println!("Saved template '{}'", name);
            }
            (None, Some(name)) => store.mark_last_used(name)?,
            (None, None) => {}
        }
    }

    let output_dir = args.output.clone().unwrap_or_else(|| default_output_dir(input));
    let (images, input_root) = if input.is_file() {
        (vec![SourceImage::single(input)], input.parent().map(Path::to_path_buf))
    } else {
        let options = ScanOptions {
            recursive: config.export.recursive && !args.no_recursive,
            exclude: vec![output_dir.clone()],
        };
        (scan::scan(input, &options)?, Some(input.to_path_buf()))
    };

    let mut dates = config.date_options()?;
    dates.use_file_date |= args.use_file_date;
    if args.default_date.is_some() {
        dates.default_date = args.default_date;
    }

    let rule = ExportRule {
        naming: args.naming.clone().unwrap_or_else(|| config.export.naming.clone()),
        format: args.format.unwrap_or(config.export.format),
        quality: Quality::new(args.quality.unwrap_or(config.export.quality)),
        resize: args.resize.unwrap_or(config.export.resize),
        output_dir: output_dir.clone(),
    };
    let job = ExportJob {
        spec,
        placement,
        rule,
        dates,
        missing_date: args.on_missing_date.unwrap_or(config.date.on_missing),
    };

    let font = match &job.spec.kind {
        WatermarkKind::Text { .. } => {
            let explicit = args.font.as_deref().or(config.fonts.path.as_deref());
            Some(FontRasterizer::load(explicit)?)
        }
        WatermarkKind::Image { .. } => None,
    };

    let mut processing = config.processing.clone();
    if let Some(jobs) = args.jobs {
        processing.max_processes = Some(jobs as usize);
    }
    init_thread_pool(&processing);

    let backend = RustBackend::new();
    let (tx, rx) = std::sync::mpsc::channel();
    let printer_input = input_root.clone();
    let printer_output = output_dir.clone();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_export_event(
                &event,
                printer_input.as_deref(),
                Some(printer_output.as_path()),
            ) {
                println!("{}", line);
            }
        }
    });

    let result = {
        let mut exporter = Exporter::new(&backend).with_events(tx);
        if let Some(font) = &font {
            exporter = exporter.with_rasterizer(font);
        }
        exporter.run(&images, &job)
    };
    printer.join().map_err(|_| "progress printer thread panicked")?;
    let outcomes = result?;

    let summary = ExportSummary::from_outcomes(&outcomes);
    output::print_summary(&summary, input_root.as_deref());
    Ok(summary)
}

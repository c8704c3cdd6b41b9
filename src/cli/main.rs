use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use metacanon::config;
use metacanon::display::InfoEntry;
use metacanon::pipeline::{self, CropRequest, Operation, ProcessResult};

#[derive(Parser, Debug)]
#[command(
    name = "metacanon",
    version,
    about = "Read and edit EXIF, IPTC and XMP metadata with guarded write-back and XMP sidecars"
)]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Show camera and description info (default when nothing else is asked)
    #[arg(long)]
    show: bool,

    /// List every metadata key and value, plus file facts
    #[arg(long)]
    all: bool,

    /// Set the star rating (0 clears it)
    #[arg(long, value_name = "STARS")]
    rate: Option<i32>,

    /// Rotate by a quarter turn: 90, -90, 180 or 270
    #[arg(long, value_name = "DEG", allow_hyphen_values = true)]
    rotate: Option<i32>,

    /// Reset the orientation to upright
    #[arg(long = "clear-orientation")]
    clear_orientation: bool,

    /// Set the image description
    #[arg(long, value_name = "TEXT")]
    description: Option<String>,

    /// Set a raw value, e.g. `xmp:dc.title=Pier` or `Exif.Image.Artist=Ann`
    #[arg(long = "set", value_name = "NS:KEY=VALUE")]
    set: Vec<String>,

    /// Write a crop rectangle in pixels to the XMP sidecar
    #[arg(long, value_name = "X,Y,W,H[,ANGLE]", allow_hyphen_values = true)]
    crop: Option<String>,

    /// Re-serialize even when nothing changed
    #[arg(long)]
    force: bool,

    /// Preview changes without writing to files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Operations in application order: edits first, then the views so
    /// they reflect the edits.
    fn operations(&self) -> Result<Vec<Operation>> {
        let mut ops = Vec::new();
        for set in &self.set {
            ops.push(Operation::parse_set(set)?);
        }
        if let Some(stars) = self.rate {
            ops.push(Operation::Rate(stars));
        }
        if let Some(degrees) = self.rotate {
            ops.push(Operation::Rotate(degrees));
        }
        if self.clear_orientation {
            ops.push(Operation::ClearOrientation);
        }
        if let Some(ref text) = self.description {
            ops.push(Operation::Describe(text.clone()));
        }
        if let Some(ref crop) = self.crop {
            ops.push(Operation::Crop(CropRequest::parse(crop)?));
        }
        if self.show || (ops.is_empty() && !self.all) {
            ops.push(Operation::Show);
        }
        if self.all {
            ops.push(Operation::All);
        }
        Ok(ops)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let operations = cli.operations()?;

    // Load config, CLI flags win
    let mut config = config::Config::load(cli.config.as_deref())?;
    if cli.dry_run {
        config.output.dry_run = true;
    }
    if cli.json {
        config.output.json = true;
    }

    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    log::info!("Found {} image(s) to process", images.len());
    if config.output.dry_run {
        log::info!("DRY RUN: no files will be modified");
    }

    let mut results = Vec::new();
    let total = images.len();

    for (i, image_path) in images.iter().enumerate() {
        log::debug!("[{}/{}] Processing: {}", i + 1, total, image_path.display());

        let result = pipeline::process_image(image_path, &operations, &config, cli.force);

        if let Some(ref err) = result.error {
            log::error!("{}: {err}", image_path.display());
        } else if !config.output.json {
            print_result(&result);
        }

        results.push(result);
    }

    if config.output.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    let success = results.iter().filter(|r| r.error.is_none()).count();
    let failed = total - success;
    log::info!("Done: {success} succeeded, {failed} failed out of {total} images");

    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

fn print_result(result: &ProcessResult) {
    println!();
    println!("{BOLD}File:{RESET} {}", result.path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    print_section("Camera", &result.camera);
    print_section("Description", &result.description);

    if let Some(ref link) = result.gps_link {
        print_row("GPS", link);
        println!();
    }

    if !result.all_metadata.is_empty() {
        println!("  {BOLD}All Metadata{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (key, value) in &result.all_metadata {
            print_row(key, value);
        }
        println!();
    }

    for applied in &result.applied {
        println!("  {GREEN}* {applied}{RESET}");
    }
    if let Some(ref crop) = result.crop {
        println!(
            "  {GREEN}* crop top={:.4} left={:.4} bottom={:.4} right={:.4} angle={:.2}{RESET}",
            crop.top, crop.left, crop.bottom, crop.right, crop.angle
        );
    }
    if result.saved {
        println!("  {DIM}saved{RESET}");
    }
    if let Some(ref backup) = result.backup_path {
        println!("  {DIM}backup: {}{RESET}", backup.display());
    }
    if let Some(ref sidecar) = result.sidecar_path {
        println!("  {DIM}sidecar: {}{RESET}", sidecar.display());
    }
}

fn print_section(title: &str, entries: &[InfoEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("  {BOLD}{title}{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    for entry in entries {
        print_row(&entry.label, &entry.value);
    }
    println!();
}

/// Print a single row in the metadata table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}

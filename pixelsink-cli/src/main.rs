use anyhow::{Context, Result};
use clap::Parser;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pixelsink::{
    Disposition, FileInfo, PixelArray, UploadAccumulator, UploadError, UploadLimits,
    DEFAULT_CHUNK_SIZE,
};

#[derive(Parser)]
#[command(name = "pixelsink-cli")]
#[command(about = "Stream an image through the upload accumulator and decode it", long_about = None)]
#[command(version)]
struct Args {
    /// Image file to upload, `-` for stdin
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Maximum upload size in bytes (overrides env and config file)
    #[arg(long, value_name = "BYTES")]
    max_bytes: Option<u64>,

    /// Limits file (JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bytes per chunk handed to the accumulator
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: NonZeroUsize,

    /// Content type to announce (guessed from the extension by default)
    #[arg(long, value_name = "MIME")]
    content_type: Option<String>,

    /// Length to announce (file size by default, required for stdin)
    #[arg(long, value_name = "BYTES")]
    declared_length: Option<u64>,

    /// Reject uploads longer than their announced length
    #[arg(long, default_value_t)]
    strict: bool,

    /// Print the result as JSON
    #[arg(long, default_value_t)]
    json: bool,

    /// Verbose output
    #[arg(short, long, default_value_t)]
    verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, default_value_t)]
    quiet: bool,
}

#[derive(serde::Serialize)]
struct Summary<'a> {
    file_name: &'a str,
    content_type: &'a str,
    bytes: u64,
    height: usize,
    width: usize,
    channels: usize,
    sample_type: &'static str,
}

#[derive(serde::Serialize)]
struct Failure<'a> {
    file_name: &'a str,
    outcome: &'static str,
    error: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    setup_logging(args.verbose, args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = match e.downcast_ref::<UploadError>() {
                Some(upload) => report_upload_error(&args, upload),
                None => {
                    log::error!("{e:#}");
                    1
                }
            };
            ExitCode::from(code)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let limits = build_limits(args)?;
    let (reader, size) = open_input(&args.input)?;

    let declared = args
        .declared_length
        .or(size)
        .context("--declared-length is required when reading from stdin")?;

    let info = FileInfo::new(content_type(args), declared).with_file_name(file_name(args));

    if !args.quiet {
        log::info!(
            "Uploading `{}` ({} bytes announced as {})",
            info.file_name,
            info.content_length,
            info.content_type
        );
    }

    let mut accumulator = UploadAccumulator::new(limits);
    let pixels = pixelsink::stream_upload(&mut accumulator, &info, reader, args.chunk_size)?
        .context("Upload handler did not claim the file")?;

    print_summary(args, &info, accumulator.received_length(), &pixels)
}

fn build_limits(args: &Args) -> Result<UploadLimits> {
    let limits = match &args.config {
        Some(path) => UploadLimits::load(path)?,
        None => UploadLimits::load_default()?,
    };

    let mut limits = limits.with_env_overrides()?;

    if let Some(max_bytes) = args.max_bytes {
        limits.max_bytes = Some(max_bytes);
    }
    if args.strict {
        limits.strict_declared_length = true;
    }

    log::debug!("Using limits: {limits:?}");
    Ok(limits)
}

fn open_input(input: &Path) -> Result<(Box<dyn Read>, Option<u64>)> {
    if input == Path::new("-") {
        return Ok((Box::new(io::stdin().lock()), None));
    }

    let file = File::open(input)
        .with_context(|| format!("Failed to open input file: {}", input.display()))?;
    let size = file
        .metadata()
        .context("Failed to read input metadata")?
        .len();

    Ok((Box::new(BufReader::new(file)), Some(size)))
}

fn content_type(args: &Args) -> String {
    if let Some(content_type) = &args.content_type {
        return content_type.clone();
    }

    image::ImageFormat::from_path(&args.input)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

fn file_name(args: &Args) -> String {
    if args.input == Path::new("-") {
        return "stdin".to_string();
    }

    args.input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("stdin")
        .to_string()
}

fn print_summary(args: &Args, info: &FileInfo, bytes: u64, pixels: &PixelArray) -> Result<()> {
    if args.json {
        let summary = Summary {
            file_name: &info.file_name,
            content_type: &info.content_type,
            bytes,
            height: pixels.height(),
            width: pixels.width(),
            channels: pixels.channels(),
            sample_type: pixels.samples().type_name(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: {}x{}x{} ({})",
            info.file_name,
            pixels.width(),
            pixels.height(),
            pixels.channels(),
            pixels.samples().type_name()
        );
    }

    Ok(())
}

fn report_upload_error(args: &Args, err: &UploadError) -> u8 {
    let (outcome, code) = match err.disposition() {
        Disposition::ResetConnection => ("reset_connection", 2),
        Disposition::RejectContent => ("invalid_content", 3),
        Disposition::Misconfigured => ("misconfigured", 4),
    };

    if args.json {
        let failure = Failure {
            file_name: &file_name(args),
            outcome,
            error: err.to_string(),
        };
        match serde_json::to_string_pretty(&failure) {
            Ok(json) => println!("{json}"),
            Err(e) => log::error!("Failed to serialize error: {e}"),
        }
    } else {
        log::error!("{outcome}: {err}");
    }

    code
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flag_overrides_config_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.json");
        UploadLimits::with_max_bytes(10).save(&path).unwrap();

        let args = parse(&[
            "pixelsink-cli",
            "photo.png",
            "--config",
            path.to_str().unwrap(),
            "--max-bytes",
            "2048",
            "--strict",
        ]);
        let limits = build_limits(&args).unwrap();

        assert_eq!(limits.max_bytes, Some(2048));
        assert!(limits.strict_declared_length);
    }

    #[test]
    fn content_type_is_guessed_from_extension() {
        assert_eq!(content_type(&parse(&["pixelsink-cli", "a.png"])), "image/png");
        assert_eq!(
            content_type(&parse(&["pixelsink-cli", "a.unknown"])),
            "application/octet-stream"
        );
        assert_eq!(
            content_type(&parse(&["pixelsink-cli", "a.png", "--content-type", "image/x-test"])),
            "image/x-test"
        );
    }

    #[test]
    fn zero_chunk_size_is_a_usage_error() {
        let err = Args::try_parse_from(["pixelsink-cli", "a.png", "--chunk-size", "0"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let args = parse(&["pixelsink-cli", "a.png"]);
        assert_eq!(args.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn stdin_needs_a_declared_length() {
        let args = parse(&["pixelsink-cli", "-", "--max-bytes", "10"]);
        assert!(run(&args).is_err());
        assert_eq!(file_name(&args), "stdin");
    }
}

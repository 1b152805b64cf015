//! automedia CLI
//!
//! Process media directories to validate, transcode and add parity files.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use automedia::container::{parse_prefixes, resolve_root};
use automedia::operation::par2::{
    DEFAULT_PAR2_CREATE_ARGS, DEFAULT_PAR2_VERIFY_ARGS, DEFAULT_RECOVERY_NAME,
};
use automedia::progress::DEFAULT_PROGRESS_INTERVAL_MS;
use automedia::{
    walk, CancelToken, JobQueue, MediaError, MediaErrorKind, Operation, Par2Mode, Par2Operation,
    PrintFilesOperation, ProgressReporter, RunSummary, ScanConfig, Supervisor,
    SupervisorConfig, SymlinkMode, ToolContext, TranscodeOperation, TranscodePreset,
    VerifyOperation,
};

const ABOUT: &str = r#"
automedia - process media directories to validate and add parity files

Examples:
  automedia --root /media verify                           decode every file with ffmpeg
  automedia --root /music transcode --preset mp3-320k --output /mp3
  automedia --root /media par2-create                      protect each directory
  automedia --root /media par2-verify --par2-args "-N -p"  verify, purge on success
"#;

/// Process media directories
#[derive(Parser)]
#[command(name = "automedia")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    #[arg(long, hide = true)]
    hidden_container_prefix: Option<String>,

    #[arg(long, hide = true)]
    hidden_container_pwd: Option<PathBuf>,

    /// Root directory for media
    #[arg(long)]
    root: PathBuf,

    /// File extensions to include in processing, comma separated
    #[arg(long, default_value_t = ScanConfig::default_extensions().join(","))]
    extensions: String,

    /// File name regular expressions to exclude completely, comma separated
    #[arg(long, default_value_t = ScanConfig::default_ignore_patterns().join(","))]
    ignore: String,

    /// How to treat symbolic links
    #[arg(long, value_enum, default_value_t = SymlinkMode::Warn)]
    symlinks: SymlinkMode,

    /// Seconds a tool may go without consuming input before it is killed
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Emit JSON progress lines on stderr
    #[arg(long)]
    progress: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify media files are corruption-free with ffmpeg
    Verify,

    /// Transcode media files with ffmpeg
    Transcode {
        /// Output format preset
        #[arg(long, value_enum)]
        preset: TranscodePreset,

        /// Output directory
        #[arg(long)]
        output: PathBuf,
    },

    /// Print all media files
    Print,

    /// Create a PAR2 archive in each directory
    Par2Create {
        /// Arguments to pass to par2
        #[arg(long, default_value = DEFAULT_PAR2_CREATE_ARGS, allow_hyphen_values = true)]
        par2_args: String,

        /// Recovery file name (for the .par2 and .filelist files)
        #[arg(long, default_value = DEFAULT_RECOVERY_NAME)]
        name: String,
    },

    /// Verify the PAR2 archive in each directory
    Par2Verify {
        /// Arguments to pass to par2
        #[arg(long, default_value = DEFAULT_PAR2_VERIFY_ARGS, allow_hyphen_values = true)]
        par2_args: String,

        /// Recovery file name (for the .par2 and .filelist files)
        #[arg(long, default_value = DEFAULT_RECOVERY_NAME)]
        name: String,
    },
}

fn split_par2_args(args: &str) -> Result<Vec<String>, MediaError> {
    shlex::split(args).ok_or_else(|| {
        MediaError::new(
            MediaErrorKind::InvalidPattern,
            None,
            format!("Unbalanced quoting in par2 arguments: {}", args),
        )
    })
}

fn build_operation(
    command: Commands,
    tools: ToolContext,
    cancel: &CancelToken,
) -> Result<Box<dyn Operation>, MediaError> {
    let operation: Box<dyn Operation> = match command {
        Commands::Verify => Box::new(VerifyOperation::new(tools)),
        Commands::Transcode { preset, output } => {
            Box::new(TranscodeOperation::new(tools, output, preset))
        }
        Commands::Print => Box::new(PrintFilesOperation),
        Commands::Par2Create { par2_args, name } => Box::new(Par2Operation::new(
            Par2Mode::Create,
            split_par2_args(&par2_args)?,
            name,
            cancel.clone(),
        )),
        Commands::Par2Verify { par2_args, name } => Box::new(Par2Operation::new(
            Par2Mode::Verify,
            split_par2_args(&par2_args)?,
            name,
            cancel.clone(),
        )),
    };
    Ok(operation)
}

fn run(cli: Cli) -> Result<RunSummary, MediaError> {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        log::warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let prefixes = cli
        .hidden_container_prefix
        .as_deref()
        .map(parse_prefixes)
        .unwrap_or_default();
    let pwd = if prefixes.is_empty() {
        None
    } else {
        cli.hidden_container_pwd.as_deref()
    };
    let root = resolve_root(&cli.root, pwd, &prefixes);

    let config = ScanConfig::builder()
        .extensions(ScanConfig::split_list(&cli.extensions))
        .ignore_patterns(ScanConfig::split_list(&cli.ignore))
        .symlinks(cli.symlinks)
        .build();
    let scanner = config.compile()?;

    let progress = Arc::new(ProgressReporter::new(
        cli.progress,
        DEFAULT_PROGRESS_INTERVAL_MS,
    ));
    let supervisor = Supervisor::new(
        SupervisorConfig::default().with_stall_timeout(Duration::from_secs(cli.timeout)),
        cancel.clone(),
    );
    let tools = ToolContext::new(supervisor, Arc::clone(&progress));
    let mut operation = build_operation(cli.command, tools, &cancel)?;

    let mut queue = JobQueue::new();
    let summary = walk(
        &root,
        operation.as_mut(),
        scanner,
        &mut queue,
        &cancel,
        &progress,
    )?;

    if cli.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => log::error!("Failed to serialize summary: {}", e),
        }
    } else {
        info!(
            "{} director(ies), {} error(s), {} warning(s) in {}ms",
            summary.directories, summary.errors, summary.warnings, summary.duration_ms
        );
    }
    Ok(summary)
}

fn main() -> ExitCode {
    // Job lines carry their own severity and path prefix
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) if e.is_interrupted() => {
            eprintln!("Interrupted by user!");
            ExitCode::from(130)
        }
        Err(e) => {
            log::error!("{}", e.message);
            ExitCode::from(1)
        }
    }
}

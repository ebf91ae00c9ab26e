//! patchvault binary: download, verify and archive update packages

use clap::Parser;
use patchvault::exit_codes::{EXIT_ERROR, EXIT_PANIC, EXIT_SUCCESS, exit_code_for};
use patchvault::{RunOptions, Session, VaultError};
use std::{env, panic, path::PathBuf, process};

const VERSION: &str = patchvault::version::VERSION;

#[derive(Parser, Debug)]
#[command(version = VERSION, about = "Download signed update packages and archive their payloads")]
struct Args {
    /// Update manifest (XML)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Directory where packages are downloaded (created if missing)
    #[arg(short, long)]
    working_dir: PathBuf,

    /// Archive root containing the x86/x64 trees
    #[arg(short, long)]
    archive_root: PathBuf,

    /// Maximum parallel downloads (defaults to PATCHVAULT_CONCURRENCY or 3)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Extractor command template, e.g. "7z x {package} -o{output} -y"
    #[arg(long)]
    extractor: Option<String>,

    /// Directory for extraction temp dirs (defaults to PATCHVAULT_TMPDIR or the system temp dir)
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Re-download packages even when a valid copy exists
    #[arg(short, long)]
    force: bool,

    /// Log level (trace, debug, info, warn, error; prefix with json: for JSON lines)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    // Set up panic handler to return specific exit code
    panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: {panic_info}");
        process::exit(EXIT_PANIC);
    }));

    let result = panic::catch_unwind(run);

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(_) => {
            eprintln!("Fatal: Unhandled panic in patchvault");
            process::exit(EXIT_PANIC);
        }
    }
}

fn run() -> i32 {
    // Handle --version before clap
    if env::args().nth(1).as_deref() == Some("--version") {
        println!("patchvault {}", patchvault::version::full_version());
        return EXIT_SUCCESS;
    }

    let args = Args::parse();

    if let Some(ref level) = args.log_level {
        patchvault::logger::JsonLogger::init_with_level(level);
    } else {
        patchvault::logger::JsonLogger::init();
    }

    let mut options = RunOptions::new(args.manifest, args.working_dir, args.archive_root);
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency;
    }
    if args.extractor.is_some() {
        options.extractor_template = args.extractor;
    }
    if args.temp_dir.is_some() {
        options.temp_root = args.temp_dir;
    }
    options.force |= args.force;

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {e}");
            return EXIT_ERROR;
        }
    };

    let outcome = runtime.block_on(async {
        let session = Session::new(options)?;
        session.run().await
    });

    match outcome {
        Ok(summary) => {
            log::info!(
                "Done: {} downloaded, {} already valid, {} payload(s) archived",
                summary.download.downloaded(),
                summary.download.skipped(),
                summary.extraction.payload_count()
            );
            EXIT_SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

fn report_error(err: &VaultError) -> i32 {
    eprintln!("patchvault: {err}");
    exit_code_for(err)
}

use clap::Parser;
use log::LevelFilter;
use rrdebug::store::EventStore;
use rrdebug::ui::console::{AppBuilder, DEFAULT_INIT_FILE};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbose logging and printing of every traced write
    #[clap(long)]
    debug: bool,

    /// Create an empty event store and exit
    #[clap(long)]
    create_store: bool,

    /// Event store path
    #[clap(long, env = "RRDEBUG_STORE", default_value = "writes.db")]
    store: PathBuf,

    /// Command file executed before the first prompt
    #[clap(long, default_value = DEFAULT_INIT_FILE)]
    init: PathBuf,
}

fn init_logger(debug: bool) {
    let default_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.debug);

    if args.create_store {
        return match EventStore::create(&args.store) {
            Ok(_) => {
                println!("event store created at {}", args.store.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    let store = match EventStore::open(&args.store) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let app = AppBuilder::new(store)
        .with_init_file(args.init)
        .with_verbose_trace(args.debug)
        .build()
        .and_then(|app| app.run());
    if let Err(e) = app {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

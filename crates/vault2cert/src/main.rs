//! vault2cert command line entry point

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use vault2cert::errors::{EXIT_OK, exit_code_for};
use vault2cert::tracing::init_tracing;
use vault2cert::{Config, cli};
use vault2cert_vault::PkiClient;

fn main() {
    // NOTE: Using eprintln! in panic hook is intentional - tracing infrastructure
    // may be corrupted during a panic, so we use the most reliable output method.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    if let Err(e) = init_tracing(cli.tracing_config()) {
        eprintln!("Warning: {e}");
    }

    std::process::exit(run(&cli));
}

fn run(cli: &cli::Cli) -> i32 {
    let result = Config::from_env(cli).and_then(|config| {
        let client = PkiClient::new(config.vault.clone())?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| vault2cert::Error::io("start", "tokio runtime", e))?;
        let mut stdout = std::io::stdout().lock();
        rt.block_on(vault2cert::run(&config, &client, &mut stdout))
    });

    match result {
        Ok(()) => EXIT_OK,
        Err(err) => {
            let code = exit_code_for(&err);
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    }
}

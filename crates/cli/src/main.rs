use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Diagnostics go to stderr so command output stays machine-readable.
    let filter = EnvFilter::try_from_env("TARIFFTOK_CLI_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(std::io::stderr).init();

    tarifftok_cli::run()
}

use std::path::{Path, PathBuf};

use tarifftok_core::fixtures::{demo_rows, write_csv};

use crate::commands::{load_config, CommandResult};

/// Writes the deterministic demo dataset to `out`, or to the configured
/// `data.path`. Re-running overwrites the same file with the same rows.
pub fn run(out: Option<&Path>) -> CommandResult {
    let directory: PathBuf = match out {
        Some(out) => out.to_path_buf(),
        None => match load_config("seed") {
            Ok(config) => config.data.path,
            Err(failure) => return failure,
        },
    };

    let rows = demo_rows();
    match write_csv(&rows, &directory) {
        Ok(path) => CommandResult::success(
            "seed",
            format!("wrote {} demo tariff rows to {}", rows.len(), path.display()),
        ),
        Err(error) => CommandResult::failure("seed", "seed_write", error.to_string(), 5),
    }
}

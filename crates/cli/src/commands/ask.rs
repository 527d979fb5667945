use std::sync::Arc;

use tarifftok_agent::AgentRuntime;
use tarifftok_core::{RunResult, TariffStore};

use crate::commands::{current_thread_runtime, load_config, load_dataset, CommandResult};

const COMMAND: &str = "ask";

/// Exit code 1 when the run recorded an error, even though it still answered.
pub fn run(query: &str, json_output: bool) -> CommandResult {
    if query.trim().is_empty() {
        return CommandResult::failure(COMMAND, "invalid_input", "query must not be empty", 2);
    }

    let result = match execute(query) {
        Ok(result) => result,
        Err(failure) => return failure,
    };

    let exit_code = if result.error.is_some() { 1 } else { 0 };
    let output = if json_output {
        match serde_json::to_string_pretty(&result) {
            Ok(output) => output,
            Err(error) => {
                return CommandResult::failure(COMMAND, "serialization", error.to_string(), 5)
            }
        }
    } else {
        render_human(&result)
    };

    CommandResult { exit_code, output }
}

fn execute(query: &str) -> Result<RunResult, CommandResult> {
    let config = load_config(COMMAND)?;
    let store: Arc<dyn TariffStore> = Arc::new(load_dataset(COMMAND, &config)?);
    let agent = AgentRuntime::from_config(&config, store).map_err(|error| {
        CommandResult::failure(COMMAND, "llm_client", format!("could not build llm client: {error}"), 3)
    })?;

    let runtime = current_thread_runtime(COMMAND)?;
    Ok(runtime.block_on(agent.run(query)))
}

fn render_human(result: &RunResult) -> String {
    let path = result.path.iter().map(|step| step.as_str()).collect::<Vec<_>>().join(" -> ");
    let mut lines = vec![
        result.response_text.clone(),
        String::new(),
        format!("path: {path}"),
        format!("elapsed: {:.1} ms", result.total_elapsed_ms),
    ];
    if let Some(slowest) = &result.statistics.slowest {
        lines.push(format!("slowest step: {} ({:.1} ms)", slowest.step, slowest.elapsed_ms));
    }
    if let Some(error) = &result.error {
        lines.push(format!("error: {error}"));
    }
    lines.join("\n")
}

use tarifftok_core::{render_dot, FlowEngine, Step, TariffQueryFlow};

use crate::commands::CommandResult;

/// Prints DOT for the routing graph, highlighting `path` when given.
pub fn run(path: Option<&str>) -> CommandResult {
    let steps = match path.map(parse_path).transpose() {
        Ok(steps) => steps,
        Err(message) => return CommandResult::failure("graph", "invalid_input", message, 2),
    };

    CommandResult::text(render_dot(FlowEngine::new(TariffQueryFlow).edges(), steps.as_deref()))
}

fn parse_path(raw: &str) -> Result<Vec<Step>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse::<Step>().map_err(|error| error.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use tarifftok_core::Step;

    use super::parse_path;

    #[test]
    fn path_accepts_loose_spelling() {
        assert_eq!(
            parse_path("start, classify ,handle-error,END"),
            Ok(vec![Step::Start, Step::Classify, Step::HandleError, Step::End])
        );
    }

    #[test]
    fn unknown_step_is_named() {
        assert_eq!(parse_path("START,PRICE"), Err("unknown step `PRICE`".to_string()));
    }
}

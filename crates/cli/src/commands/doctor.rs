use serde::Serialize;
use tarifftok_agent::build_llm_client;
use tarifftok_core::config::{AppConfig, LlmProvider, LoadOptions};
use tarifftok_core::TariffDataset;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            },
            check_dataset(&config),
            check_llm_provider(&config),
        ],
        Err(error) => vec![
            DoctorCheck { name: "config_validation", status: CheckStatus::Fail, details: error.to_string() },
            skipped("dataset_readiness"),
            skipped("llm_provider"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration did not load".to_string(),
    }
}

fn check_dataset(config: &AppConfig) -> DoctorCheck {
    match TariffDataset::load(&config.data.path) {
        Ok(dataset) => {
            let summary = dataset.dataset_summary();
            DoctorCheck {
                name: "dataset_readiness",
                status: CheckStatus::Pass,
                details: format!(
                    "{} records, {} countries, {} product categories",
                    summary.total_records,
                    summary.countries.len(),
                    summary.product_categories.len()
                ),
            }
        }
        Err(error) => DoctorCheck { name: "dataset_readiness", status: CheckStatus::Fail, details: error.to_string() },
    }
}

/// Builds the client without calling it; the first real request is still the
/// authoritative credential check.
fn check_llm_provider(config: &AppConfig) -> DoctorCheck {
    let details = match (config.llm.provider, build_llm_client(&config.llm)) {
        (_, Err(error)) => {
            return DoctorCheck { name: "llm_provider", status: CheckStatus::Fail, details: error.to_string() }
        }
        (LlmProvider::Offline, Ok(_)) => {
            "offline: keyword classifier and template narrator, no network calls".to_string()
        }
        (provider, Ok(_)) => format!("{} client built for model `{}`", provider.as_str(), config.llm.model),
    };
    DoctorCheck { name: "llm_provider", status: CheckStatus::Pass, details }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

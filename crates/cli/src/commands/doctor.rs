use std::sync::Arc;

use mailfn_agent::ResolverBackend;
use mailfn_core::config::{AppConfig, LoadOptions};
use mailfn_functions::build_registry;
use serde::Serialize;

use crate::commands::{block_on_bounded, CommandResult};

/// Exit code when any readiness check fails.
pub const EXIT_DOCTOR_FAILED: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let backend = mailfn_agent::build_client(&config.llm);
            build_report(Ok((&config, backend.as_ref())))
        }
        Err(error) => build_report(Err(error.to_string())),
    };
    render(&report, json_output)
}

/// Runs the checks against an already loaded config and an explicit backend.
pub fn run_with_backend(
    config: &AppConfig,
    backend: Arc<dyn ResolverBackend>,
    json_output: bool,
) -> CommandResult {
    render(&build_report(Ok((config, backend.as_ref()))), json_output)
}

fn render(report: &DoctorReport, json_output: bool) -> CommandResult {
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_DOCTOR_FAILED };
    let output = if json_output {
        serde_json::to_string_pretty(report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(report)
    };
    CommandResult { exit_code, output }
}

pub fn build_report(loaded: Result<(&AppConfig, &dyn ResolverBackend), String>) -> DoctorReport {
    let mut checks = Vec::new();

    match loaded {
        Ok((config, backend)) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_registry(config));
            checks.push(check_backend(config, backend));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error,
            });
            for name in ["registry_bootstrap", "backend_health"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_registry(config: &AppConfig) -> DoctorCheck {
    match build_registry(&config.registry) {
        Ok((registry, _)) if registry.is_empty() => DoctorCheck {
            name: "registry_bootstrap",
            status: CheckStatus::Fail,
            details: format!(
                "no functions registered for modules [{}]",
                config.registry.allowed_modules.join(", ")
            ),
        },
        Ok((registry, summary)) => DoctorCheck {
            name: "registry_bootstrap",
            status: CheckStatus::Pass,
            details: format!(
                "{} function(s) registered, {} skipped",
                registry.len(),
                summary.skipped.len()
            ),
        },
        Err(error) => DoctorCheck {
            name: "registry_bootstrap",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_backend(config: &AppConfig, backend: &dyn ResolverBackend) -> DoctorCheck {
    match block_on_bounded(backend.health()) {
        Err(error) => DoctorCheck {
            name: "backend_health",
            status: CheckStatus::Fail,
            details: format!("failed to initialize async runtime: {error}"),
        },
        Ok(Ok(())) => DoctorCheck {
            name: "backend_health",
            status: CheckStatus::Pass,
            details: format!("{} backend reachable (model `{}`)", backend.provider(), config.llm.model),
        },
        Ok(Err(error)) => DoctorCheck {
            name: "backend_health",
            status: CheckStatus::Fail,
            details: format!("{} backend unreachable: {error}", backend.provider()),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

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

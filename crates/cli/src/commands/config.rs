//! Configuration CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use detect_lib::{
    config::{Environment, MonitoringConfig},
    observability, Settings,
};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{print_error, print_success, print_table, OutputFormat};

/// Row for the configuration table
#[derive(Tabled, Serialize)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    setting: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl SettingRow {
    fn new(setting: &str, value: impl ToString) -> Self {
        Self {
            setting: setting.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ValidationReport {
    environment: Environment,
    valid: bool,
    issues: Vec<String>,
}

/// Load settings for local engine commands
///
/// With `verbose`, engine logs go to the terminal in pretty form.
pub fn load_settings(config_dir: &Path, environment: Environment, verbose: bool) -> Result<Settings> {
    let settings = Settings::load_from(config_dir, environment).context("Failed to load settings")?;
    if verbose {
        observability::init_tracing(&MonitoringConfig {
            log_format: "pretty".to_string(),
            ..settings.monitoring.clone()
        })?;
    }
    Ok(settings)
}

/// Show the effective configuration
pub fn show_config(config_dir: &Path, environment: Environment, format: OutputFormat) -> Result<()> {
    let settings = Settings::load_from(config_dir, environment).context("Failed to load settings")?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", "Configuration".bold());
            let rows = vec![
                SettingRow::new("Environment", settings.environment.as_str()),
                SettingRow::new("Version", &settings.version),
                SettingRow::new("API Host", &settings.api.host),
                SettingRow::new("API Port", settings.api.port),
                SettingRow::new("Model Directory", settings.model.model_dir.display()),
                SettingRow::new("XGBoost Weight", settings.model.xgb_weight),
                SettingRow::new("LSTM Weight", settings.model.lstm_weight),
                SettingRow::new("Threshold", settings.model.threshold),
                SettingRow::new("Inference Workers", settings.model.inference_workers),
                SettingRow::new("Cache Enabled", settings.model.cache_enabled),
                SettingRow::new("Cache TTL", format!("{}s", settings.model.cache_ttl)),
                SettingRow::new("Log Level", &settings.monitoring.log_level),
                SettingRow::new("Log Format", &settings.monitoring.log_format),
                SettingRow::new("Metrics Enabled", settings.monitoring.enable_metrics),
            ];
            print_table(&rows, format);
        }
    }

    Ok(())
}

/// Collect configuration issues without failing on the first one
fn collect_issues(config_dir: &Path, environment: Environment) -> Vec<String> {
    match Settings::load_from(config_dir, environment) {
        Ok(settings) => settings.validate(),
        Err(e) => vec![format!("{:#}", e)],
    }
}

/// Report configuration issues, failing when any are found
pub fn validate_config(config_dir: &Path, environment: Environment, format: OutputFormat) -> Result<()> {
    let issues = collect_issues(config_dir, environment);
    let report = ValidationReport {
        environment,
        valid: issues.is_empty(),
        issues,
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if report.valid {
                print_success(&format!(
                    "Configuration is valid ({})",
                    environment.as_str()
                ));
            } else {
                print_error("Configuration issues found:");
                for issue in &report.issues {
                    eprintln!("  • {}", issue);
                }
            }
        }
    }

    if !report.valid {
        anyhow::bail!("{} configuration issue(s) found", report.issues.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_issues_reports_missing_model_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("testing.toml"),
            "[model]\nmodel_dir = \"/nonexistent/insider-detect/artifacts\"\n",
        )
        .unwrap();

        let issues = collect_issues(dir.path(), Environment::Testing);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("Model directory does not exist"));
    }

    #[test]
    fn test_collect_issues_reports_bad_weights() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("testing.toml"),
            "[model]\nxgb_weight = 0.6\nlstm_weight = 0.6\n",
        )
        .unwrap();

        let issues = collect_issues(dir.path(), Environment::Testing);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("sum to 1.0"));
    }

    #[test]
    fn test_collect_issues_clean_config() {
        let dir = TempDir::new().unwrap();
        let artifacts = dir.path().join("artifacts");
        std::fs::create_dir(&artifacts).unwrap();
        std::fs::write(
            dir.path().join("testing.toml"),
            format!("[model]\nmodel_dir = {:?}\n", artifacts.display().to_string()),
        )
        .unwrap();

        assert!(collect_issues(dir.path(), Environment::Testing).is_empty());
    }
}

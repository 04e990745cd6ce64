//! Project initialization command

use anyhow::{Context, Result};
use detect_lib::config::Environment;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::output::{print_info, print_success, OutputFormat};

/// Directory the generated settings point the engine at
const MODEL_DIR: &str = "models/artifacts";

#[derive(Debug, Default, Serialize)]
struct InitReport {
    environment: String,
    created_directories: Vec<PathBuf>,
    written_files: Vec<PathBuf>,
    skipped_files: Vec<PathBuf>,
}

/// Settings template for `environment`
fn config_template(environment: Environment) -> String {
    let (host, log_level, log_format, workers) = match environment {
        Environment::Production => ("0.0.0.0", "info", "json", 8),
        Environment::Staging => ("0.0.0.0", "info", "json", 4),
        Environment::Development | Environment::Testing => ("127.0.0.1", "debug", "pretty", 2),
    };

    format!(
        r#"# {env} settings. Any key can be overridden with INSIDER_DETECT_<SECTION>__<KEY>,
# e.g. INSIDER_DETECT_MODEL__THRESHOLD=0.6
environment = "{env}"

[api]
host = "{host}"
port = 8000

[model]
model_dir = "{model_dir}"
xgb_weight = 0.6
lstm_weight = 0.4
threshold = 0.5
cache_enabled = true
cache_ttl = 300
inference_workers = {workers}

[monitoring]
log_level = "{log_level}"
log_format = "{log_format}"
enable_metrics = true
"#,
        env = environment.as_str(),
        model_dir = MODEL_DIR,
    )
}

fn create_dir(path: PathBuf, report: &mut InitReport) -> Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
        report.created_directories.push(path);
    }
    Ok(())
}

/// Create the artifact and config directories under `root` and write the
/// settings file for `environment`
///
/// An existing settings file is kept unless `force` is set.
fn init_project(root: &Path, config_dir: &Path, environment: Environment, force: bool) -> Result<InitReport> {
    let mut report = InitReport {
        environment: environment.as_str().to_string(),
        ..InitReport::default()
    };

    let config_dir = root.join(config_dir);
    create_dir(root.join(MODEL_DIR), &mut report)?;
    create_dir(config_dir.clone(), &mut report)?;

    let file = config_dir.join(format!("{}.toml", environment.as_str()));
    if file.exists() && !force {
        report.skipped_files.push(file);
    } else {
        std::fs::write(&file, config_template(environment))
            .with_context(|| format!("Failed to write {}", file.display()))?;
        report.written_files.push(file);
    }

    Ok(report)
}

/// Initialize the working directory for `environment`
pub fn init(config_dir: &Path, environment: Environment, force: bool, format: OutputFormat) -> Result<()> {
    let root = std::env::current_dir().context("Failed to resolve working directory")?;
    let report = init_project(&root, config_dir, environment, force)?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            for dir in &report.created_directories {
                print_success(&format!("Created directory {}", dir.display()));
            }
            for file in &report.written_files {
                print_success(&format!("Wrote {}", file.display()));
            }
            for file in &report.skipped_files {
                print_info(&format!("Kept existing {} (use --force to overwrite)", file.display()));
            }
            print_success(&format!("Initialized for {}", environment.as_str()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use detect_lib::Settings;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_layout() {
        let root = TempDir::new().unwrap();
        let report = init_project(root.path(), Path::new("config"), Environment::Production, false).unwrap();

        assert!(root.path().join(MODEL_DIR).is_dir());
        assert!(root.path().join("config/production.toml").is_file());
        assert_eq!(report.written_files.len(), 1);
        assert_eq!(report.created_directories.len(), 2);
    }

    #[test]
    fn test_templates_load_as_settings() {
        let root = TempDir::new().unwrap();
        for environment in [
            Environment::Development,
            Environment::Staging,
            Environment::Production,
            Environment::Testing,
        ] {
            init_project(root.path(), Path::new("config"), environment, false).unwrap();
            let settings = Settings::load_from(root.path().join("config"), environment).unwrap();
            assert_eq!(settings.environment, environment);
            assert_eq!(settings.model.model_dir, PathBuf::from(MODEL_DIR));
        }
    }

    #[test]
    fn test_existing_file_kept_without_force() {
        let root = TempDir::new().unwrap();
        let config_dir = root.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("development.toml"), "# tuned by hand\n").unwrap();

        let report = init_project(root.path(), Path::new("config"), Environment::Development, false).unwrap();
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            std::fs::read_to_string(config_dir.join("development.toml")).unwrap(),
            "# tuned by hand\n"
        );

        let report = init_project(root.path(), Path::new("config"), Environment::Development, true).unwrap();
        assert_eq!(report.written_files.len(), 1);
        assert!(std::fs::read_to_string(config_dir.join("development.toml"))
            .unwrap()
            .contains("[model]"));
    }
}

//! Model inspection CLI commands
//!
//! These load the artifacts in-process, the same way the server does at
//! startup.

use anyhow::{Context, Result};
use colored::Colorize;
use detect_lib::{ModelKind, ModelMetadata, ModelService, Settings, TractRuntime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{color_status, print_info, print_json, print_table, print_warning, OutputFormat};

/// Row for the model list table
#[derive(Tabled, Serialize)]
struct ModelRow {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Created")]
    created_at: String,
    #[tabled(rename = "Features")]
    features: usize,
    #[tabled(rename = "Checksum")]
    checksum: String,
}

impl From<&ModelMetadata> for ModelRow {
    fn from(meta: &ModelMetadata) -> Self {
        Self {
            kind: meta.model_type.to_string(),
            name: meta.name.clone(),
            version: meta.version.clone(),
            created_at: meta.created_at.clone(),
            features: meta.features.len(),
            checksum: meta
                .checksum
                .as_deref()
                .map(|c| c.chars().take(12).collect())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Row for the health table
#[derive(Tabled, Serialize)]
struct HealthRow {
    #[tabled(rename = "Check")]
    check: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn build_service(settings: &Settings) -> Result<ModelService> {
    ModelService::new(settings.model.clone(), Arc::new(TractRuntime::new()))
        .context("Invalid model configuration")
}

/// Load the models and list their metadata
pub async fn list_models(settings: &Settings, format: OutputFormat) -> Result<()> {
    let service = build_service(settings)?;
    service
        .initialize()
        .await
        .context("Failed to load models")?;

    let info: BTreeMap<ModelKind, ModelMetadata> = service.get_model_info().await;
    service.cleanup().await;

    match format {
        OutputFormat::Json => print_json(&info),
        OutputFormat::Table => {
            println!(
                "{} {}",
                "Models in".bold(),
                settings.model.model_dir.display().to_string().cyan()
            );
            let rows: Vec<ModelRow> = info.values().map(ModelRow::from).collect();
            print_table(&rows, format);
        }
    }

    Ok(())
}

/// Attempt a load and report the resulting model health
///
/// A failed load is reported rather than returned, so the health table
/// still shows what state the service ended in.
pub async fn show_health(settings: &Settings, format: OutputFormat) -> Result<()> {
    let service = build_service(settings)?;
    if let Err(e) = service.initialize().await {
        if matches!(format, OutputFormat::Table) {
            print_warning(&format!("Model loading failed: {}", e));
        }
    }

    let health = service.get_model_health().await;
    let last_error = service.last_error().await;
    service.cleanup().await;

    match format {
        OutputFormat::Json => {
            let mut body = serde_json::to_value(&health)?;
            if let (Some(obj), Some(e)) = (body.as_object_mut(), &last_error) {
                obj.insert("error".to_string(), serde_json::Value::String(e.to_string()));
            }
            print_json(&body);
        }
        OutputFormat::Table => {
            let kinds: Vec<String> = health
                .metadata_available
                .iter()
                .map(ModelKind::to_string)
                .collect();
            let rows = vec![
                HealthRow {
                    check: "Initialized".to_string(),
                    value: color_status(&health.initialized.to_string()),
                },
                HealthRow {
                    check: "State".to_string(),
                    value: color_status(&health.state.to_string()),
                },
                HealthRow {
                    check: "Artifacts Loaded".to_string(),
                    value: health.models_loaded.join(", "),
                },
                HealthRow {
                    check: "Metadata Available".to_string(),
                    value: kinds.join(", "),
                },
                HealthRow {
                    check: "Cache".to_string(),
                    value: format!(
                        "{} (ttl {}s)",
                        if health.cache_enabled { "enabled" } else { "disabled" },
                        health.cache_ttl
                    ),
                },
            ];
            print_table(&rows, format);
            if health.initialized {
                print_info("All required models are loaded");
            }
        }
    }

    Ok(())
}

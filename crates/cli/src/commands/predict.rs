//! Session scoring CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use detect_lib::{InferenceResult, ModelKind, ModelService, Settings, TractRuntime};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_decision, format_probability, print_json, print_table, OutputFormat};

/// Row for the result metadata table
#[derive(Tabled, Serialize)]
struct MetadataRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Read a session document from disk
fn read_session(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Session file {} is not valid JSON", path.display()))
}

/// Score a session with models loaded in this process
pub async fn predict_local(
    settings: &Settings,
    file: &Path,
    mode: ModelKind,
    format: OutputFormat,
) -> Result<()> {
    let session = read_session(file)?;

    let service = ModelService::new(settings.model.clone(), Arc::new(TractRuntime::new()))
        .context("Invalid model configuration")?;
    service
        .initialize()
        .await
        .context("Failed to load models")?;

    let outcome = service.predict(&session, mode).await;
    service.cleanup().await;

    let result = outcome.context("Prediction failed")?;
    print_result(&result, format);
    Ok(())
}

/// Score a session against a running server
pub async fn score_remote(
    client: &ApiClient,
    file: &Path,
    mode: ModelKind,
    format: OutputFormat,
) -> Result<()> {
    let session = read_session(file)?;
    let result = client.predict(&session, mode).await?;
    print_result(&result, format);
    Ok(())
}

fn metadata_rows(result: &InferenceResult) -> Vec<MetadataRow> {
    result
        .metadata
        .iter()
        .map(|(key, value)| MetadataRow {
            key: key.clone(),
            value: match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
        .collect()
}

fn print_result(result: &InferenceResult, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Table => {
            println!("{}", "Prediction".bold());
            println!("{}", "=".repeat(50));
            println!(
                "Decision:               {}",
                color_decision(result.prediction, result.probability)
            );
            println!(
                "Probability:            {}",
                format_probability(result.probability)
            );
            println!(
                "Confidence:             {}",
                format_probability(result.confidence)
            );
            println!(
                "Model:                  {} {}",
                result.model_name.cyan(),
                result.model_version
            );
            println!(
                "Inference Time:         {:.2} ms",
                result.inference_time * 1000.0
            );
            println!(
                "Features Used:          {}",
                result.features_used.len()
            );
            println!();
            print_table(&metadata_rows(result), format);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_read_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"user_id": "u1", "events": []}"#).unwrap();

        let session = read_session(&path).unwrap();
        assert_eq!(session["user_id"], "u1");
    }

    #[test]
    fn test_read_session_errors() {
        let dir = TempDir::new().unwrap();
        assert!(read_session(&dir.path().join("missing.json")).is_err());

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = format!("{:#}", read_session(&path).unwrap_err());
        assert!(err.contains("not valid JSON"));
    }

    #[test]
    fn test_metadata_rows_unquote_strings() {
        let mut metadata = BTreeMap::new();
        metadata.insert("model_type".to_string(), json!("hybrid"));
        metadata.insert("threshold".to_string(), json!(0.5));
        let result = InferenceResult {
            prediction: 0,
            probability: 0.3,
            confidence: 0.4,
            model_name: "Hybrid Ensemble".to_string(),
            model_version: "v2".to_string(),
            inference_time: 0.01,
            features_used: vec![],
            metadata,
        };

        let rows = metadata_rows(&result);
        assert_eq!(rows[0].key, "model_type");
        assert_eq!(rows[0].value, "hybrid");
        assert_eq!(rows[1].value, "0.5");
    }
}

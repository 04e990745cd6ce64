//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use detect_lib::observability::threat_severity;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a probability as a percentage
pub fn format_probability(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "ready" | "healthy" | "true" => status.green().to_string(),
        "initializing" | "degraded" => status.yellow().to_string(),
        "uninitialized" | "failed" | "unhealthy" | "false" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Decision label colored by threat severity
pub fn color_decision(prediction: u8, probability: f64) -> String {
    if prediction == 0 {
        return "benign".green().to_string();
    }
    let label = format!("threat ({})", threat_severity(probability));
    match threat_severity(probability) {
        "high" => label.red().bold().to_string(),
        "medium" => label.red().to_string(),
        _ => label.yellow().to_string(),
    }
}

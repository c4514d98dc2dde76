//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
#[allow(dead_code)]
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

/// Color an alert severity for terminal display
pub fn color_severity(severity: &str) -> String {
    match severity.to_uppercase().as_str() {
        "CRITICAL" => severity.red().bold().to_string(),
        "HIGH" => severity.red().to_string(),
        "MEDIUM" => severity.yellow().to_string(),
        "LOW" => severity.blue().to_string(),
        _ => severity.to_string(),
    }
}

/// Color an alert or component status
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "active" => status.red().to_string(),
        "resolved" | "healthy" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a history event kind
pub fn color_event(event: &str) -> String {
    match event {
        "created" => event.yellow().to_string(),
        "acknowledged" => event.blue().to_string(),
        "resolved" => event.green().to_string(),
        _ => event.to_string(),
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}

/// Shorten a UUID for table display
pub fn truncate_id(id: &str) -> String {
    if id.len() > 8 {
        format!("{}...", &id[..8])
    } else {
        id.to_string()
    }
}

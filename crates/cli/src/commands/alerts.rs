//! Alert lifecycle CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{AcknowledgeRequest, Alert, ApiClient, HistoryRecord, ResolveRequest};
use crate::output::{
    color_event, color_severity, format_timestamp, print_info, print_success, truncate_id,
    OutputFormat,
};

/// Row for the active alert table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Ack")]
    acknowledged: String,
    #[tabled(rename = "Esc")]
    escalation_level: u32,
    #[tabled(rename = "Created")]
    created_at: String,
}

fn alert_row(alert: &Alert) -> AlertRow {
    AlertRow {
        id: truncate_id(&alert.id),
        severity: color_severity(&alert.severity),
        category: alert.category.clone(),
        title: alert.title.clone(),
        acknowledged: if alert.acknowledged {
            "yes".green().to_string()
        } else {
            "no".yellow().to_string()
        },
        escalation_level: alert.escalation_level,
        created_at: format_timestamp(&alert.created_at),
    }
}

/// List active alerts, optionally filtered
pub async fn list_active(
    client: &ApiClient,
    category: Option<String>,
    severity: Option<String>,
    acknowledged: Option<bool>,
    format: OutputFormat,
) -> Result<()> {
    let mut path = "api/v1/alerts/active".to_string();
    let mut params = Vec::new();
    if let Some(category) = &category {
        params.push(format!("category={}", category));
    }
    if let Some(severity) = &severity {
        params.push(format!("severity={}", severity));
    }
    if let Some(acknowledged) = acknowledged {
        params.push(format!("acknowledged={}", acknowledged));
    }
    if !params.is_empty() {
        path.push('?');
        path.push_str(&params.join("&"));
    }

    let alerts: Vec<Alert> = client.get(&path).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&alerts)?);
        }
        OutputFormat::Table => {
            if alerts.is_empty() {
                print_info("No active alerts");
                return Ok(());
            }

            let rows: Vec<AlertRow> = alerts.iter().map(alert_row).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} active alerts", alerts.len());
        }
    }

    Ok(())
}

/// Acknowledge an alert
pub async fn acknowledge(
    client: &ApiClient,
    id: &str,
    by: &str,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/v1/alerts/{}/acknowledge", id);
    let alert: Alert = client
        .post(
            &path,
            &AcknowledgeRequest {
                by: by.to_string(),
            },
        )
        .await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&alert)?);
        }
        OutputFormat::Table => {
            print_success(&format!(
                "Acknowledged alert {} as {}",
                truncate_id(&alert.id),
                by
            ));
            println!("Severity: {}", color_severity(&alert.severity));
            println!("Title:    {}", alert.title);
        }
    }

    Ok(())
}

/// Resolve an alert
pub async fn resolve(
    client: &ApiClient,
    id: &str,
    by: &str,
    resolution: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/v1/alerts/{}/resolve", id);
    let alert: Alert = client
        .post(
            &path,
            &ResolveRequest {
                by: by.to_string(),
                resolution,
            },
        )
        .await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&alert)?);
        }
        OutputFormat::Table => {
            print_success(&format!(
                "Resolved alert {} as {}",
                truncate_id(&alert.id),
                by
            ));
            println!("Severity: {}", color_severity(&alert.severity));
            println!("Title:    {}", alert.title);
            if let Some(resolution) = &alert.resolution {
                println!("Note:     {}", resolution);
            }
        }
    }

    Ok(())
}

/// Row for the history table
#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "When")]
    at: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Title")]
    title: String,
}

/// Show alert history, newest first
pub async fn history(
    client: &ApiClient,
    category: Option<String>,
    severity: Option<String>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let mut path = format!("api/v1/alerts/history?limit={}", limit);
    if let Some(category) = &category {
        path.push_str(&format!("&category={}", category));
    }
    if let Some(severity) = &severity {
        path.push_str(&format!("&severity={}", severity));
    }

    let records: Vec<HistoryRecord> = client.get(&path).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Table => {
            if records.is_empty() {
                print_info("No history records");
                return Ok(());
            }

            let rows: Vec<HistoryRow> = records
                .iter()
                .map(|record| HistoryRow {
                    at: format_timestamp(&record.at),
                    event: color_event(&record.event),
                    id: truncate_id(&record.alert.id),
                    severity: color_severity(&record.alert.severity),
                    title: record.alert.title.clone(),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} records", records.len());
        }
    }

    Ok(())
}

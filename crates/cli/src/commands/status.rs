//! Engine status CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, EngineStatistics, HealthResponse, ReadinessResponse};
use crate::output::{color_status, format_timestamp, OutputFormat};

/// Show engine statistics
pub async fn show_statistics(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats: EngineStatistics = client.get("api/v1/statistics").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Table => {
            println!("{}", "Engine Statistics".bold());
            println!("{}", "=".repeat(50));
            println!("Tracked Metrics:        {}", stats.tracked_metrics);
            println!();

            println!("{}", "Alerts".bold());
            println!("{}", "-".repeat(50));
            println!("Active:                 {}", stats.alerts.active_total);
            println!(
                "Unacknowledged:         {}",
                stats.alerts.active_unacknowledged
            );
            for severity in ["CRITICAL", "HIGH", "MEDIUM", "LOW"] {
                if let Some(count) = stats.alerts.active_by_severity.get(severity) {
                    println!("  {:<21} {}", format!("{}:", severity), count);
                }
            }
            let mut categories: Vec<_> = stats.alerts.active_by_category.iter().collect();
            categories.sort_by(|a, b| a.0.cmp(b.0));
            for (category, count) in categories {
                println!("  {:<21} {}", format!("{}:", category), count);
            }
            println!("Created (lifetime):     {}", stats.alerts.created_total);
            println!("Deduplicated:           {}", stats.alerts.deduplicated_total);
            println!(
                "Resolved:               {} ({} auto)",
                stats.alerts.resolved_total, stats.alerts.auto_resolved_total
            );
            println!("Resolved (last 24h):    {}", stats.alerts.resolved_last_24h);
            println!("Escalations:            {}", stats.alerts.escalations_total);
            println!(
                "Notifications:          {} sent, {} failed",
                stats.alerts.notifications_sent_total, stats.alerts.notifications_failed_total
            );
            println!("History Records:        {}", stats.alerts.history_records);
            println!();

            println!("{}", "Analysis".bold());
            println!("{}", "-".repeat(50));
            println!("Cycles Completed:       {}", stats.analysis.cycles_completed);
            println!("Baselines Tracked:      {}", stats.analysis.baselines_tracked);
            println!("Correlated Pairs:       {}", stats.analysis.correlated_pairs);
            if let Some(at) = &stats.analysis.last_cycle_at {
                println!("Last Cycle:             {}", format_timestamp(at));
            }
        }
    }

    Ok(())
}

/// Row for the component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

/// Show engine health and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get_lenient("healthz").await?;
    let readiness: ReadinessResponse = client.get_lenient("readyz").await?;

    match format {
        OutputFormat::Json => {
            let combined = serde_json::json!({
                "health": health,
                "readiness": readiness,
            });
            println!("{}", serde_json::to_string_pretty(&combined)?);
        }
        OutputFormat::Table => {
            println!("{}", "Engine Health".bold());
            println!("{}", "=".repeat(50));
            println!("Overall:    {}", color_status(&health.status));
            if readiness.ready {
                println!("Ready:      {}", "yes".green());
            } else {
                let reason = readiness.reason.as_deref().unwrap_or("not ready");
                println!("Ready:      {} ({})", "no".red(), reason);
            }
            println!();

            if health.components.is_empty() {
                return Ok(());
            }

            let mut rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_default(),
                    last_check: format_timestamp(&component.last_check),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

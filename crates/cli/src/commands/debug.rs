//! Debug CLI commands for feeding samples into a running engine

use anyhow::Result;

use crate::client::{ApiClient, RecordMetricRequest, RecordMetricResponse};
use crate::output::{print_info, print_success, OutputFormat};

/// Record one or more identical samples against a tracked metric
pub async fn record_sample(
    client: &ApiClient,
    name: &str,
    value: f64,
    count: u32,
    format: OutputFormat,
) -> Result<()> {
    let request = RecordMetricRequest {
        name: name.to_string(),
        value,
    };

    let mut response: RecordMetricResponse = client.post("api/v1/metrics", &request).await?;
    for _ in 1..count.max(1) {
        response = client.post("api/v1/metrics", &request).await?;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Table => {
            print_success(&format!("Recorded {} = {}", response.metric, value));
            if response.ready {
                println!("Baseline ready ({} samples)", response.samples);
            } else {
                print_info(&format!(
                    "Baseline warming up ({} samples)",
                    response.samples
                ));
            }
        }
    }

    Ok(())
}

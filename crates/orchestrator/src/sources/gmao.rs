//! GMAO incident webhook intake
//!
//! Maps the maintenance system's incident payload onto an [`IncidentReport`]
//! and forwards it to the incident analysis agent with bounded retries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::McpConfig;
use crate::incident::IncidentReport;
use crate::metrics;
use crate::template::render_template;
use crate::Result;

/// Header carrying the shared webhook secret.
pub const GMAO_TOKEN_HEADER: &str = "X-GMAO-Token";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmaoWebhookPayload {
    pub external_incident_id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub incident_created_at: DateTime<Utc>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub affected_services: Vec<String>,
    #[serde(default)]
    pub reported_by_gmao_user_id: Option<String>,
    #[serde(default)]
    pub gmao_link: Option<String>,
    #[serde(default)]
    pub additional_data: Option<Map<String, Value>>,
}

const DESCRIPTION_TEMPLATE: &str = "{{ title }}

{{ description }}

GMAO Status: {{ status }}
{% if image_url %}Image URL: {{ image_url }}
{% endif %}{% if gmao_link %}GMAO Link: {{ gmao_link }}
{% endif %}{% if additional_data %}Additional Data: {{ additional_data }}
{% endif %}";

/// `low` -> 3, `medium` -> 2, `high` -> 1; anything else has no priority.
pub fn map_priority(priority: &str) -> Option<u8> {
    match priority.trim().to_lowercase().as_str() {
        "low" => Some(3),
        "medium" => Some(2),
        "high" => Some(1),
        _ => None,
    }
}

pub fn map_gmao_to_incident_report(payload: &GmaoWebhookPayload) -> Result<IncidentReport> {
    let additional_data = match &payload.additional_data {
        Some(data) if !data.is_empty() => serde_json::to_string(data)?,
        _ => String::new(),
    };
    let context = json!({
        "title": payload.title,
        "description": payload.description,
        "status": payload.status,
        "image_url": payload.image_url.clone().unwrap_or_default(),
        "gmao_link": payload.gmao_link.clone().unwrap_or_default(),
        "additional_data": additional_data,
    });
    let description = render_template(DESCRIPTION_TEMPLATE, &context)?;

    Ok(IncidentReport {
        incident_id: payload.external_incident_id.clone(),
        timestamp: payload.incident_created_at,
        description: description.trim_end().to_string(),
        priority: map_priority(&payload.priority),
        affected_systems: payload.affected_services.clone(),
        reporter: payload.reported_by_gmao_user_id.clone(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOutcome {
    Delivered { attempts: u32, status: u16 },
    /// The agent refused the report with a 4xx; not retried.
    Rejected { attempts: u32, status: u16 },
    /// Every attempt failed with a network error or a 5xx.
    Exhausted { attempts: u32, last_error: String },
}

impl ForwardOutcome {
    fn label(&self) -> &'static str {
        match self {
            ForwardOutcome::Delivered { .. } => "delivered",
            ForwardOutcome::Rejected { .. } => "rejected",
            ForwardOutcome::Exhausted { .. } => "exhausted",
        }
    }
}

/// Posts incident reports to the incident agent.
#[derive(Clone)]
pub struct IncidentForwarder {
    client: reqwest::Client,
    url: String,
    max_attempts: u32,
    retry_delays: Vec<Duration>,
}

impl IncidentForwarder {
    pub fn new(url: impl Into<String>, timeout: Duration, max_attempts: u32, retry_delays: Vec<Duration>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            max_attempts: max_attempts.max(1),
            retry_delays,
        })
    }

    pub fn from_config(config: &McpConfig) -> Result<Self> {
        Self::new(
            config.incident_agent_url.clone(),
            Duration::from_secs(config.forward_timeout_secs),
            config.forward_max_attempts,
            config.forward_retry_delays(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Delay before retry number `retry` (1-based); the last entry repeats.
    fn delay_before(&self, retry: u32) -> Duration {
        let index = (retry as usize).saturating_sub(1);
        self.retry_delays
            .get(index)
            .or_else(|| self.retry_delays.last())
            .copied()
            .unwrap_or_default()
    }

    pub async fn forward_incident_to_agent(&self, report: &IncidentReport) -> ForwardOutcome {
        let id = &report.incident_id;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = self.delay_before(attempt - 1);
                warn!(
                    "Retrying forward of incident {} in {:?} (attempt {}/{})",
                    id, delay, attempt, self.max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            match self.client.post(&self.url).json(report).send().await {
                Ok(response) if response.status().is_success() => {
                    let status = response.status().as_u16();
                    info!(
                        "Successfully forwarded incident {} to incident agent at {}. Status: {}",
                        id, self.url, status
                    );
                    return self.finish(ForwardOutcome::Delivered { attempts: attempt, status });
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    error!(
                        "HTTP error forwarding incident {} to incident agent: {} - {}",
                        id, status, body
                    );
                    if status.is_client_error() {
                        return self.finish(ForwardOutcome::Rejected {
                            attempts: attempt,
                            status: status.as_u16(),
                        });
                    }
                    last_error = format!("HTTP {}", status.as_u16());
                }
                Err(e) => {
                    error!("Request error forwarding incident {} to incident agent: {}", id, e);
                    last_error = e.to_string();
                }
            }
        }

        error!(
            "Giving up on incident {} after {} attempts: {}",
            id, self.max_attempts, last_error
        );
        self.finish(ForwardOutcome::Exhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }

    fn finish(&self, outcome: ForwardOutcome) -> ForwardOutcome {
        metrics::record_forward(outcome.label());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_payload(priority: &str) -> GmaoWebhookPayload {
        serde_json::from_value(json!({
            "external_incident_id": "test-incident-001",
            "title": "Test Incident Title",
            "description": "Detailed description of the test incident.",
            "status": "OPEN",
            "priority": priority,
            "incident_created_at": "2023-10-28T10:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_map_basic_payload() {
        let payload = minimal_payload("MEDIUM");
        let report = map_gmao_to_incident_report(&payload).unwrap();

        assert_eq!(report.incident_id, "test-incident-001");
        assert_eq!(report.timestamp, payload.incident_created_at);
        assert!(report.description.starts_with("Test Incident Title"));
        assert!(report.description.contains("Detailed description of the test incident."));
        assert!(report.description.contains("GMAO Status: OPEN"));
        assert!(!report.description.contains("GMAO Link"));
        assert_eq!(report.priority, Some(2));
        assert!(report.affected_systems.is_empty());
        assert!(report.reporter.is_none());
    }

    #[test]
    fn test_map_optional_fields() {
        let mut payload = minimal_payload("high");
        payload.image_url = Some("http://example.com/image.png".to_string());
        payload.affected_services = vec!["service1".to_string(), "service2".to_string()];
        payload.reported_by_gmao_user_id = Some("test_reporter_id".to_string());
        payload.gmao_link = Some("http://gmao.example.com/123".to_string());
        payload.additional_data = json!({"key1": "value1"}).as_object().cloned();

        let report = map_gmao_to_incident_report(&payload).unwrap();

        assert_eq!(report.affected_systems, vec!["service1", "service2"]);
        assert_eq!(report.reporter.as_deref(), Some("test_reporter_id"));
        assert!(report.description.contains("Image URL: http://example.com/image.png"));
        assert!(report.description.contains("GMAO Link: http://gmao.example.com/123"));
        assert!(report.description.contains(r#"Additional Data: {"key1":"value1"}"#));
    }

    #[test]
    fn test_priority_variations() {
        for (raw, expected) in [
            ("LOW", Some(3)),
            ("low", Some(3)),
            ("MEDIUM", Some(2)),
            ("High", Some(1)),
            ("CRITICAL", None),
            ("UnknownValue", None),
        ] {
            assert_eq!(map_priority(raw), expected, "priority {}", raw);
        }
    }

    #[test]
    fn test_delay_table_repeats_last_entry() {
        let forwarder = IncidentForwarder::new(
            "http://localhost:1/api/analyze",
            Duration::from_secs(1),
            5,
            vec![Duration::from_secs(2), Duration::from_secs(5)],
        )
        .unwrap();

        assert_eq!(forwarder.delay_before(1), Duration::from_secs(2));
        assert_eq!(forwarder.delay_before(2), Duration::from_secs(5));
        assert_eq!(forwarder.delay_before(4), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let result = serde_json::from_value::<GmaoWebhookPayload>(json!({
            "external_incident_id": "x",
            "title": "t"
        }));
        assert!(result.is_err());
    }
}

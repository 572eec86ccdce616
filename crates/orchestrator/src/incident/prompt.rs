use serde_json::json;
use tracing::info;

use super::IncidentReport;
use crate::{template::render_template, Result};

const NOT_SPECIFIED: &str = "Not specified";

pub const INCIDENT_PROMPT_TEMPLATE: &str = r#"Analyze the following incident report and provide a structured JSON response.

Incident Details:
ID: {{ incident_id }}
Timestamp: {{ timestamp }}
Priority: {{ priority }}
Affected Systems: {{ affected_systems }}
Reporter: {{ reporter }}
Description:
```
{{ description }}
```

Required JSON Output Format:
```json
{
  "potential_root_causes": [
    "Cause 1 description...",
    "Cause 2 description..."
  ],
  "recommended_actions": [
    "Action 1 description...",
    "Action 2 description..."
  ],
  "potential_impact": "Description of potential impact...",
  "confidence_explanation": "Explanation of why the analysis is confident/uncertain..."
}
```

Instructions for Analysis:
1. Identify the most likely root causes based *only* on the provided description.
2. Suggest concrete, actionable steps to investigate and resolve the issue.
3. Briefly describe the potential impact if the incident is not addressed.
4. Explain the reasoning behind your confidence in this analysis. Be specific about ambiguities or assumptions.
5. Ensure the output strictly adheres to the JSON format specified above. Do not include any text outside the JSON structure.

JSON Response:
```json
"#;

/// Builds the analysis prompt for an incident. Missing optional fields read "Not specified".
pub fn build_incident_prompt(incident: &IncidentReport) -> Result<String> {
    info!("Creating LLM prompt for incident ID: {}", incident.incident_id);

    let context = json!({
        "incident_id": incident.incident_id,
        "timestamp": incident.timestamp.to_rfc3339(),
        "priority": incident
            .priority
            .map(|p| p.to_string())
            .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        "affected_systems": if incident.affected_systems.is_empty() {
            NOT_SPECIFIED.to_string()
        } else {
            incident.affected_systems.join(", ")
        },
        "reporter": incident
            .reporter
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        "description": incident.description,
    });

    render_template(INCIDENT_PROMPT_TEMPLATE, &context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn basic_incident() -> IncidentReport {
        IncidentReport {
            incident_id: "INC-001".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 8, 15, 10, 30, 0).unwrap(),
            description: "Server XYZ is unresponsive.".to_string(),
            priority: Some(1),
            affected_systems: vec!["Server XYZ".to_string(), "Auth Service".to_string()],
            reporter: Some("User A".to_string()),
        }
    }

    fn minimal_incident() -> IncidentReport {
        IncidentReport {
            incident_id: "INC-002".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 8, 15, 10, 30, 0).unwrap(),
            description: "Database connection errors.".to_string(),
            priority: None,
            affected_systems: Vec::new(),
            reporter: None,
        }
    }

    #[test]
    fn test_prompt_includes_all_fields() {
        let prompt = build_incident_prompt(&basic_incident()).unwrap();

        assert!(prompt.contains("ID: INC-001"));
        assert!(prompt.contains("Timestamp: 2024-08-15T10:30:00+00:00"));
        assert!(prompt.contains("Priority: 1"));
        assert!(prompt.contains("Affected Systems: Server XYZ, Auth Service"));
        assert!(prompt.contains("Reporter: User A"));
        assert!(prompt.contains("Description:\n```\nServer XYZ is unresponsive.\n```"));
        assert!(prompt.starts_with("Analyze the following incident report"));
        assert!(prompt.contains("Required JSON Output Format:"));
        assert!(prompt.contains("Instructions for Analysis:"));
        assert!(prompt.contains("potential_root_causes"));
        assert!(prompt.contains("recommended_actions"));
    }

    #[test]
    fn test_prompt_marks_missing_fields() {
        let prompt = build_incident_prompt(&minimal_incident()).unwrap();

        assert!(prompt.contains("ID: INC-002"));
        assert!(prompt.contains("Priority: Not specified"));
        assert!(prompt.contains("Affected Systems: Not specified"));
        assert!(prompt.contains("Reporter: Not specified"));
    }

    #[test]
    fn test_prompt_ends_with_open_json_fence() {
        let prompt = build_incident_prompt(&basic_incident()).unwrap();
        assert!(prompt.ends_with("JSON Response:\n```json\n"));
    }

    #[test]
    fn test_description_is_inserted_verbatim() {
        let mut incident = minimal_incident();
        incident.description = "Saw {{ braces }} and <tags> & more".to_string();
        let prompt = build_incident_prompt(&incident).unwrap();
        assert!(prompt.contains("Saw {{ braces }} and <tags> & more"));
    }
}

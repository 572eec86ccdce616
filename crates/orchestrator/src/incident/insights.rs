use tracing::info;

use super::{ActionableInsight, InsightType, LlmStructuredResponse};

/// Classifies an action by keywords in its lowercased text.
pub fn classify_action(action: &str) -> InsightType {
    let text = action.to_lowercase();

    if text.contains("escalate") || text.contains("contact") {
        InsightType::Escalate
    } else if text.contains("update") && (text.contains("kb") || text.contains("doc")) {
        InsightType::UpdateDoc
    } else if text.contains("configure") || text.contains("change setting") {
        InsightType::Configure
    } else {
        InsightType::Investigate
    }
}

/// First affected system mentioned in the action text, ignoring case.
fn find_target(action: &str, affected_systems: &[String]) -> Option<String> {
    let text = action.to_lowercase();
    affected_systems
        .iter()
        .filter(|system| !system.trim().is_empty())
        .find(|system| text.contains(&system.to_lowercase()))
        .cloned()
}

/// One insight per recommended action, numbered from 1.
pub fn extract_insights(parsed: &LlmStructuredResponse, affected_systems: &[String]) -> Vec<ActionableInsight> {
    info!("Extracting actionable insights...");

    parsed
        .recommended_actions
        .iter()
        .enumerate()
        .map(|(i, action)| ActionableInsight {
            insight_id: format!("insight-{}", i + 1),
            description: action.description.clone(),
            target: find_target(&action.description, affected_systems),
            insight_type: classify_action(&action.description),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::RecommendedAction;

    fn with_actions(actions: &[&str]) -> LlmStructuredResponse {
        LlmStructuredResponse {
            potential_root_causes: Vec::new(),
            recommended_actions: actions
                .iter()
                .map(|a| RecommendedAction {
                    description: a.to_string(),
                    priority: None,
                })
                .collect(),
            potential_impact: None,
            confidence_explanation: None,
        }
    }

    #[test]
    fn test_classification_keywords() {
        assert_eq!(classify_action("Escalate to the DBA on call"), InsightType::Escalate);
        assert_eq!(classify_action("Contact the vendor"), InsightType::Escalate);
        assert_eq!(classify_action("Update the KB article for pump P-12"), InsightType::UpdateDoc);
        assert_eq!(classify_action("Update documentation"), InsightType::UpdateDoc);
        assert_eq!(classify_action("Configure connection pool limits"), InsightType::Configure);
        assert_eq!(classify_action("Change settings on the load balancer"), InsightType::Configure);
        assert_eq!(classify_action("Check logs for errors"), InsightType::Investigate);
        // Update without a doc keyword is not a documentation task
        assert_eq!(classify_action("Update the driver"), InsightType::Investigate);
    }

    #[test]
    fn test_escalation_takes_precedence() {
        assert_eq!(
            classify_action("Contact support and configure failover"),
            InsightType::Escalate
        );
    }

    #[test]
    fn test_insights_are_numbered_with_targets() {
        let parsed = with_actions(&[
            "Check user-service logs for errors.",
            "Configure the Load Balancer health checks.",
            "Review recent deployments.",
        ]);
        let systems = vec!["user-service".to_string(), "load balancer".to_string()];

        let insights = extract_insights(&parsed, &systems);

        assert_eq!(insights.len(), 3);
        assert_eq!(insights[0].insight_id, "insight-1");
        assert_eq!(insights[0].target.as_deref(), Some("user-service"));
        assert_eq!(insights[0].insight_type, InsightType::Investigate);
        assert_eq!(insights[1].insight_id, "insight-2");
        assert_eq!(insights[1].target.as_deref(), Some("load balancer"));
        assert_eq!(insights[1].insight_type, InsightType::Configure);
        assert_eq!(insights[2].target, None);
    }

    #[test]
    fn test_no_actions_no_insights() {
        assert!(extract_insights(&with_actions(&[]), &[]).is_empty());
    }
}

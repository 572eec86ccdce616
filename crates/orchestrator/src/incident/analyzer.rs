use md5::{Digest, Md5};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::{
    build_incident_prompt, calculate_confidence, extract_insights, parse_llm_response, AnalysisResult,
    AnalysisSource, IncidentReport, LlmClient,
};
use crate::metrics;
use crate::store::AnalysisStore;

pub const LLM_UNAVAILABLE: &str = "Failed to get response from LLM service.";

/// Lowercases, trims and collapses whitespace so cosmetic edits hit the same cache entry.
pub fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cache key for an incident: hex MD5 of the normalized description.
pub fn description_hash(description: &str) -> String {
    let digest = Md5::digest(normalize_description(description).as_bytes());
    format!("{:x}", digest)
}

pub struct IncidentAnalyzer {
    llm: Arc<dyn LlmClient>,
    store: Option<Arc<dyn AnalysisStore>>,
}

impl IncidentAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>, store: Option<Arc<dyn AnalysisStore>>) -> Self {
        Self { llm, store }
    }

    pub fn store(&self) -> Option<&Arc<dyn AnalysisStore>> {
        self.store.as_ref()
    }

    /// Runs the full analysis. Never fails: problems are reported in `errors`.
    pub async fn analyze(&self, incident: &IncidentReport) -> AnalysisResult {
        info!("Starting analysis for incident ID: {}", incident.incident_id);
        let start = Instant::now();
        let hash = description_hash(&incident.description);

        if let Some(mut cached) = self.lookup(&hash, incident).await {
            cached.processing_time_seconds = Some(start.elapsed().as_secs_f64());
            metrics::record_analysis(cached.analysis_source);
            return cached;
        }

        let mut result = AnalysisResult::new(&incident.incident_id);
        self.run_llm_analysis(incident, &mut result).await;
        result.processing_time_seconds = Some(start.elapsed().as_secs_f64());

        if result.analysis_source != AnalysisSource::Error {
            self.save(&hash, incident, &result).await;
        }

        info!(
            "Finished analysis for incident ID: {}. Time taken: {:.2}s",
            incident.incident_id,
            result.processing_time_seconds.unwrap_or_default()
        );
        metrics::record_analysis(result.analysis_source);
        result
    }

    async fn run_llm_analysis(&self, incident: &IncidentReport, result: &mut AnalysisResult) {
        let prompt = match build_incident_prompt(incident) {
            Ok(prompt) => prompt,
            Err(e) => {
                error!("Failed to build prompt for incident {}: {}", incident.incident_id, e);
                result.fail(format!("Failed to build prompt: {}", e));
                return;
            }
        };

        let raw = match self.llm.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("LLM call failed for incident {}: {}", incident.incident_id, e);
                result.fail(LLM_UNAVAILABLE);
                return;
            }
        };

        match parse_llm_response(&raw) {
            Ok(parsed) => {
                result.confidence_score = calculate_confidence(Some(&parsed), Some(&raw));
                result.actionable_insights = extract_insights(&parsed, &incident.affected_systems);
                result.parsed_response = Some(parsed);
            }
            Err(e) => {
                warn!("Could not parse LLM response for incident {}: {}", incident.incident_id, e);
                result.confidence_score = calculate_confidence(None, Some(&raw));
                result.fail(e.to_string());
            }
        }
        result.llm_raw_response = Some(raw);
    }

    async fn lookup(&self, hash: &str, incident: &IncidentReport) -> Option<AnalysisResult> {
        let store = self.store.as_ref()?;
        match store.get_analysis(hash).await {
            Ok(Some(entry)) => {
                info!(
                    "Cache hit for incident {} (matches cached incident {})",
                    incident.incident_id, entry.incident_id
                );
                let mut result = entry.result;
                result.incident_id = incident.incident_id.clone();
                result.analysis_timestamp = chrono::Utc::now();
                result.analysis_source = AnalysisSource::Cache;
                result.similar_incident_ids.clear();
                if entry.incident_id != incident.incident_id {
                    result.similar_incident_ids.push(entry.incident_id);
                }
                Some(result)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Cache lookup failed for incident {}: {}", incident.incident_id, e);
                None
            }
        }
    }

    async fn save(&self, hash: &str, incident: &IncidentReport, result: &AnalysisResult) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.save_analysis(hash, &incident.incident_id, result).await {
            warn!("Failed to cache analysis for incident {}: {}", incident.incident_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{InsightType, MockLlmClient};
    use crate::store::{AnalysisStore, MockAnalysisStore, SqliteStore};

    const GOOD_REPLY: &str = r#"{
  "potential_root_causes": ["Connection pool exhausted on db-01."],
  "recommended_actions": ["Check logs on db-01.", "Escalate to the DBA team."],
  "potential_impact": "Orders cannot be saved.",
  "confidence_explanation": "Symptoms match pool exhaustion."
}
```"#;

    fn llm_replying(reply: crate::Result<String>) -> Arc<dyn LlmClient> {
        let mut mock = MockLlmClient::new();
        mock.expect_complete().times(1).return_once(move |_| reply);
        Arc::new(mock)
    }

    fn incident(id: &str, description: &str) -> IncidentReport {
        let mut report = IncidentReport::new(id, description);
        report.affected_systems = vec!["db-01".to_string()];
        report
    }

    async fn memory_store() -> Arc<dyn AnalysisStore> {
        let store = SqliteStore::in_memory().await.unwrap();
        store.init().await.unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_normalization_and_hash() {
        assert_eq!(normalize_description("  Disk   FULL\n on db-01 "), "disk full on db-01");
        assert_eq!(description_hash("Disk full"), description_hash("  disk   FULL "));
        assert_ne!(description_hash("Disk full"), description_hash("Disk empty"));
        assert_eq!(description_hash("").len(), 32);
    }

    #[tokio::test]
    async fn test_successful_analysis() {
        let analyzer = IncidentAnalyzer::new(llm_replying(Ok(GOOD_REPLY.to_string())), None);
        let result = analyzer.analyze(&incident("INC-1", "Orders failing")).await;

        assert_eq!(result.analysis_source, AnalysisSource::Llm);
        assert!(result.errors.is_empty());
        assert_eq!(result.confidence_score, Some(0.9));
        assert_eq!(result.actionable_insights.len(), 2);
        assert_eq!(result.actionable_insights[0].target.as_deref(), Some("db-01"));
        assert_eq!(result.actionable_insights[1].insight_type, InsightType::Escalate);
        assert!(result.llm_raw_response.is_some());
        assert!(result.processing_time_seconds.is_some());
    }

    #[tokio::test]
    async fn test_llm_failure() {
        let analyzer = IncidentAnalyzer::new(
            llm_replying(Err(crate::Error::Llm("connection refused".to_string()))),
            None,
        );
        let result = analyzer.analyze(&incident("INC-2", "Orders failing")).await;

        assert_eq!(result.analysis_source, AnalysisSource::Error);
        assert_eq!(result.errors, vec![LLM_UNAVAILABLE.to_string()]);
        assert!(result.llm_raw_response.is_none());
        assert!(result.confidence_score.is_none());
    }

    #[tokio::test]
    async fn test_unparseable_reply() {
        let analyzer = IncidentAnalyzer::new(llm_replying(Ok("I am not sure.".to_string())), None);
        let result = analyzer.analyze(&incident("INC-3", "Orders failing")).await;

        assert_eq!(result.analysis_source, AnalysisSource::Error);
        assert_eq!(result.errors, vec!["Could not find JSON object in LLM response.".to_string()]);
        assert_eq!(result.llm_raw_response.as_deref(), Some("I am not sure."));
        assert_eq!(result.confidence_score, Some(0.1));
        assert!(result.actionable_insights.is_empty());
    }

    #[tokio::test]
    async fn test_second_identical_description_hits_cache() {
        let store = memory_store().await;
        let analyzer = IncidentAnalyzer::new(llm_replying(Ok(GOOD_REPLY.to_string())), Some(store.clone()));

        let first = analyzer.analyze(&incident("INC-10", "Orders failing on checkout")).await;
        assert_eq!(first.analysis_source, AnalysisSource::Llm);

        // The mock allows exactly one LLM call
        let second = analyzer.analyze(&incident("INC-11", "  orders FAILING on   checkout")).await;
        assert_eq!(second.analysis_source, AnalysisSource::Cache);
        assert_eq!(second.incident_id, "INC-11");
        assert_eq!(second.similar_incident_ids, vec!["INC-10".to_string()]);
        assert_eq!(second.parsed_response, first.parsed_response);
        assert_eq!(store.count_analyses().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_analysis_is_not_cached() {
        let store = memory_store().await;
        let analyzer = IncidentAnalyzer::new(llm_replying(Ok("garbage".to_string())), Some(store.clone()));

        analyzer.analyze(&incident("INC-20", "Pump vibration")).await;
        assert_eq!(store.count_analyses().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_errors_do_not_fail_analysis() {
        let mut store = MockAnalysisStore::new();
        store
            .expect_get_analysis()
            .returning(|_| Err(crate::Error::Internal("database is locked".to_string())));
        store
            .expect_save_analysis()
            .times(1)
            .returning(|_, _, _| Err(crate::Error::Internal("database is locked".to_string())));

        let analyzer = IncidentAnalyzer::new(llm_replying(Ok(GOOD_REPLY.to_string())), Some(Arc::new(store)));
        let result = analyzer.analyze(&incident("INC-30", "Orders failing")).await;

        assert_eq!(result.analysis_source, AnalysisSource::Llm);
        assert!(result.errors.is_empty());
    }
}

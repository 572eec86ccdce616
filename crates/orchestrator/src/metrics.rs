use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

use crate::incident::AnalysisSource;
use crate::llm::CacheStatus;
use crate::{Error, Result};

lazy_static! {
    pub static ref AGENT_DISPATCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gmao_agent_dispatch_total",
        "Messages delivered to agents, by outcome.",
        &["outcome"]
    )
    .expect("agent dispatch counter registers once");
    pub static ref ANALYSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gmao_incident_analyses_total",
        "Incident analyses completed, by result source.",
        &["source"]
    )
    .expect("analysis counter registers once");
    pub static ref GENERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gmao_llm_generations_total",
        "Generate requests answered, by cache status.",
        &["cache_status"]
    )
    .expect("generation counter registers once");
    pub static ref WEBHOOK_FORWARDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gmao_webhook_forwards_total",
        "GMAO incidents forwarded to the incident agent, by outcome.",
        &["outcome"]
    )
    .expect("forward counter registers once");
}

pub fn record_dispatch(outcome: &str) {
    AGENT_DISPATCH_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_analysis(source: AnalysisSource) {
    ANALYSES_TOTAL.with_label_values(&[&source.to_string()]).inc();
}

pub fn record_generation(status: CacheStatus) {
    GENERATIONS_TOTAL.with_label_values(&[status.as_str()]).inc();
}

pub fn record_forward(outcome: &str) {
    WEBHOOK_FORWARDS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Text exposition of every registered metric.
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Metrics are not UTF-8: {}", e)))
}

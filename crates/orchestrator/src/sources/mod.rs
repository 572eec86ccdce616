//! Inbound event sources feeding the incident pipeline

pub mod gmao;

pub use gmao::{
    map_gmao_to_incident_report, map_priority, ForwardOutcome, GmaoWebhookPayload, IncidentForwarder,
    GMAO_TOKEN_HEADER,
};

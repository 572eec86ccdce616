use super::LlmStructuredResponse;

const BASE_CONFIDENCE: f64 = 0.5;
const FIELD_BONUS: f64 = 0.1;
const UNPARSED_CONFIDENCE: f64 = 0.1;

/// Heuristic confidence for an analysis.
///
/// A parsed response starts at 0.5 and gains 0.1 for each populated field,
/// capped at 1.0. A raw reply that could not be parsed scores 0.1, and no
/// reply at all has no score.
pub fn calculate_confidence(parsed: Option<&LlmStructuredResponse>, raw: Option<&str>) -> Option<f64> {
    match (parsed, raw) {
        (Some(response), _) => {
            let populated = [
                !response.potential_root_causes.is_empty(),
                !response.recommended_actions.is_empty(),
                response.potential_impact.as_deref().is_some_and(|s| !s.trim().is_empty()),
                response
                    .confidence_explanation
                    .as_deref()
                    .is_some_and(|s| !s.trim().is_empty()),
            ]
            .into_iter()
            .filter(|present| *present)
            .count();

            let score = BASE_CONFIDENCE + FIELD_BONUS * populated as f64;
            Some((score.min(1.0) * 100.0).round() / 100.0)
        }
        (None, Some(_)) => Some(UNPARSED_CONFIDENCE),
        (None, None) => None,
    }
}

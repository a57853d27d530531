//! Services: advisory integration, suggestion validation and the reference
//! parameter adapter.

pub mod llm_advisor;
pub mod rule_based_adapter;
pub mod suggestion_schema;

pub use llm_advisor::{AdvisorStats, LlmAdvisor, LlmAdvisorConfig};
pub use rule_based_adapter::{RuleBasedAdapter, RuleBasedAdapterConfig};
pub use suggestion_schema::{
    apply_params_delta, parse_suggestion, validate_generator_params, validate_params,
    validate_suggestion, ParamsValidationError, MIN_CONFIDENCE,
};

/// Locate the first complete JSON object in a model response.
///
/// Handles bare JSON, markdown code fences and prose around the object.
/// Braces inside string literals are ignored when matching.
pub fn extract_json_from_response(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in response[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

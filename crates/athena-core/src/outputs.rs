//! Helpers for sorting classification outputs into successes and failures.
//!
//! An output counts as failed only when it carries an error with a
//! non-empty message.

use std::collections::HashMap;

use crate::error::ClassificationOutputError;
use crate::types::{ClassificationOutput, ClassifyResponse, ErrorCode};

pub fn has_output_errors(response: &ClassifyResponse) -> bool {
    response.outputs.iter().any(|o| !o.is_success())
}

/// Outputs without errors, in response order.
pub fn successful_outputs(response: &ClassifyResponse) -> Vec<ClassificationOutput> {
    response
        .outputs
        .iter()
        .filter(|o| o.is_success())
        .cloned()
        .collect()
}

/// Number of failed outputs per error code.
pub fn output_error_summary(response: &ClassifyResponse) -> HashMap<ErrorCode, usize> {
    let mut summary = HashMap::new();
    for failure in response.outputs.iter().filter_map(ClassificationOutput::failure) {
        *summary.entry(failure.code).or_insert(0) += 1;
    }
    summary
}

/// Log one error line per failed output.
pub fn log_output_errors(response: &ClassifyResponse) {
    for failure in response.outputs.iter().filter_map(ClassificationOutput::failure) {
        tracing::error!(
            correlation_id = %failure.correlation_id,
            code = %failure.code,
            "Classification output error: {}",
            failure.message
        );
        if let Some(details) = failure.details.as_deref().filter(|d| !d.is_empty()) {
            tracing::debug!(correlation_id = %failure.correlation_id, "Error details: {}", details);
        }
    }
}

/// Split a response for the caller.
///
/// With `raise_on_error`, the first failed output is returned as an error.
/// Otherwise only the successful outputs are returned. `log_errors` logs
/// every failure first.
pub fn process_outputs(
    response: &ClassifyResponse,
    raise_on_error: bool,
    log_errors: bool,
) -> Result<Vec<ClassificationOutput>, ClassificationOutputError> {
    if log_errors {
        log_output_errors(response);
    }
    if raise_on_error {
        if let Some(failure) = response.outputs.iter().find_map(ClassificationOutput::failure) {
            return Err(failure);
        }
    }
    Ok(successful_outputs(response))
}

//! Request orchestration: parse, validate, resolve, transform.

use serde::Deserialize;

use crate::bundle::Bundle;
use crate::engine;
use crate::error::ConversionError;
use crate::input::{self, InputType};
use crate::template::TemplateRegistry;

/// One conversion request. `rr_data` carries the optional reportability
/// response XML paired with an `ecr` clinical document.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversionRequest {
    pub input_data: String,
    pub input_type: InputType,
    pub root_template: String,
    #[serde(default)]
    pub rr_data: Option<String>,
}

/// Run the conversion pipeline, short-circuiting on the first failure.
///
/// Pure in the sense that the result depends only on the request and the
/// registry snapshot resolved here: a malformed request never reaches the
/// transformation engine, and a failed conversion is never retried.
pub fn convert(
    registry: &TemplateRegistry,
    request: &ConversionRequest,
) -> Result<Bundle, ConversionError> {
    let (primary, secondary) = input::parse_documents(
        request.input_type,
        &request.input_data,
        request.rr_data.as_deref(),
    )?;
    input::validate(request.input_type, &primary, secondary.as_ref())?;
    let definition = registry.resolve(&request.root_template, request.input_type)?;
    engine::transform(&definition, &primary, secondary.as_ref())
}

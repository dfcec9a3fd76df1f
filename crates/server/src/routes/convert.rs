//! Conversion endpoint

use axum::{Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use converter_core::{Bundle, ConversionRequest, InputType, convert};

use crate::AppState;
use crate::error::AppError;

/// Request body for POST /convert-to-fhir
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConvertToFhirRequest {
    /// Raw source message
    pub input_data: String,
    /// Source format family: vxu, elr or ecr
    #[schema(value_type = String, example = "vxu")]
    pub input_type: InputType,
    /// Template identifier within the input_type family
    #[schema(example = "VXU_V04")]
    pub root_template: String,
    /// Paired reportability-response XML, ecr only
    #[serde(default)]
    pub rr_data: Option<String>,
}

/// Response body wrapping the produced FHIR bundle
#[derive(Debug, Serialize, ToSchema)]
pub struct ConvertToFhirResponse {
    #[schema(value_type = Object)]
    pub response: Bundle,
}

/// POST /convert-to-fhir — Convert a legacy message into a FHIR bundle
#[utoipa::path(
    post,
    path = "/convert-to-fhir",
    request_body = ConvertToFhirRequest,
    responses(
        (status = 200, description = "Conversion succeeded", body = ConvertToFhirResponse),
        (status = 422, description = "Malformed input, unknown template or missing required field", body = crate::error::ErrorDetail),
        (status = 500, description = "Template or engine defect", body = crate::error::ErrorDetail),
    )
)]
pub async fn convert_to_fhir(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> Result<impl IntoResponse, AppError> {
    // Decode by hand so malformed bodies surface as 422 {"detail": ...}
    // like every other client error.
    let request: ConvertToFhirRequest = serde_json::from_value(body)
        .map_err(|e| AppError::Unprocessable(format!("Invalid conversion request: {e}")))?;

    tracing::info!(
        input_type = %request.input_type,
        root_template = %request.root_template,
        "Converting message"
    );

    let conversion = ConversionRequest {
        input_data: request.input_data,
        input_type: request.input_type,
        root_template: request.root_template,
        rr_data: request.rr_data,
    };
    let bundle = convert(&state.registry, &conversion)?;

    Ok(Json(ConvertToFhirResponse { response: bundle }))
}

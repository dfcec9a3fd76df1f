//! OpenAPI document endpoint

use axum::Json;
use utoipa::OpenApi;

use crate::error::ErrorDetail;
use crate::routes::convert::{ConvertToFhirRequest, ConvertToFhirResponse};
use crate::routes::health::HealthResponse;

/// Machine-readable interface description for the converter
#[derive(OpenApi)]
#[openapi(
    info(
        title = "FHIR Converter",
        description = "Converts legacy healthcare messages (HL7v2, CCDA) into FHIR bundles"
    ),
    paths(
        crate::routes::convert::convert_to_fhir,
        crate::routes::health::check,
    ),
    components(schemas(
        ConvertToFhirRequest,
        ConvertToFhirResponse,
        ErrorDetail,
        HealthResponse,
    ))
)]
pub struct ApiDoc;

/// GET /fhir-converter/openapi.json
pub async fn get() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

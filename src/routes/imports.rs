use axum::{
    Json, Router,
    extract::{Multipart, State},
    routing::post,
};

use crate::{
    dto::imports::{AnalyzeResponse, ColumnMapping, ProcessReport, ValidationReport},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::import_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/validate", post(validate))
        .route("/process", post(process))
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
    mapping: Option<ColumnMapping>,
}

// Pulls the `file` part (and optional `mapping` JSON part) out of the
// multipart body. Size and MIME filtering happen in the HTTP layers above.
async fn read_upload(mut multipart: Multipart) -> AppResult<Upload> {
    let mut filename = None;
    let mut bytes = None;
    let mut mapping = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::Validation(format!("malformed multipart body: {err}")))?
    {
        match field.name() {
            Some("file") => {
                filename = field.file_name().map(|f| f.to_string());
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| AppError::Validation(format!("unreadable file: {err}")))?
                        .to_vec(),
                );
            }
            Some("mapping") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|err| AppError::Validation(format!("unreadable mapping: {err}")))?;
                mapping = Some(
                    serde_json::from_str(&raw)
                        .map_err(|err| AppError::Validation(format!("invalid mapping: {err}")))?,
                );
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| AppError::Validation("missing 'file' part".into()))?;
    let filename = filename.ok_or_else(|| AppError::Validation("file has no filename".into()))?;
    Ok(Upload {
        filename,
        bytes,
        mapping,
    })
}

#[utoipa::path(
    post,
    path = "/api/imports/analyze",
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Headers, inferred mapping and preview", body = ApiResponse<AnalyzeResponse>),
        (status = 400, description = "Unsupported or malformed file"),
    ),
    security(("bearer_auth" = [])),
    tag = "Imports"
)]
pub async fn analyze(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<AnalyzeResponse>>> {
    let upload = read_upload(multipart).await?;
    let resp = import_service::analyze(&state, &user, &upload.filename, &upload.bytes).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/imports/validate",
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Row-indexed validation report", body = ApiResponse<ValidationReport>),
        (status = 400, description = "Unsupported or malformed file"),
    ),
    security(("bearer_auth" = [])),
    tag = "Imports"
)]
pub async fn validate(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<ValidationReport>>> {
    let upload = read_upload(multipart).await?;
    let mapping = upload
        .mapping
        .ok_or_else(|| AppError::Validation("missing 'mapping' part".into()))?;
    let resp =
        import_service::validate(&state, &user, &upload.filename, &upload.bytes, mapping).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/imports/process",
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Inserts valid rows, partial success allowed", body = ApiResponse<ProcessReport>),
        (status = 400, description = "Unsupported or malformed file"),
    ),
    security(("bearer_auth" = [])),
    tag = "Imports"
)]
pub async fn process(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<ProcessReport>>> {
    let upload = read_upload(multipart).await?;
    let mapping = upload
        .mapping
        .ok_or_else(|| AppError::Validation("missing 'mapping' part".into()))?;
    let resp =
        import_service::process(&state, &user, &upload.filename, &upload.bytes, mapping).await?;
    Ok(Json(resp))
}

use super::upload::read_form;
use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::instructions::{InstructionPatch, InstructionRecord, NewInstruction};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

fn parse_flag(value: Option<&str>) -> ApiResult<bool> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None | Some("false") | Some("0") | Some("off") => Ok(false),
        Some("true") | Some("1") | Some("on") => Ok(true),
        Some(other) => Err(ApiError::BadRequest(format!(
            "isChecklist must be true or false, got {:?}",
            other
        ))),
    }
}

/// GET /api/instructions
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let records = state.instructions.list()?;
    Ok(Json(json!({ "success": true, "instructions": records })))
}

/// POST /api/instructions
pub async fn create(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<InstructionRecord>)> {
    let mut form = read_form(multipart).await?;
    let file = form.take_file()?;
    let upload = NewInstruction {
        filename: file.filename,
        data: file.data,
        custom_prompt: form.text("customPrompt").map(str::to_string),
        is_checklist: parse_flag(form.text("isChecklist"))?,
    };
    let record = state.instructions.create(upload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/instructions/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<InstructionRecord>> {
    Ok(Json(state.instructions.get(&id)?))
}

/// PUT /api/instructions/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    patch: Result<Json<InstructionPatch>, JsonRejection>,
) -> ApiResult<Json<InstructionRecord>> {
    let Json(patch) = patch.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(state.instructions.update(&id, patch)?))
}

/// DELETE /api/instructions/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.instructions.delete(&id)?;
    Ok(Json(json!({ "success": true, "id": id })))
}

/// POST /api/instructions/{id}/feedback
pub async fn generate_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let (record, analysis) = state.instructions.generate_feedback(&id).await?;
    Ok(Json(json!({
        "success": true,
        "instruction": record,
        "analysis": analysis,
    })))
}

/// POST /api/instructions/{id}/checklist
pub async fn generate_checklist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = state.instructions.generate_checklist(&id).await?;
    Ok(Json(json!({
        "success": true,
        "checklist": record.checklist,
        "instruction": record,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checklist_flag_accepts_common_spellings() {
        assert!(!parse_flag(None).unwrap());
        assert!(parse_flag(Some("TRUE")).unwrap());
        assert!(parse_flag(Some("on")).unwrap());
        assert!(!parse_flag(Some("0")).unwrap());
        assert!(matches!(parse_flag(Some("maybe")), Err(ApiError::BadRequest(_))));
    }
}

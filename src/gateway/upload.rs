use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::pipeline::UploadOutcome;
use axum::extract::{multipart::MultipartError, Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use http_body_util::LengthLimitError;
use std::error::Error as StdError;

/// A file part pulled out of a multipart body.
pub(super) struct FilePart {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Text fields of interest alongside the file part.
#[derive(Default)]
pub(super) struct FormFields {
    pub file: Option<FilePart>,
    pub fields: Vec<(String, String)>,
}

impl FormFields {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn take_file(&mut self) -> ApiResult<FilePart> {
        self.file
            .take()
            .ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))
    }
}

/// Whether a body-limit failure sits anywhere in the error's source chain.
/// Stacked limits wrap the length error more than once.
fn exceeded_length_limit(e: &MultipartError) -> bool {
    let mut cause: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cause {
        if err.is::<LengthLimitError>() || err.to_string().contains("length limit exceeded") {
            return true;
        }
        cause = err.source();
    }
    false
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE || exceeded_length_limit(&e) {
        ApiError::PayloadTooLarge("request body exceeds the upload limit".into())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

/// Drain a multipart body. The `file` part is kept in memory; other named
/// parts are read as text. Unnamed parts are ignored.
pub(super) async fn read_form(mut multipart: Multipart) -> ApiResult<FormFields> {
    let mut form = FormFields::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "file" {
            let filename = field
                .file_name()
                .map(str::to_string)
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| ApiError::BadRequest("Uploaded file has no name".into()))?;
            let data = field.bytes().await.map_err(multipart_error)?.to_vec();
            form.file = Some(FilePart { filename, data });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.push((name, value));
        }
    }
    Ok(form)
}

/// POST /api/upload
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<UploadOutcome>> {
    let mut form = read_form(multipart).await?;
    let file = form.take_file()?;
    let outcome = state
        .pipeline
        .run(&file.filename, &file.data, form.text("instructionId"))
        .await?;
    Ok(Json(outcome))
}

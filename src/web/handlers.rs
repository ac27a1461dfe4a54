//! Route handlers
//!
//! Every handler resolves the browser's session from the cookie, does its
//! work and answers with the re-rendered page (or the PNG for `/download`).
//! Errors never escape a handler; they become a notice on the page.

use super::{
    page::{render_page, Notice, PageView},
    AppState, SESSION_COOKIE,
};
use crate::{
    error::BgRemovalError,
    services::{OutputFormatHandler, UploadedImage},
    session::{Session, SessionId},
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// `GET /`
#[instrument(skip_all)]
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session) = state.sessions.get_or_create(session_cookie(&headers));
    page(&state, id, &session, None, StatusCode::OK)
}

/// `POST /upload` with a multipart `image` field
#[instrument(skip_all)]
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let (id, _) = state.sessions.get_or_create(session_cookie(&headers));
    let copy = state.config.variant.copy();

    let (file_name, bytes) = match read_image_field(multipart).await {
        Ok(field) => field,
        Err(e) => {
            warn!(status = %e.status(), "Malformed upload: {}", e.body_text());
            state.sessions.clear(id);
            let notice = Notice::Error(format!("{}: {}", copy.upload_failure_prefix, e.body_text()));
            return session_page(&state, id, Some(notice), e.status());
        },
    };

    let policy = state.policy.clone();
    let decoded = tokio::task::spawn_blocking(move || {
        UploadedImage::from_upload(file_name.as_deref(), bytes, &policy)
    })
    .await
    .unwrap_or_else(|e| Err(BgRemovalError::internal(format!("upload decoding task failed: {e}"))));

    match decoded {
        Ok(upload) => {
            info!(
                file = %upload.file_name,
                format = %upload.format,
                width = upload.image.width(),
                height = upload.image.height(),
                "Image uploaded"
            );
            state.sessions.set_upload(id, upload);
            session_page(&state, id, Some(Notice::Info(copy.uploaded.to_string())), StatusCode::OK)
        },
        Err(e) => {
            warn!(error = %e, "Upload rejected");
            state.sessions.clear(id);
            let notice = match e {
                BgRemovalError::NoUpload => Notice::Warning(copy.no_upload_warning.to_string()),
                ref other => Notice::Error(format!("{}: {other}", copy.upload_failure_prefix)),
            };
            session_page(&state, id, Some(notice), upload_error_status(&e))
        },
    }
}

/// `POST /process`: run the remover on the session's upload
#[instrument(skip_all)]
pub async fn process(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session) = state.sessions.get_or_create(session_cookie(&headers));
    let copy = state.config.variant.copy();

    let Some(upload) = session.upload else {
        warn!("Process requested without an uploaded image");
        let notice = Notice::Warning(copy.no_upload_warning.to_string());
        return session_page(&state, id, Some(notice), StatusCode::BAD_REQUEST);
    };

    let outcome = match state.remover.remove(upload.image.clone()).await {
        Ok(image) => tokio::task::spawn_blocking(move || OutputFormatHandler::encode_png(&image))
            .await
            .unwrap_or_else(|e| Err(BgRemovalError::internal(format!("png encoding task failed: {e}")))),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(artifact) => {
            let bytes = artifact.len();
            if state.sessions.set_result_for(id, &upload, artifact) {
                info!(file = %upload.file_name, bytes, "Background removed");
                session_page(&state, id, Some(Notice::Success(copy.success.to_string())), StatusCode::OK)
            } else {
                // A newer upload or a reset replaced the image while it was processed
                info!(file = %upload.file_name, "Discarded result for a replaced upload");
                session_page(&state, id, None, StatusCode::OK)
            }
        },
        Err(e) => {
            error!(file = %upload.file_name, error = %e, "Background removal failed");
            let notice = Notice::Error(format!("{}: {e}", copy.failure_prefix));
            session_page(&state, id, Some(notice), StatusCode::INTERNAL_SERVER_ERROR)
        },
    }
}

/// `GET /download`: the last result as `removed_background.png`
#[instrument(skip_all)]
pub async fn download(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, _) = state.sessions.get_or_create(session_cookie(&headers));

    match state.sessions.result(id) {
        Some(artifact) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, artifact.mime_type.to_string()),
                (header::CONTENT_DISPOSITION, artifact.content_disposition()),
                (header::CACHE_CONTROL, "no-store".to_string()),
                (header::SET_COOKIE, session_cookie_header(id)),
            ],
            artifact.bytes.clone(),
        )
            .into_response(),
        None => {
            let copy = state.config.variant.copy();
            let notice = Notice::Warning(copy.no_upload_warning.to_string());
            session_page(&state, id, Some(notice), StatusCode::NOT_FOUND)
        },
    }
}

/// `POST /reset`: forget the upload and result
#[instrument(skip_all)]
pub async fn reset(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, _) = state.sessions.get_or_create(session_cookie(&headers));
    state.sessions.clear(id);
    (
        [(header::SET_COOKIE, session_cookie_header(id))],
        Redirect::to("/"),
    )
        .into_response()
}

/// `GET /healthz`
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "variant": state.config.variant.to_string(),
        "remover": state.remover.describe(),
        "sessions": state.sessions.len(),
    }))
}

/// Pull the `image` part out of the form, ignoring any other parts
async fn read_image_field(
    mut multipart: Multipart,
) -> Result<(Option<String>, Vec<u8>), MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            let file_name = field.file_name().map(ToString::to_string);
            let bytes = field.bytes().await?;
            return Ok((file_name, bytes.to_vec()));
        }
    }
    Ok((None, Vec::new()))
}

fn upload_error_status(error: &BgRemovalError) -> StatusCode {
    if !error.is_user_error() {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match error {
        BgRemovalError::NoUpload => StatusCode::BAD_REQUEST,
        BgRemovalError::InvalidUpload(_) => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

fn session_cookie_header(id: SessionId) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}

/// Re-read the session after a mutation and render it
fn session_page(
    state: &AppState,
    id: SessionId,
    notice: Option<Notice>,
    status: StatusCode,
) -> Response {
    let (id, session) = state
        .sessions
        .touch(Some(id))
        .unwrap_or_else(|| state.sessions.get_or_create(None));
    page(state, id, &session, notice, status)
}

fn page(
    state: &AppState,
    id: SessionId,
    session: &Session,
    notice: Option<Notice>,
    status: StatusCode,
) -> Response {
    let html = render_page(&PageView {
        variant: state.config.variant,
        policy: &state.policy,
        upload: session.upload.as_deref(),
        result: session.result.as_deref(),
        notice,
    });
    (
        status,
        [(header::SET_COOKIE, session_cookie_header(id))],
        Html(html),
    )
        .into_response()
}

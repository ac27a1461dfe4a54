//! End-to-end page flow through the axum router
//!
//! Every test drives the router with `oneshot` requests and a test remover,
//! so no model file or network socket is involved.

mod common;

use axum::http::{header, StatusCode};
use bgremove_web::{AppVariant, ServerConfig};
use common::*;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};

const DISABLED_BUTTON: &str = "id=\"process-button\" class=\"button\" disabled";
const ENABLED_BUTTON: &str = "id=\"process-button\" class=\"button\">";

#[tokio::test]
async fn test_index_starts_without_upload() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Studio));
    let response = send(&app.router, request("GET", "/", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::SET_COOKIE));
    let html = body_text(response).await;
    assert!(html.contains(DISABLED_BUTTON));
    assert!(html.contains("accept=\".png,.jpg,.jpeg,.bmp\""));
    assert!(html.contains("id=\"panel-help\""));
    assert!(!html.contains("download-button"));
}

#[tokio::test]
async fn test_upload_enables_processing() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Studio));
    let bytes = sample_image(24, 16, ImageFormat::Png);
    let response = send(&app.router, upload_request(None, Some("cat.png"), &bytes)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let html = body_text(response).await;
    assert!(html.contains(ENABLED_BUTTON));
    assert!(html.contains("id=\"original-preview\" src=\"data:image/png;base64,"));
    assert!(html.contains("cat.png"));

    // the upload is remembered for the next page load
    let html = body_text(send(&app.router, request("GET", "/", Some(&cookie))).await).await;
    assert!(html.contains(ENABLED_BUTTON));
    assert_eq!(app.remover.calls(), 0);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Studio));
    uploaded_session(&app.router, "cat.jpg", &sample_image(8, 8, ImageFormat::Jpeg)).await;

    let html = body_text(send(&app.router, request("GET", "/", None)).await).await;
    assert!(html.contains(DISABLED_BUTTON));
}

#[tokio::test]
async fn test_process_without_upload_never_calls_remover() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Classic));
    let response = send(&app.router, request("POST", "/process", None)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_text(response).await;
    assert!(html.contains("class=\"notice notice-warning\""));
    assert!(html.contains("Please upload an image first"));
    assert_eq!(app.remover.calls(), 0);
}

#[tokio::test]
async fn test_process_after_rejected_upload_never_calls_remover() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Studio));
    let cookie =
        uploaded_session(&app.router, "good.png", &sample_image(8, 8, ImageFormat::Png)).await;

    let response = send(
        &app.router,
        upload_request(Some(&cookie), Some("notes.txt"), b"hello"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = send(&app.router, request("POST", "/process", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.remover.calls(), 0);
}

#[tokio::test]
async fn test_successful_removal_yields_png_download() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Studio));
    let cookie =
        uploaded_session(&app.router, "photo.bmp", &sample_image(30, 20, ImageFormat::Bmp)).await;

    let response = send(&app.router, request("POST", "/process", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("class=\"notice notice-success\""));
    assert!(html.contains("id=\"result-preview\" src=\"data:image/png;base64,"));
    assert!(html.contains("id=\"download-button\""));
    assert!(html.contains("download=\"removed_background.png\""));
    assert_eq!(app.remover.calls(), 1);

    let response = send(&app.router, request("GET", "/download", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"removed_background.png\""
    );

    let bytes = body_bytes(response).await;
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!(decoded.dimensions(), (30, 20));
    let rgba: RgbaImage = decoded.to_rgba8();
    assert!(rgba.pixels().all(|pixel| pixel.0[3] == 128));
}

#[tokio::test]
async fn test_new_upload_discards_previous_result() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Studio));
    let cookie =
        uploaded_session(&app.router, "one.png", &sample_image(8, 8, ImageFormat::Png)).await;
    send(&app.router, request("POST", "/process", Some(&cookie))).await;

    let response = send(
        &app.router,
        upload_request(Some(&cookie), Some("two.png"), &sample_image(9, 9, ImageFormat::Png)),
    )
    .await;
    let html = body_text(response).await;
    assert!(!html.contains("result-preview"));

    let response = send(&app.router, request("GET", "/download", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_during_processing_discards_stale_result() {
    let app = app_with(GatedRemover::default(), config(AppVariant::Classic));
    let cookie =
        uploaded_session(&app.router, "one.png", &sample_image(8, 8, ImageFormat::Png)).await;

    let router = app.router.clone();
    let process_cookie = cookie.clone();
    let processing = tokio::spawn(async move {
        send(&router, request("POST", "/process", Some(&process_cookie))).await
    });
    app.remover.started.notified().await;

    let response = send(
        &app.router,
        upload_request(Some(&cookie), Some("two.png"), &sample_image(30, 20, ImageFormat::Png)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    app.remover.release.notify_one();

    let response = processing.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("two.png"));
    assert!(!html.contains("result-preview"));
    assert!(!html.contains("download-button"));

    let response = send(&app.router, request("GET", "/download", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The current upload can still be processed normally
    let router = app.router.clone();
    let process_cookie = cookie.clone();
    let processing = tokio::spawn(async move {
        send(&router, request("POST", "/process", Some(&process_cookie))).await
    });
    app.remover.started.notified().await;
    app.remover.release.notify_one();
    assert_eq!(processing.await.unwrap().status(), StatusCode::OK);

    let response = send(&app.router, request("GET", "/download", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let downloaded = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!(downloaded.dimensions(), (30, 20));
}

#[tokio::test]
async fn test_removal_error_is_rendered_classic() {
    let app = app_with(
        FailingRemover {
            message: "model exploded",
        },
        config(AppVariant::Classic),
    );
    let cookie =
        uploaded_session(&app.router, "photo.png", &sample_image(8, 8, ImageFormat::Png)).await;

    let response = send(&app.router, request("POST", "/process", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let html = body_text(response).await;
    assert!(html.contains("class=\"notice notice-error\""));
    assert!(html.contains("Processing failed: "));
    assert!(html.contains("model exploded"));
    assert!(!html.contains("download-button"));

    // the server keeps serving after a failure
    let response = send(&app.router, request("GET", "/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_removal_error_is_rendered_studio() {
    let app = app_with(
        FailingRemover {
            message: "out of memory",
        },
        config(AppVariant::Studio),
    );
    let cookie =
        uploaded_session(&app.router, "photo.jpeg", &sample_image(8, 8, ImageFormat::Jpeg)).await;

    let response = send(&app.router, request("POST", "/process", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let html = body_text(response).await;
    assert!(html.contains("處理過程中發生錯誤: "));
    assert!(html.contains("out of memory"));
}

#[tokio::test]
async fn test_download_without_result_is_not_found() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Studio));
    let response = send(&app.router, request("GET", "/download", None)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("class=\"notice notice-warning\""));
}

#[tokio::test]
async fn test_upload_format_errors() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Studio));
    let png = sample_image(8, 8, ImageFormat::Png);

    let response = send(&app.router, upload_request(None, Some("photo.webp"), &png)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("class=\"notice notice-error\""));

    let response = send(&app.router, upload_request(None, Some("photo.png"), b"plain text")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let truncated = png.get(..20).unwrap();
    let response = send(&app.router, upload_request(None, Some("photo.png"), truncated)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.remover.calls(), 0);
}

#[tokio::test]
async fn test_empty_upload_is_a_warning() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Classic));

    let response = send(&app.router, upload_request(None, Some(""), b"")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Please upload an image first"));

    let response = send(&app.router, upload_request(None, None, b"")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_size_limits() {
    let small = ServerConfig::builder().max_upload_bytes(16).build().unwrap();
    let app = app_with(CountingRemover::default(), small);
    let png = sample_image(8, 8, ImageFormat::Png);
    let response = send(&app.router, upload_request(None, Some("photo.png"), &png)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let few_pixels = ServerConfig {
        max_pixels: 100,
        ..ServerConfig::default()
    };
    let app = app_with(CountingRemover::default(), few_pixels);
    let png = sample_image(20, 20, ImageFormat::Png);
    let response = send(&app.router, upload_request(None, Some("photo.png"), &png)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body_text(response).await.contains("400 pixels"));
}

#[tokio::test]
async fn test_request_body_limit() {
    let small = ServerConfig::builder().max_upload_bytes(16).build().unwrap();
    let app = app_with(CountingRemover::default(), small);
    let oversized = vec![0_u8; 256 * 1024];

    let response = send(&app.router, upload_request(None, Some("huge.png"), &oversized)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.remover.calls(), 0);
}

#[tokio::test]
async fn test_gif_only_accepted_by_classic() {
    let gif = common::encode(
        &DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 6, image::Rgba([10, 200, 30, 255]))),
        ImageFormat::Gif,
    );

    let studio = app_with(CountingRemover::default(), config(AppVariant::Studio));
    let response = send(&studio.router, upload_request(None, Some("anim.gif"), &gif)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let classic = app_with(CountingRemover::default(), config(AppVariant::Classic));
    let page = body_text(send(&classic.router, request("GET", "/", None)).await).await;
    assert!(page.contains("accept=\".png,.jpg,.jpeg,.bmp,.gif\""));
    assert!(!page.contains("id=\"panel-help\""));

    let response = send(&classic.router, upload_request(None, Some("anim.GIF"), &gif)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(ENABLED_BUTTON));
}

#[tokio::test]
async fn test_file_name_is_escaped() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Studio));
    let png = sample_image(8, 8, ImageFormat::Png);
    let response = send(&app.router, upload_request(None, Some("<b>x</b>.png"), &png)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("&lt;b&gt;x&lt;/b&gt;.png"));
    assert!(!html.contains("<b>x</b>"));
}

#[tokio::test]
async fn test_reset_clears_session() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Studio));
    let cookie =
        uploaded_session(&app.router, "photo.png", &sample_image(8, 8, ImageFormat::Png)).await;

    let response = send(&app.router, request("POST", "/reset", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    let html = body_text(send(&app.router, request("GET", "/", Some(&cookie))).await).await;
    assert!(html.contains(DISABLED_BUTTON));

    let response = send(&app.router, request("POST", "/process", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.remover.calls(), 0);
}

#[tokio::test]
async fn test_healthz() {
    let app = app_with(CountingRemover::default(), config(AppVariant::Classic));
    let response = send(&app.router, request("GET", "/healthz", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["variant"], "classic");
    assert_eq!(json["remover"], "counting test remover");
}

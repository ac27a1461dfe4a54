//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
    Router,
};
use bgremove_web::{
    router, AppState, AppVariant, BackgroundRemover, BgRemovalError, Result, ServerConfig,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tower::ServiceExt;

pub const BOUNDARY: &str = "bgremove-test-boundary";

/// Remover that counts calls and makes every pixel half transparent
#[derive(Default)]
pub struct CountingRemover {
    calls: AtomicUsize,
}

impl CountingRemover {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundRemover for CountingRemover {
    async fn remove(&self, image: DynamicImage) -> Result<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut rgba = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            pixel.0[3] = 128;
        }
        Ok(rgba)
    }

    fn describe(&self) -> String {
        "counting test remover".to_string()
    }
}

/// Remover that always fails with the given message
pub struct FailingRemover {
    pub message: &'static str,
}

#[async_trait]
impl BackgroundRemover for FailingRemover {
    async fn remove(&self, _image: DynamicImage) -> Result<RgbaImage> {
        Err(BgRemovalError::processing(self.message))
    }

    fn describe(&self) -> String {
        "failing test remover".to_string()
    }
}

/// Remover that waits for `release` before returning the image unchanged
#[derive(Default)]
pub struct GatedRemover {
    pub started: Notify,
    pub release: Notify,
}

#[async_trait]
impl BackgroundRemover for GatedRemover {
    async fn remove(&self, image: DynamicImage) -> Result<RgbaImage> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(image.to_rgba8())
    }

    fn describe(&self) -> String {
        "gated test remover".to_string()
    }
}

/// Router plus the shared remover, for asserting on call counts
pub struct TestApp<R> {
    pub router: Router,
    pub remover: Arc<R>,
}

pub fn app_with<R: BackgroundRemover + 'static>(remover: R, config: ServerConfig) -> TestApp<R> {
    let remover = Arc::new(remover);
    let state = AppState::new(config, remover.clone());
    TestApp {
        router: router(state),
        remover,
    }
}

pub fn config(variant: AppVariant) -> ServerConfig {
    ServerConfig::builder().variant(variant).build().unwrap()
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    image.write_to(&mut bytes, format).unwrap();
    bytes.into_inner()
}

/// Small gradient image, encoded as `format`
pub fn sample_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, _| {
        let level = (x * 255 / width.max(1)) as u8;
        Rgb([level, 100, 255 - level])
    });
    encode(&DynamicImage::ImageRgb8(image), format)
}

pub fn multipart_body(field: &str, file_name: Option<&str>, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    match file_name {
        Some(name) => body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        ),
        None => body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
        ),
    }
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(cookie: Option<&str>, file_name: Option<&str>, bytes: &[u8]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(multipart_body("image", file_name, bytes)))
        .unwrap()
}

pub fn request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

/// `name=value` part of the response's session cookie
pub fn session_cookie(response: &Response<Body>) -> String {
    let value = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie set")
        .to_str()
        .unwrap();
    value.split(';').next().unwrap().to_string()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

/// Upload `bytes` as `file_name` on a fresh session and return its cookie
pub async fn uploaded_session(router: &Router, file_name: &str, bytes: &[u8]) -> String {
    let response = send(router, upload_request(None, Some(file_name), bytes)).await;
    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response)
}

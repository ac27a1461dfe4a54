//! HTML rendering for the single page
//!
//! The page is rebuilt from session state on every request. All dynamic
//! strings go through [`escape_html`]; only the static `_html` copy fields
//! are inserted verbatim.

use super::variant::{AppVariant, PageCopy};
use crate::services::{DownloadArtifact, UploadPolicy, UploadedImage, DOWNLOAD_FILE_NAME};
use chrono::{Datelike, Utc};
use std::fmt::Write as _;

/// Status line shown above the tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Neutral information
    Info(String),
    /// Successful removal
    Success(String),
    /// User mistake, such as processing without an upload
    Warning(String),
    /// Failure with its message
    Error(String),
}

impl Notice {
    fn class(&self) -> &'static str {
        match self {
            Self::Info(_) => "notice notice-info",
            Self::Success(_) => "notice notice-success",
            Self::Warning(_) => "notice notice-warning",
            Self::Error(_) => "notice notice-error",
        }
    }

    fn text(&self) -> &str {
        match self {
            Self::Info(text) | Self::Success(text) | Self::Warning(text) | Self::Error(text) => {
                text
            },
        }
    }
}

/// Everything the page needs to render one response
#[derive(Debug)]
pub struct PageView<'a> {
    pub variant: AppVariant,
    pub policy: &'a UploadPolicy,
    pub upload: Option<&'a UploadedImage>,
    pub result: Option<&'a DownloadArtifact>,
    pub notice: Option<Notice>,
}

/// Escape text for HTML element content and quoted attribute values
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// `accept` attribute value for the file input, e.g. `.png,.jpg,.jpeg,.bmp`
#[must_use]
pub fn accept_attribute(policy: &UploadPolicy) -> String {
    policy
        .accepted_formats
        .iter()
        .flat_map(|format| format.extensions().iter())
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render the complete HTML document
#[must_use]
pub fn render_page(view: &PageView<'_>) -> String {
    let copy = view.variant.copy();
    let mut html = String::with_capacity(8 * 1024);

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"{lang}\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body class=\"variant-{variant}\">\n\
         <main class=\"app\">\n<h1>{heading}</h1>\n<div class=\"intro\"><p>{intro}</p></div>\n",
        lang = copy.lang,
        title = escape_html(copy.page_title),
        variant = view.variant,
        heading = escape_html(copy.heading),
        intro = copy.intro_html,
    );

    if view.variant.has_tabs() {
        let _ = write!(
            html,
            "<div class=\"tabs\">\n\
             <input type=\"radio\" name=\"tab\" id=\"tab-tool\" checked>\
             <label for=\"tab-tool\">{tool}</label>\n\
             <input type=\"radio\" name=\"tab\" id=\"tab-help\">\
             <label for=\"tab-help\">{help}</label>\n\
             <section class=\"tab-panel\" id=\"panel-tool\">\n",
            tool = escape_html(copy.tab_tool),
            help = escape_html(copy.tab_help),
        );
        render_tool(&mut html, view, copy);
        let _ = write!(
            html,
            "</section>\n<section class=\"tab-panel\" id=\"panel-help\">\n{}\n</section>\n</div>\n",
            copy.help_html
        );
    } else {
        render_tool(&mut html, view, copy);
    }

    let footer = copy.footer_html.replace("{year}", &Utc::now().year().to_string());
    let _ = write!(
        html,
        "<footer class=\"footer\"><p>{footer}</p></footer>\n</main>\n</body>\n</html>\n"
    );
    html
}

fn render_tool(html: &mut String, view: &PageView<'_>, copy: &PageCopy) {
    if let Some(notice) = &view.notice {
        let _ = writeln!(
            html,
            "<div class=\"{}\" role=\"status\">{}</div>",
            notice.class(),
            escape_html(notice.text())
        );
    }

    let _ = write!(
        html,
        "<div class=\"upload-section\">\n<h3>{heading}</h3>\n\
         <form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\" class=\"upload-form\">\n\
         <input type=\"file\" name=\"image\" id=\"image-input\" accept=\"{accept}\" required>\n\
         <button type=\"submit\" class=\"button\">{button}</button>\n</form>\n",
        heading = escape_html(copy.upload_heading),
        accept = accept_attribute(view.policy),
        button = escape_html(copy.upload_button),
    );
    match view.upload {
        Some(upload) => {
            let (width, height) = upload.dimensions();
            let _ = writeln!(
                html,
                "<p class=\"current-file\">{label}: <strong>{name}</strong> ({width}×{height})</p>",
                label = escape_html(copy.current_file),
                name = escape_html(&upload.file_name),
            );
        },
        None => {
            let _ = writeln!(
                html,
                "<p class=\"placeholder\"><i>{}</i></p>",
                escape_html(copy.upload_placeholder)
            );
        },
    }
    html.push_str("</div>\n");

    if let Some(upload) = view.upload {
        let _ = write!(
            html,
            "<div class=\"columns\">\n<div class=\"column\">\n<h3>{heading}</h3>\n\
             <div class=\"img-container\"><img id=\"original-preview\" src=\"{src}\" alt=\"{alt}\"></div>\n</div>\n",
            heading = escape_html(copy.original_heading),
            src = upload.data_uri(),
            alt = escape_html(&upload.file_name),
        );
        if let Some(result) = view.result {
            let _ = write!(
                html,
                "<div class=\"column\">\n<h3>{heading}</h3>\n\
                 <div class=\"img-container checkerboard\"><img id=\"result-preview\" src=\"{src}\" alt=\"{alt}\"></div>\n</div>\n",
                heading = escape_html(copy.result_heading),
                src = result.data_uri(),
                alt = DOWNLOAD_FILE_NAME,
            );
        }
        html.push_str("</div>\n");
    }

    let disabled = if view.upload.is_some() { "" } else { " disabled" };
    let _ = write!(
        html,
        "<div class=\"actions\">\n<form method=\"post\" action=\"/process\" class=\"process-form\" onsubmit=\"{busy}\">\n\
         <button type=\"submit\" id=\"process-button\" class=\"button\"{disabled}>{label}</button>\n\
         <p class=\"hint\">{hint}</p>\n</form>\n",
        busy = PROCESS_SUBMIT_SCRIPT,
        label = escape_html(copy.process_button),
        hint = escape_html(copy.processing_hint),
    );
    if let Some(result) = view.result {
        let _ = writeln!(
            html,
            "<a id=\"download-button\" class=\"button download\" href=\"/download\" download=\"{name}\" type=\"{mime}\">{label}</a>",
            name = result.file_name,
            mime = result.mime_type,
            label = escape_html(copy.download_button),
        );
    }
    if view.upload.is_some() {
        let _ = writeln!(
            html,
            "<form method=\"post\" action=\"/reset\" class=\"reset-form\"><button type=\"submit\" class=\"button secondary\">{}</button></form>",
            escape_html(copy.reset_button)
        );
    }
    html.push_str("</div>\n");
}

/// Shows the processing hint and blocks double submits while the request runs
const PROCESS_SUBMIT_SCRIPT: &str =
    "this.classList.add('busy'); this.querySelector('button').disabled = true;";

const STYLE: &str = r"
body { background-color: #f5f7f9; margin: 0; font-family: 'Helvetica Neue', Arial, sans-serif; }
.app { max-width: 1200px; margin: 0 auto; padding: 1rem; }
h1 { color: #2c3e50; font-weight: 700; text-align: center; margin-bottom: 1.5rem; padding-top: 1rem; }
h3 { text-align: center; }
.intro { text-align: center; max-width: 700px; margin: 0 auto 2rem auto; }
.button { display: block; width: 100%; box-sizing: border-box; background-color: #3498db; color: white;
  border-radius: 5px; padding: 0.5rem 1rem; font-weight: bold; border: none; text-align: center;
  text-decoration: none; cursor: pointer; transition: all 0.3s ease; }
.button:hover { background-color: #2980b9; box-shadow: 0 4px 8px rgba(0,0,0,0.1); transform: translateY(-2px); }
.button:disabled { background-color: #bdc3c7; cursor: not-allowed; transform: none; box-shadow: none; }
.button.download { background-color: #27ae60; margin-top: 1rem; }
.button.download:hover { background-color: #2ecc71; }
.button.secondary { background-color: #95a5a6; margin-top: 1rem; }
.upload-section, .info-box { background-color: white; padding: 2rem; border-radius: 10px;
  box-shadow: 0 3px 10px rgba(0,0,0,0.08); margin-bottom: 2rem; }
.info-box { padding: 1rem; margin-bottom: 1rem; border-left: 4px solid #3498db; }
.upload-form { display: flex; gap: 1rem; align-items: center; }
.upload-form .button { width: auto; }
.placeholder { text-align: center; color: #7f8c8d; padding: 2rem; }
.current-file { text-align: center; color: #2c3e50; }
.columns { display: flex; gap: 2rem; }
.column { flex: 1; min-width: 0; }
.img-container { border: 1px dashed #bdc3c7; border-radius: 5px; padding: 0.5rem; text-align: center; background-color: #f9f9f9; }
.img-container img { max-width: 100%; height: auto; }
.checkerboard { background-image: linear-gradient(45deg, #eee 25%, transparent 25%), linear-gradient(-45deg, #eee 25%, transparent 25%),
  linear-gradient(45deg, transparent 75%, #eee 75%), linear-gradient(-45deg, transparent 75%, #eee 75%);
  background-size: 20px 20px; background-position: 0 0, 0 10px, 10px -10px, -10px 0; }
.actions { max-width: 50%; margin: 2rem auto; }
.hint { display: none; text-align: center; color: #7f8c8d; }
.process-form.busy .hint { display: block; }
.notice { padding: 1rem; border-radius: 5px; margin-bottom: 1rem; }
.notice-info { background: #eaf4fc; color: #1d5f8a; }
.notice-success { background: #e8f8ef; color: #1e7e48; }
.notice-warning { background: #fff7e0; color: #8a6d1d; }
.notice-error { background: #fdecea; color: #a12b1f; }
.highlight { background: linear-gradient(120deg, rgba(52, 152, 219, 0.2) 0%, rgba(52, 152, 219, 0) 100%);
  padding: 0.2rem 0.5rem; border-radius: 4px; font-weight: bold; }
.badges { display: flex; gap: 1rem; margin: 1rem 0; }
.badge { display: inline-block; padding: 0.25rem 0.5rem; font-size: 0.75rem; font-weight: 700; line-height: 1;
  border-radius: 10rem; color: #fff; background-color: #3498db; margin-right: 0.5rem; }
.tabs > input { display: none; }
.tabs > label { display: inline-block; background-color: #f1f1f1; border-radius: 4px 4px 0 0; padding: 0.5rem 1rem; cursor: pointer; }
.tabs > input:checked + label { background-color: #ffffff; border-top: 2px solid #3498db; }
.tab-panel { display: none; padding-top: 1rem; }
#tab-tool:checked ~ #panel-tool, #tab-help:checked ~ #panel-help { display: block; }
.footer { text-align: center; margin-top: 2rem; padding-bottom: 2rem; color: #7f8c8d; font-size: 0.8rem; }
@media screen and (max-width: 768px) {
  .app { padding: 0.5rem; }
  h1 { font-size: 1.5rem; }
  .upload-section, .info-box { padding: 1rem; }
  .columns { flex-direction: column; }
  .actions { max-width: 100%; }
}
";

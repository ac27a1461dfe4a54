//! Page variants
//!
//! Both variants share the same routes and flow; they differ in layout,
//! accepted formats and copy.

use crate::services::InputFormat;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const STUDIO_FORMATS: &[InputFormat] = &[InputFormat::Png, InputFormat::Jpeg, InputFormat::Bmp];

const CLASSIC_FORMATS: &[InputFormat] = &[
    InputFormat::Png,
    InputFormat::Jpeg,
    InputFormat::Bmp,
    InputFormat::Gif,
];

/// Which page layout to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppVariant {
    /// Tabbed layout with an instructions page, Traditional Chinese copy
    #[default]
    Studio,
    /// Single-column layout, English copy, also accepts GIF
    Classic,
}

impl AppVariant {
    /// Formats the upload control accepts
    #[must_use]
    pub fn accepted_formats(self) -> &'static [InputFormat] {
        match self {
            Self::Studio => STUDIO_FORMATS,
            Self::Classic => CLASSIC_FORMATS,
        }
    }

    /// Whether the page shows the tool and instructions tabs
    #[must_use]
    pub fn has_tabs(self) -> bool {
        matches!(self, Self::Studio)
    }

    /// User-visible strings
    #[must_use]
    pub fn copy(self) -> &'static PageCopy {
        match self {
            Self::Studio => &STUDIO_COPY,
            Self::Classic => &CLASSIC_COPY,
        }
    }
}

impl std::fmt::Display for AppVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Studio => write!(f, "studio"),
            Self::Classic => write!(f, "classic"),
        }
    }
}

impl FromStr for AppVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "studio" => Ok(Self::Studio),
            "classic" => Ok(Self::Classic),
            other => Err(format!("unknown variant '{other}', expected studio or classic")),
        }
    }
}

/// Static page text for one variant
///
/// Fields ending in `_html` are trusted markup and inserted verbatim.
#[derive(Debug)]
pub struct PageCopy {
    pub lang: &'static str,
    pub page_title: &'static str,
    pub heading: &'static str,
    pub intro_html: &'static str,
    pub tab_tool: &'static str,
    pub tab_help: &'static str,
    pub upload_heading: &'static str,
    pub upload_placeholder: &'static str,
    pub upload_button: &'static str,
    pub current_file: &'static str,
    pub original_heading: &'static str,
    pub result_heading: &'static str,
    pub process_button: &'static str,
    pub processing_hint: &'static str,
    pub download_button: &'static str,
    pub reset_button: &'static str,
    pub uploaded: &'static str,
    pub success: &'static str,
    pub failure_prefix: &'static str,
    pub upload_failure_prefix: &'static str,
    pub no_upload_warning: &'static str,
    pub help_html: &'static str,
    pub footer_html: &'static str,
}

static STUDIO_COPY: PageCopy = PageCopy {
    lang: "zh-Hant",
    page_title: "AI圖片去背工具",
    heading: "✨ AI 智能圖片背景移除工具",
    intro_html: "使用先進的 <span class=\"highlight\">InSPyReNet</span> 技術，輕鬆處理複雜圖像，完美保留人像細節、毛髮和產品輪廓。",
    tab_tool: "📷 去背工具",
    tab_help: "ℹ️ 使用說明",
    upload_heading: "上傳圖片",
    upload_placeholder: "拖放或點擊上方按鈕上傳圖片",
    upload_button: "上傳",
    current_file: "目前圖片",
    original_heading: "原始圖片",
    result_heading: "去背結果",
    process_button: "🔮 一鍵移除背景",
    processing_hint: "🧙‍♂️ AI正在智能處理圖片中...",
    download_button: "📥 下載去背圖片 (PNG透明背景)",
    reset_button: "重新開始",
    uploaded: "圖片已上傳，可以開始去背",
    success: "✅ 處理成功！背景已完美移除",
    failure_prefix: "❌ 處理過程中發生錯誤",
    upload_failure_prefix: "❌ 無法讀取圖片",
    no_upload_warning: "⚠️ 請先上傳一張圖片",
    help_html: r#"<div class="info-box">
  <h3>📝 使用說明</h3>
  <p>本工具使用先進的 InSPyReNet 技術，專門針對以下類型的圖像進行優化：</p>
  <div class="badges">
    <div><span class="badge">👤</span> 人像照片</div>
    <div><span class="badge">🛍️</span> 產品圖像</div>
    <div><span class="badge">✂️</span> 複雜邊緣</div>
  </div>
  <p><strong>使用步驟：</strong></p>
  <ol>
    <li>上傳一張你想移除背景的圖片（支持JPG、PNG、JPEG、BMP格式）</li>
    <li>點擊「一鍵移除背景」按鈕</li>
    <li>等待AI處理完成</li>
    <li>下載處理後的透明背景PNG圖片</li>
  </ol>
  <p><strong>優點：</strong></p>
  <ul>
    <li>智能識別圖像主體</li>
    <li>完美處理複雜髮絲和邊緣</li>
    <li>保留原始圖像細節和質量</li>
    <li>快速處理，節省編輯時間</li>
  </ul>
  <p><strong>提示：</strong> 為獲得最佳效果，請上傳清晰、光線充足的圖片，背景與主體有明顯區分。</p>
</div>
<div class="info-box">
  <h3>🔬 關於技術</h3>
  <p>本工具采用 <strong>InSPyReNet</strong> 算法，這是一種基於深度學習的先進圖像分割技術，特別擅長處理：</p>
  <ul>
    <li><strong>複雜髮絲：</strong> 精確分離髮絲與背景</li>
    <li><strong>透明和半透明物體：</strong> 處理如玻璃、煙霧等複雜元素</li>
    <li><strong>細微紋理：</strong> 保留產品和對象的細微紋理和細節</li>
  </ul>
</div>"#,
    footer_html: "由 InSPyReNet 技術驅動 | © {year} AI圖片背景移除工具",
};

static CLASSIC_COPY: PageCopy = PageCopy {
    lang: "en",
    page_title: "Background Remover",
    heading: "✂️ Image Background Remover",
    intro_html: "Upload a picture and let a pretrained segmentation model cut the subject out onto a <span class=\"highlight\">transparent background</span>.",
    tab_tool: "Tool",
    tab_help: "Instructions",
    upload_heading: "Upload an image",
    upload_placeholder: "Choose a PNG, JPG, JPEG, BMP or GIF file",
    upload_button: "Upload",
    current_file: "Current image",
    original_heading: "Original",
    result_heading: "Background removed",
    process_button: "Remove background",
    processing_hint: "Processing, this can take a few seconds...",
    download_button: "Download result (PNG)",
    reset_button: "Start over",
    uploaded: "Image uploaded, ready to process",
    success: "Done! The background has been removed",
    failure_prefix: "Processing failed",
    upload_failure_prefix: "Could not read the image",
    no_upload_warning: "Please upload an image first",
    help_html: "",
    footer_html: "Background removal powered by a pretrained segmentation model | © {year}",
};

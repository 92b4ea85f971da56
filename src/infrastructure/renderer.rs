//! PDF 栅格化与文本提取
//!
//! pdfium 调用是 CPU 密集的阻塞操作，统一放到 `spawn_blocking` 中执行。

use anyhow::Result;
use async_trait::async_trait;

/// 文档渲染能力
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// 把原件渲染为按页排列的 PNG
    async fn rasterize(&self, source: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// 提取文本层，最多 `max_chars` 个字符
    async fn extract_text(&self, source: &[u8], max_chars: usize) -> Result<String>;
}

#[cfg(feature = "pdfium")]
pub use pdfium_impl::PdfiumRenderer;

#[cfg(feature = "pdfium")]
mod pdfium_impl {
    use std::io::Cursor;

    use anyhow::{anyhow, Context, Result};
    use async_trait::async_trait;
    use pdfium_render::prelude::*;
    use tracing::debug;

    use super::DocumentRenderer;

    /// 基于 pdfium 的渲染器
    #[derive(Debug, Clone)]
    pub struct PdfiumRenderer {
        scale: f32,
    }

    impl PdfiumRenderer {
        pub fn new(scale: f32) -> Self {
            Self { scale }
        }
    }

    fn bind_pdfium() -> Result<Pdfium> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| anyhow!("无法加载 pdfium 库: {:?}", e))?;
        Ok(Pdfium::new(bindings))
    }

    fn rasterize_blocking(source: &[u8], scale: f32) -> Result<Vec<Vec<u8>>> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(source, None)
            .map_err(|e| anyhow!("PDF 打开失败: {:?}", e))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let mut pages = Vec::new();

        for (idx, page) in document.pages().iter().enumerate() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| anyhow!("第 {} 页渲染失败: {:?}", idx + 1, e))?;
            let image = bitmap.as_image();

            let mut buf = Vec::new();
            image
                .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                .with_context(|| format!("第 {} 页 PNG 编码失败", idx + 1))?;
            debug!("渲染第 {} 页 → {}x{} px", idx + 1, image.width(), image.height());
            pages.push(buf);
        }

        Ok(pages)
    }

    fn extract_text_blocking(source: &[u8], max_chars: usize) -> Result<String> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(source, None)
            .map_err(|e| anyhow!("PDF 打开失败: {:?}", e))?;

        let mut text = String::new();
        for page in document.pages().iter() {
            if text.chars().count() >= max_chars {
                break;
            }
            if let Ok(page_text) = page.text() {
                text.push_str(&page_text.all());
                text.push('\n');
            }
        }
        Ok(text.chars().take(max_chars).collect())
    }

    #[async_trait]
    impl DocumentRenderer for PdfiumRenderer {
        async fn rasterize(&self, source: &[u8]) -> Result<Vec<Vec<u8>>> {
            let bytes = source.to_vec();
            let scale = self.scale;
            tokio::task::spawn_blocking(move || rasterize_blocking(&bytes, scale))
                .await
                .map_err(|e| anyhow!("渲染任务异常退出: {}", e))?
        }

        async fn extract_text(&self, source: &[u8], max_chars: usize) -> Result<String> {
            let bytes = source.to_vec();
            tokio::task::spawn_blocking(move || extract_text_blocking(&bytes, max_chars))
                .await
                .map_err(|e| anyhow!("文本提取任务异常退出: {}", e))?
        }
    }
}

/// 未启用 pdfium 时的占位实现，所有调用都返回错误
#[derive(Debug, Clone, Default)]
pub struct UnavailableRenderer;

#[async_trait]
impl DocumentRenderer for UnavailableRenderer {
    async fn rasterize(&self, _source: &[u8]) -> Result<Vec<Vec<u8>>> {
        anyhow::bail!("未启用 pdfium 功能，无法栅格化 PDF")
    }

    async fn extract_text(&self, _source: &[u8], _max_chars: usize) -> Result<String> {
        anyhow::bail!("未启用 pdfium 功能，无法提取 PDF 文本")
    }
}

/// 按编译特性选择渲染器
pub fn default_renderer(scale: f32) -> std::sync::Arc<dyn DocumentRenderer> {
    #[cfg(feature = "pdfium")]
    {
        std::sync::Arc::new(PdfiumRenderer::new(scale))
    }
    #[cfg(not(feature = "pdfium"))]
    {
        let _ = scale;
        std::sync::Arc::new(UnavailableRenderer)
    }
}

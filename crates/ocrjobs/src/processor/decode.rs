//! Turns uploaded bytes into page bitmaps.
//!
//! Images are decoded in-process and re-encoded as PNG. PDFs are page-counted
//! with lopdf (falling back to `pdfinfo` for files lopdf cannot parse) and
//! rendered one page at a time with `pdftoppm` from poppler-utils.

use std::io::Cursor;
use std::path::Path;
use std::process::Command;

use image::GenericImageView;

use crate::config::OcrConfig;
use crate::error::RecognitionError;
use crate::jobs::FileType;

pub const DEFAULT_DPI: u32 = 300;

/// One page, PNG-encoded, ready for the engine.
#[derive(Debug, Clone)]
pub struct DecodedPage {
    /// 1-based.
    pub page_number: u32,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DocumentDecoder {
    pdftoppm_path: String,
    pdfinfo_path: String,
    default_dpi: u32,
}

/// Turns an upload into ordered, 1-based pages.
pub trait PageDecoder: Send + Sync {
    fn decode(
        &self,
        bytes: &[u8],
        file_type: FileType,
        resolution: Option<u32>,
    ) -> Result<Vec<DecodedPage>, RecognitionError>;
}

impl PageDecoder for DocumentDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        file_type: FileType,
        resolution: Option<u32>,
    ) -> Result<Vec<DecodedPage>, RecognitionError> {
        let _span = tracing::info_span!("processor.decode", file_type = file_type.as_str()).entered();

        match file_type {
            FileType::Image => Ok(vec![decode_image(bytes, 1)?]),
            FileType::Pdf => self.decode_pdf(bytes, resolution.unwrap_or(self.default_dpi)),
        }
    }
}

impl Default for DocumentDecoder {
    fn default() -> Self {
        Self {
            pdftoppm_path: "pdftoppm".to_string(),
            pdfinfo_path: "pdfinfo".to_string(),
            default_dpi: DEFAULT_DPI,
        }
    }
}

impl DocumentDecoder {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            pdftoppm_path: config.pdftoppm_path.clone(),
            pdfinfo_path: config.pdfinfo_path.clone(),
            default_dpi: config.default_resolution,
        }
    }

    fn decode_pdf(&self, bytes: &[u8], dpi: u32) -> Result<Vec<DecodedPage>, RecognitionError> {
        let workdir = tempfile::tempdir()?;
        let pdf_path = workdir.path().join("input.pdf");
        std::fs::write(&pdf_path, bytes)?;

        let page_count = match lopdf::Document::load_mem(bytes) {
            Ok(doc) => doc.get_pages().len(),
            Err(e) => {
                tracing::warn!("lopdf failed to parse upload: {}. Trying pdfinfo.", e);
                self.count_pages_with_pdfinfo(&pdf_path).map_err(|fallback| {
                    RecognitionError::decode("PDF", format!("{} ({})", e, fallback))
                })?
            }
        };

        if page_count == 0 {
            return Err(RecognitionError::decode("PDF", "document has no pages"));
        }

        (1..=page_count as u32)
            .map(|page_number| {
                let png = self.render_page(&pdf_path, workdir.path(), page_number, dpi)?;
                decode_image(&png, page_number)
            })
            .collect()
    }

    fn count_pages_with_pdfinfo(&self, pdf_path: &Path) -> Result<usize, String> {
        let output = Command::new(&self.pdfinfo_path)
            .arg(pdf_path)
            .output()
            .map_err(|e| {
                format!(
                    "failed to run {}: {}. Make sure poppler-utils is installed",
                    self.pdfinfo_path, e
                )
            })?;

        if !output.status.success() {
            return Err(format!(
                "pdfinfo failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .find_map(|line| line.strip_prefix("Pages:"))
            .and_then(|count| count.trim().parse::<usize>().ok())
            .ok_or_else(|| "pdfinfo did not report a page count".to_string())
    }

    fn render_page(
        &self,
        pdf_path: &Path,
        workdir: &Path,
        page_number: u32,
        dpi: u32,
    ) -> Result<Vec<u8>, RecognitionError> {
        let prefix = workdir.join(format!("page-{}", page_number));
        let page = page_number.to_string();

        let output = Command::new(&self.pdftoppm_path)
            .args(["-png", "-singlefile", "-r", &dpi.to_string(), "-f", &page, "-l", &page])
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .map_err(|e| {
                RecognitionError::decode(
                    "PDF",
                    format!(
                        "failed to run {}: {}. Make sure poppler-utils is installed",
                        self.pdftoppm_path, e
                    ),
                )
            })?;

        if !output.status.success() {
            return Err(RecognitionError::decode(
                "PDF",
                format!(
                    "pdftoppm failed on page {}: {}",
                    page_number,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let image_path = prefix.with_extension("png");
        std::fs::read(&image_path).map_err(|e| {
            RecognitionError::decode(
                "PDF",
                format!("rendered page {} is missing: {}", page_number, e),
            )
        })
    }
}

/// Decodes any supported raster format and re-encodes it as PNG.
fn decode_image(bytes: &[u8], page_number: u32) -> Result<DecodedPage, RecognitionError> {
    if bytes.is_empty() {
        return Err(RecognitionError::decode("Image", "no image data"));
    }

    let img = image::load_from_memory(bytes)
        .map_err(|e| RecognitionError::decode("Image", e.to_string()))?;
    let (width, height) = img.dimensions();

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| RecognitionError::decode("Image", format!("PNG re-encode failed: {}", e)))?;

    Ok(DecodedPage {
        page_number,
        width,
        height,
        png,
    })
}

pub mod decode;
pub mod tesseract;

use std::sync::Arc;

use crate::error::RecognitionError;
use crate::jobs::{FileType, PageDimensions, RecognitionParams, RecognitionToken};

pub use decode::{DecodedPage, DocumentDecoder, PageDecoder};
pub use tesseract::TesseractEngine;

/// Text-recognition engine boundary.
///
/// Implementations are synchronous and may take seconds per page; they are
/// only ever called from worker threads.
pub trait RecognitionEngine: Send + Sync {
    /// Recognizes one decoded page. Returned tokens carry the page's number.
    fn recognize(
        &self,
        page: &DecodedPage,
        params: &RecognitionParams,
    ) -> Result<Vec<RecognitionToken>, RecognitionError>;

    /// Language codes the engine can load.
    fn installed_languages(&self) -> Result<Vec<String>, RecognitionError>;

    /// Engine version string; doubles as a liveness probe.
    fn version(&self) -> Result<String, RecognitionError>;
}

/// Normalized output of one document.
#[derive(Debug, Clone)]
pub struct RecognitionOutput {
    pub file_type: FileType,
    pub pages: Vec<PageDimensions>,
    pub tokens: Vec<RecognitionToken>,
}

/// Decode-then-recognize pipeline for whole documents.
#[derive(Clone)]
pub struct Recognizer {
    engine: Arc<dyn RecognitionEngine>,
    decoder: Arc<dyn PageDecoder>,
}

impl Recognizer {
    pub fn new(engine: Arc<dyn RecognitionEngine>, decoder: impl PageDecoder + 'static) -> Self {
        Self {
            engine,
            decoder: Arc::new(decoder),
        }
    }

    pub fn engine(&self) -> &Arc<dyn RecognitionEngine> {
        &self.engine
    }

    /// Decodes `bytes` into pages and recognizes them in page order.
    pub fn run(
        &self,
        bytes: &[u8],
        file_type: FileType,
        params: &RecognitionParams,
    ) -> Result<RecognitionOutput, RecognitionError> {
        let pages = self.decoder.decode(bytes, file_type, params.resolution)?;

        let mut dimensions = Vec::with_capacity(pages.len());
        let mut tokens = Vec::new();

        for page in &pages {
            let _span =
                tracing::info_span!("processor.recognize", page = page.page_number).entered();

            let page_tokens = self.engine.recognize(page, params)?;
            tracing::debug!(
                page = page.page_number,
                tokens = page_tokens.len(),
                "Page recognized"
            );

            tokens.extend(page_tokens.into_iter().map(|mut token| {
                token.page_number = page.page_number;
                token
            }));
            dimensions.push(PageDimensions {
                page_number: page.page_number,
                width: page.width,
                height: page.height,
            });
        }

        Ok(RecognitionOutput {
            file_type,
            pages: dimensions,
            tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Echoes one word per page, recording the order pages arrive in.
    struct RecordingEngine {
        seen: Mutex<Vec<u32>>,
    }

    impl RecognitionEngine for RecordingEngine {
        fn recognize(
            &self,
            page: &DecodedPage,
            _params: &RecognitionParams,
        ) -> Result<Vec<RecognitionToken>, RecognitionError> {
            self.seen.lock().unwrap().push(page.page_number);
            Ok(vec![RecognitionToken {
                level: 5,
                // Engines number every single-image page 1; the pipeline restamps it.
                page_number: 1,
                block_num: 1,
                par_num: 1,
                line_num: 1,
                word_num: 1,
                left: 0,
                top: 0,
                width: page.width as i32,
                height: page.height as i32,
                confidence: 90.0,
                text: "word".to_string(),
            }])
        }

        fn installed_languages(&self) -> Result<Vec<String>, RecognitionError> {
            Ok(vec!["eng".to_string()])
        }

        fn version(&self) -> Result<String, RecognitionError> {
            Ok("recording 1.0".to_string())
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_run_single_image() {
        let engine = Arc::new(RecordingEngine {
            seen: Mutex::new(vec![]),
        });
        let recognizer = Recognizer::new(engine.clone(), DocumentDecoder::default());

        let output = recognizer
            .run(&png_bytes(64, 32), FileType::Image, &RecognitionParams::default())
            .unwrap();

        assert_eq!(output.file_type, FileType::Image);
        assert_eq!(
            output.pages,
            vec![PageDimensions {
                page_number: 1,
                width: 64,
                height: 32
            }]
        );
        assert_eq!(output.tokens.len(), 1);
        assert_eq!(output.tokens[0].width, 64);
        assert_eq!(*engine.seen.lock().unwrap(), vec![1]);
    }

    /// Hands out `pages` blank pages, 10 px wider per page.
    struct FixedPages {
        pages: u32,
    }

    impl PageDecoder for FixedPages {
        fn decode(
            &self,
            _bytes: &[u8],
            _file_type: FileType,
            _resolution: Option<u32>,
        ) -> Result<Vec<DecodedPage>, RecognitionError> {
            Ok((1..=self.pages)
                .map(|page_number| DecodedPage {
                    page_number,
                    width: 10 * page_number,
                    height: 20,
                    png: Vec::new(),
                })
                .collect())
        }
    }

    /// Emits `page_number` words for each page.
    struct CountingEngine;

    impl RecognitionEngine for CountingEngine {
        fn recognize(
            &self,
            page: &DecodedPage,
            _params: &RecognitionParams,
        ) -> Result<Vec<RecognitionToken>, RecognitionError> {
            Ok((1..=page.page_number as i32)
                .map(|word_num| RecognitionToken {
                    level: 5,
                    page_number: 1,
                    block_num: 1,
                    par_num: 1,
                    line_num: 1,
                    word_num,
                    left: 0,
                    top: 0,
                    width: 1,
                    height: 1,
                    confidence: 80.0,
                    text: format!("p{}w{}", page.page_number, word_num),
                })
                .collect())
        }

        fn installed_languages(&self) -> Result<Vec<String>, RecognitionError> {
            Ok(vec!["eng".to_string()])
        }

        fn version(&self) -> Result<String, RecognitionError> {
            Ok("counting 1.0".to_string())
        }
    }

    #[test]
    fn test_run_multi_page_document() {
        let recognizer = Recognizer::new(Arc::new(CountingEngine), FixedPages { pages: 3 });

        let output = recognizer
            .run(b"%PDF-", FileType::Pdf, &RecognitionParams::default())
            .unwrap();

        let numbers: Vec<u32> = output.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(output.pages[2].width, 30);

        // 1 + 2 + 3 words, in page order.
        assert_eq!(output.tokens.len(), 6);
        let token_pages: Vec<u32> = output.tokens.iter().map(|t| t.page_number).collect();
        assert_eq!(token_pages, vec![1, 2, 2, 3, 3, 3]);
        assert!(output
            .tokens
            .iter()
            .all(|t| t.text.starts_with(&format!("p{}", t.page_number))));
    }

    #[test]
    fn test_run_propagates_decode_failure() {
        let engine = Arc::new(RecordingEngine {
            seen: Mutex::new(vec![]),
        });
        let recognizer = Recognizer::new(engine.clone(), DocumentDecoder::default());

        let err = recognizer
            .run(b"definitely not pixels", FileType::Image, &RecognitionParams::default())
            .unwrap_err();

        assert!(matches!(err, RecognitionError::Decode { .. }));
        assert!(engine.seen.lock().unwrap().is_empty());
    }
}

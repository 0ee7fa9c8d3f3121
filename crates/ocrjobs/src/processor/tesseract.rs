//! Tesseract backend, driven through its command-line interface.
//!
//! Each page is written to a scratch PNG and recognized with the `tsv`
//! output config, which yields one row per layout element (page, block,
//! paragraph, line, word) with its bounding box and confidence.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use super::{DecodedPage, RecognitionEngine};
use crate::error::RecognitionError;
use crate::jobs::{RecognitionParams, RecognitionToken};
use crate::validation::parse_engine_flags;

const TSV_COLUMNS: usize = 12;

pub struct TesseractEngine {
    binary: String,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, command: &mut Command) -> Result<Output, RecognitionError> {
        match command.output() {
            Ok(output) => Ok(output),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RecognitionError::EngineUnavailable(format!(
                    "{} not found (install tesseract-ocr)",
                    self.binary
                )))
            }
            Err(e) => Err(RecognitionError::Io(e)),
        }
    }

    /// `tesseract IMAGE stdout -l LANG --psm N [--dpi R] [flags...] tsv`
    fn recognize_command(
        &self,
        image: &Path,
        params: &RecognitionParams,
    ) -> Result<Command, RecognitionError> {
        let mut command = Command::new(&self.binary);
        command
            .arg(image)
            .arg("stdout")
            .args(["-l", &params.language])
            .args(["--psm", &params.segmentation_mode.to_string()]);

        if let Some(dpi) = params.resolution {
            command.args(["--dpi", &dpi.to_string()]);
        }

        if let Some(flags) = params.extra_flags.as_deref() {
            let parsed = parse_engine_flags(flags).map_err(RecognitionError::EngineFailed)?;
            for flag in parsed {
                command.args(flag.to_args());
            }
        }

        command.arg("tsv");
        Ok(command)
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl RecognitionEngine for TesseractEngine {
    fn recognize(
        &self,
        page: &DecodedPage,
        params: &RecognitionParams,
    ) -> Result<Vec<RecognitionToken>, RecognitionError> {
        let mut scratch = tempfile::Builder::new()
            .prefix("ocrjobs-page-")
            .suffix(".png")
            .tempfile()?;
        scratch.write_all(&page.png)?;
        scratch.flush()?;

        let mut command = self.recognize_command(scratch.path(), params)?;

        let output = self.run(&mut command)?;
        if !output.status.success() {
            return Err(RecognitionError::EngineFailed(format!(
                "tesseract exited with {} on page {}: {}",
                output.status,
                page.page_number,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_tsv(
            &String::from_utf8_lossy(&output.stdout),
            page.page_number,
        ))
    }

    fn installed_languages(&self) -> Result<Vec<String>, RecognitionError> {
        let output = self.run(Command::new(&self.binary).arg("--list-langs"))?;
        if !output.status.success() {
            return Err(RecognitionError::EngineFailed(format!(
                "tesseract --list-langs failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_language_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn version(&self) -> Result<String, RecognitionError> {
        let output = self.run(Command::new(&self.binary).arg("--version"))?;
        if !output.status.success() {
            return Err(RecognitionError::EngineFailed(format!(
                "tesseract --version exited with {}",
                output.status
            )));
        }

        // Older releases print the banner on stderr.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        stdout
            .lines()
            .chain(stderr.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RecognitionError::EngineFailed("empty version banner".to_string()))
    }
}

/// Parses tesseract TSV output into tokens stamped with `page_number`.
///
/// The header row and malformed rows are skipped. Rows whose text column is
/// absent (structural elements) get an empty string.
pub fn parse_tsv(tsv: &str, page_number: u32) -> Vec<RecognitionToken> {
    let mut tokens = Vec::new();

    for line in tsv.lines() {
        if line.is_empty() || line.starts_with("level\t") {
            continue;
        }

        let fields: Vec<&str> = line.splitn(TSV_COLUMNS, '\t').collect();
        if fields.len() < TSV_COLUMNS - 1 {
            log::warn!("Skipping malformed TSV row: {:?}", line);
            continue;
        }

        let int = |i: usize| fields[i].trim().parse::<i32>().ok();
        let parsed = (|| {
            Some(RecognitionToken {
                level: int(0)?,
                page_number,
                block_num: int(2)?,
                par_num: int(3)?,
                line_num: int(4)?,
                word_num: int(5)?,
                left: int(6)?,
                top: int(7)?,
                width: int(8)?,
                height: int(9)?,
                confidence: fields[10].trim().parse::<f64>().ok()?,
                text: fields.get(11).map(|t| t.to_string()).unwrap_or_default(),
            })
        })();

        match parsed {
            Some(token) => tokens.push(token),
            None => log::warn!("Skipping unparsable TSV row: {:?}", line),
        }
    }

    tokens
}

/// Extracts language codes from `tesseract --list-langs` output.
fn parse_language_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of") && !line.ends_with(':'))
        .map(str::to_string)
        .collect()
}

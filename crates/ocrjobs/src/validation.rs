//! Submission-time validation of recognition parameters.
//!
//! Everything here runs on the request path before a job row exists, so a
//! rejected submission leaves no trace in the store.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::config::OcrConfig;
use crate::error::{RecognitionError, ValidationError};
use crate::jobs::{RecognitionParams, DEFAULT_LANGUAGE, DEFAULT_SEGMENTATION_MODE};
use crate::processor::RecognitionEngine;

pub const MAX_RESOLUTION: u32 = 2400;

/// Page segmentation modes that run recognition. 0 is orientation detection
/// only and 2 is layout analysis without OCR.
pub const SEGMENTATION_MODES: &[u8] = &[1, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13];

static RE_FLAG_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static RE_OPTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap());

/// Parameters exactly as the client sent them.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawParams {
    pub language: Option<String>,
    pub resolution: Option<String>,
    #[serde(alias = "psm")]
    pub segmentation_mode: Option<String>,
    pub extra_flags: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParamValidator {
    languages: BTreeSet<String>,
    default_language: String,
    default_segmentation_mode: u8,
}

impl ParamValidator {
    pub fn new(languages: impl IntoIterator<Item = String>) -> Self {
        Self {
            languages: languages.into_iter().collect(),
            default_language: DEFAULT_LANGUAGE.to_string(),
            default_segmentation_mode: DEFAULT_SEGMENTATION_MODE,
        }
    }

    /// Builds a validator from the engine's installed languages and the
    /// configured defaults. The language list is read once.
    pub fn from_engine(
        engine: &dyn RecognitionEngine,
        config: &OcrConfig,
    ) -> Result<Self, RecognitionError> {
        let languages = engine.installed_languages()?;
        log::info!("Recognition engine reports {} language(s)", languages.len());
        Ok(Self::new(languages)
            .with_defaults(config.default_language.clone(), config.default_segmentation_mode))
    }

    pub fn with_defaults(mut self, language: String, segmentation_mode: u8) -> Self {
        self.default_language = language;
        self.default_segmentation_mode = segmentation_mode;
        self
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.iter().map(String::as_str)
    }

    pub fn validate(&self, raw: &RawParams) -> Result<RecognitionParams, ValidationError> {
        let language = match non_blank(&raw.language) {
            Some(language) => language.to_string(),
            None => self.default_language.clone(),
        };
        self.check_language(&language)?;

        let resolution = non_blank(&raw.resolution)
            .map(parse_resolution)
            .transpose()?;

        let segmentation_mode = match non_blank(&raw.segmentation_mode) {
            Some(value) => parse_segmentation_mode(value)?,
            None => self.default_segmentation_mode,
        };

        let extra_flags = match non_blank(&raw.extra_flags) {
            Some(flags) => {
                parse_engine_flags(flags).map_err(|reason| {
                    ValidationError::MalformedEngineFlags {
                        flags: flags.to_string(),
                        reason,
                    }
                })?;
                Some(flags.to_string())
            }
            None => None,
        };

        Ok(RecognitionParams {
            language,
            segmentation_mode,
            resolution,
            extra_flags,
        })
    }

    /// `eng+deu` style combinations need every component installed.
    fn check_language(&self, language: &str) -> Result<(), ValidationError> {
        let all_installed = language
            .split('+')
            .all(|code| !code.is_empty() && self.languages.contains(code));

        if all_installed {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedLanguage {
                language: language.to_string(),
                available: self
                    .languages
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_resolution(value: &str) -> Result<u32, ValidationError> {
    match value.parse::<u32>() {
        Ok(dpi) if (1..=MAX_RESOLUTION).contains(&dpi) => Ok(dpi),
        _ => Err(ValidationError::InvalidResolution {
            value: value.to_string(),
            max: MAX_RESOLUTION,
        }),
    }
}

fn parse_segmentation_mode(value: &str) -> Result<u8, ValidationError> {
    match value.parse::<u8>() {
        Ok(mode) if SEGMENTATION_MODES.contains(&mode) => Ok(mode),
        _ => Err(ValidationError::UnsupportedSegmentationMode {
            value: value.to_string(),
            allowed: SEGMENTATION_MODES
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Long options that dedicated parameters own, or that make the engine
/// print something and exit instead of recognizing.
const RESERVED_OPTIONS: &[&str] = &[
    "psm",
    "dpi",
    "help",
    "help-extra",
    "help-psm",
    "help-oem",
    "version",
    "list-langs",
    "print-parameters",
];

/// One engine flag accepted from `extra_flags`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFlag {
    /// `-c name=value`
    Variable { name: String, value: String },
    /// `--name [value]`
    LongOption { name: String, value: Option<String> },
}

impl EngineFlag {
    /// Command-line arguments, one argv entry each.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            EngineFlag::Variable { name, value } => {
                vec!["-c".to_string(), format!("{}={}", name, value)]
            }
            EngineFlag::LongOption { name, value } => {
                let mut args = vec![format!("--{}", name)];
                args.extend(value.iter().cloned());
                args
            }
        }
    }
}

/// Splits `extra_flags` into `-c name=value` variables and `--name [value]`
/// options. A token that follows `--name` and does not start with `-` is
/// that option's value.
pub fn parse_engine_flags(flags: &str) -> Result<Vec<EngineFlag>, String> {
    let mut parsed = Vec::new();
    let mut parts = flags.split_whitespace().peekable();

    while let Some(part) = parts.next() {
        if part == "-c" {
            let assignment = parts
                .next()
                .ok_or_else(|| "'-c' must be followed by name=value".to_string())?;
            let (name, value) = assignment
                .split_once('=')
                .ok_or_else(|| format!("'{}' is not of the form name=value", assignment))?;

            if !RE_FLAG_NAME.is_match(name) {
                return Err(format!("'{}' is not a valid parameter name", name));
            }
            if value.is_empty() {
                return Err(format!("parameter '{}' has no value", name));
            }

            parsed.push(EngineFlag::Variable {
                name: name.to_string(),
                value: value.to_string(),
            });
        } else if let Some(name) = part.strip_prefix("--") {
            if !RE_OPTION_NAME.is_match(name) {
                return Err(format!("'{}' is not a valid option", part));
            }
            if RESERVED_OPTIONS.contains(&name) {
                return Err(format!("'{}' cannot be passed as an extra flag", part));
            }

            let value = parts
                .next_if(|next| !next.starts_with('-'))
                .map(str::to_string);
            parsed.push(EngineFlag::LongOption {
                name: name.to_string(),
                value,
            });
        } else {
            return Err(format!("expected '-c' or a '--' option, found '{}'", part));
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ParamValidator {
        ParamValidator::new(["eng", "deu", "osd"].map(String::from))
    }

    fn raw(language: Option<&str>, resolution: Option<&str>, mode: Option<&str>) -> RawParams {
        RawParams {
            language: language.map(String::from),
            resolution: resolution.map(String::from),
            segmentation_mode: mode.map(String::from),
            extra_flags: None,
        }
    }

    #[test]
    fn test_defaults_apply() {
        let params = validator().validate(&RawParams::default()).unwrap();
        assert_eq!(params.language, "eng");
        assert_eq!(params.segmentation_mode, 3);
        assert_eq!(params.resolution, None);
        assert_eq!(params.extra_flags, None);
    }

    #[test]
    fn test_configured_defaults() {
        let v = validator().with_defaults("deu".to_string(), 6);
        let params = v.validate(&RawParams::default()).unwrap();
        assert_eq!(params.language, "deu");
        assert_eq!(params.segmentation_mode, 6);
    }

    #[test]
    fn test_unknown_language_rejected() {
        let err = validator().validate(&raw(Some("xx"), None, None)).unwrap_err();
        assert_eq!(err.code(), "unsupported_language");
        assert!(err.to_string().contains("xx"));
    }

    #[test]
    fn test_combined_languages() {
        assert!(validator().validate(&raw(Some("eng+deu"), None, None)).is_ok());
        assert!(validator().validate(&raw(Some("eng+xx"), None, None)).is_err());
        assert!(validator().validate(&raw(Some("eng+"), None, None)).is_err());
    }

    #[test]
    fn test_resolution_bounds() {
        let v = validator();
        assert_eq!(v.validate(&raw(None, Some("300"), None)).unwrap().resolution, Some(300));
        assert_eq!(v.validate(&raw(None, Some(" "), None)).unwrap().resolution, None);

        for bad in ["0", "-72", "abc", "2401", "1.5"] {
            let err = v.validate(&raw(None, Some(bad), None)).unwrap_err();
            assert_eq!(err.code(), "invalid_resolution", "value {bad}");
        }
    }

    #[test]
    fn test_segmentation_modes() {
        let v = validator();
        for mode in SEGMENTATION_MODES {
            let params = v.validate(&raw(None, None, Some(&mode.to_string()))).unwrap();
            assert_eq!(params.segmentation_mode, *mode);
        }
        for bad in ["0", "2", "14", "-1", "auto"] {
            let err = v.validate(&raw(None, None, Some(bad))).unwrap_err();
            assert_eq!(err.code(), "unsupported_segmentation_mode", "value {bad}");
        }
    }

    #[test]
    fn test_engine_variables() {
        assert_eq!(
            parse_engine_flags("-c preserve_interword_spaces=1 -c tessedit_char_whitelist=0123456789")
                .unwrap(),
            vec![
                EngineFlag::Variable {
                    name: "preserve_interword_spaces".to_string(),
                    value: "1".to_string(),
                },
                EngineFlag::Variable {
                    name: "tessedit_char_whitelist".to_string(),
                    value: "0123456789".to_string(),
                },
            ]
        );
        assert!(parse_engine_flags("").unwrap().is_empty());
    }

    #[test]
    fn test_engine_options() {
        let flags = parse_engine_flags("--oem 1 --tessdata-dir /opt/tessdata --loglevel").unwrap();
        assert_eq!(
            flags,
            vec![
                EngineFlag::LongOption {
                    name: "oem".to_string(),
                    value: Some("1".to_string()),
                },
                EngineFlag::LongOption {
                    name: "tessdata-dir".to_string(),
                    value: Some("/opt/tessdata".to_string()),
                },
                EngineFlag::LongOption {
                    name: "loglevel".to_string(),
                    value: None,
                },
            ]
        );
        assert_eq!(flags[0].to_args(), vec!["--oem", "1"]);
        assert_eq!(flags[2].to_args(), vec!["--loglevel"]);
    }

    #[test]
    fn test_mixed_options_and_variables() {
        let flags = parse_engine_flags("--oem 1 -c textord_heavy_nr=1").unwrap();
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[1].to_args(), vec!["-c", "textord_heavy_nr=1"]);
    }

    #[test]
    fn test_malformed_engine_flags() {
        for bad in [
            "oem 1",
            "-l eng",
            "-c",
            "-c novalue",
            "-c 9bad=1",
            "-c name=",
            "-c a=1 extra",
            "--",
            "--Bad_Name",
            "--oem 1 ;",
        ] {
            assert!(parse_engine_flags(bad).is_err(), "flags {bad:?}");
        }
    }

    #[test]
    fn test_options_owned_by_parameters_rejected() {
        for reserved in ["--psm 6", "--dpi 300", "--list-langs", "--version", "--help-psm"] {
            let err = parse_engine_flags(reserved).unwrap_err();
            assert!(err.contains("cannot be passed"), "flags {reserved:?}: {err}");
        }
    }

    #[test]
    fn test_validator_accepts_engine_options() {
        let mut params = RawParams::default();
        params.extra_flags = Some("--oem 1".to_string());
        let ok = validator().validate(&params).unwrap();
        assert_eq!(ok.extra_flags.as_deref(), Some("--oem 1"));

        params.extra_flags = Some("--tessdata-dir /x".to_string());
        assert!(validator().validate(&params).is_ok());

        params.extra_flags = Some("--psm 6".to_string());
        let err = validator().validate(&params).unwrap_err();
        assert_eq!(err.code(), "malformed_engine_flags");
    }

    #[test]
    fn test_malformed_flags_rejected_by_validator() {
        let mut params = RawParams::default();
        params.extra_flags = Some("; rm -rf /".to_string());
        let err = validator().validate(&params).unwrap_err();
        assert_eq!(err.code(), "malformed_engine_flags");

        params.extra_flags = Some("-c textord_heavy_nr=1".to_string());
        let ok = validator().validate(&params).unwrap();
        assert_eq!(ok.extra_flags.as_deref(), Some("-c textord_heavy_nr=1"));
    }

    #[test]
    fn test_psm_alias_deserializes() {
        let raw: RawParams = serde_json::from_str(r#"{"psm": "6"}"#).unwrap();
        assert_eq!(raw.segmentation_mode.as_deref(), Some("6"));
    }
}

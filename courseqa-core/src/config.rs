//! Environment-driven configuration for scans.

use std::str::FromStr;

use crate::accessibility::CommandSpec;
use crate::error::{CourseQaError, Result};
use crate::package::ScratchSpace;
use crate::reliability::AuditorConfig;

/// Bounds that keep scan latency and external cost predictable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Markup files handed to each content scanner.
    pub max_files: usize,
    /// Violations kept per markup file.
    pub max_violations: usize,
    /// Plain-text characters kept per markup file.
    pub snippet_chars: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_files: 3,
            max_violations: 10,
            snippet_chars: 3500,
        }
    }
}

impl ScanLimits {
    /// Read limits from the environment, keeping defaults for unset values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_files: env_parse("COURSEQA_SCAN_MAX_FILES", defaults.max_files),
            max_violations: env_parse("COURSEQA_SCAN_MAX_VIOLATIONS", defaults.max_violations),
            snippet_chars: env_parse("COURSEQA_SNIPPET_CHARS", defaults.snippet_chars),
        }
    }
}

/// Which accessibility engine drives the DOM checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineChoice {
    /// In-process rules.
    Builtin,
    /// An external runner process.
    Command(CommandSpec),
}

impl EngineChoice {
    /// Read `COURSEQA_A11Y_ENGINE` and `COURSEQA_A11Y_COMMAND`.
    pub fn from_env() -> Result<Self> {
        let engine = std::env::var("COURSEQA_A11Y_ENGINE").unwrap_or_else(|_| "builtin".to_string());
        match engine.trim().to_ascii_lowercase().as_str() {
            "" | "builtin" => Ok(Self::Builtin),
            "command" => {
                let raw = std::env::var("COURSEQA_A11Y_COMMAND").unwrap_or_default();
                CommandSpec::parse(&raw).map(Self::Command).ok_or_else(|| {
                    CourseQaError::Other(
                        "COURSEQA_A11Y_COMMAND must name a runner when COURSEQA_A11Y_ENGINE=command"
                            .to_string(),
                    )
                })
            }
            other => Err(CourseQaError::Other(format!(
                "unsupported COURSEQA_A11Y_ENGINE value: {other}"
            ))),
        }
    }
}

/// Everything a [`crate::QualityScanner`] needs.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Scan bounds.
    pub limits: ScanLimits,
    /// Accessibility engine selection.
    pub engine: EngineChoice,
    /// Scratch directory parent.
    pub scratch: ScratchSpace,
    /// Reliability auditor settings; `None` disables the audit.
    pub auditor: Option<AuditorConfig>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            limits: ScanLimits::default(),
            engine: EngineChoice::Builtin,
            scratch: ScratchSpace::system(),
            auditor: None,
        }
    }
}

impl ScanConfig {
    /// Build the scan configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            limits: ScanLimits::from_env(),
            engine: EngineChoice::from_env()?,
            scratch: ScratchSpace::from_env(),
            auditor: AuditorConfig::from_env(),
        })
    }
}

pub(crate) fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("ignoring invalid {name}={raw}");
                default
            }
        },
        Err(_) => default,
    }
}

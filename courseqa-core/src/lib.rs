#![deny(missing_docs)]
//! courseqa core library.
//!
//! This crate contains the domain types, scanners, scoring, auto-fix rules
//! and storage ports behind the course package QA engine.

pub mod accessibility;
pub mod autofix;
pub mod config;
mod dom;
pub mod domain;
pub mod error;
pub mod fs;
pub mod history;
pub mod manifest;
pub mod package;
pub mod reliability;
pub mod report;
pub mod scanner;
pub mod scoring;
pub mod service;
pub mod store;
pub mod vpat;

pub use accessibility::{AccessibilityEngine, AccessibilityScanner, BuiltinEngine, CommandEngine};
pub use autofix::{AutoFixer, FixCounts, FixOutcome, FixRule, build_rules, default_rules};
pub use config::{EngineChoice, ScanConfig, ScanLimits};
pub use domain::{
    Asset, AssetKind, Issue, IssueCategory, IssueDraft, IssueSeverity, Project, ScanRun,
    ScanStatus, ScoreSummary, Scores,
};
pub use error::{CourseQaError, Result};
pub use fs::{FileSystem, StdFileSystem};
pub use history::{RunComparison, RunWithScore, ScoreDelta, compare_runs};
pub use package::{CoursePackage, ScratchSpace};
pub use reliability::{AuditorConfig, OpenAiAuditor, ReliabilityAuditor, ReliabilityScanner};
pub use report::{
    FixReport, PackageReport, PackageStatus, format_delta, render_fix_markdown,
    render_history_markdown, render_json, render_scan_markdown,
};
pub use scanner::{QualityScanner, ScanOutcome};
pub use scoring::{ScoreComputation, ScoreMeta, compute_quality_score};
pub use service::{
    FixRunResult, IssuePage, QaService, ScanReport, ScanSnapshot, StoredArtifact, VpatDraft,
};
pub use store::{IssueFilter, LocalObjectStorage, MemoryStore, ObjectStorage, QaStore};
pub use vpat::{Conformance, determine_conformance, render_vpat};

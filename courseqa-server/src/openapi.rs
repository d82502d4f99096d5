//! OpenAPI specification for the courseqa server.

use utoipa::OpenApi;

use courseqa_core::scoring::{CategoryStat, ScoreWeights, SeverityPenalties};
use courseqa_core::{
    Asset, AssetKind, FixCounts, FixRunResult, Issue, IssueCategory, IssueSeverity, Project,
    RunComparison, RunWithScore, ScanReport, ScanRun, ScanSnapshot, ScanStatus, ScoreDelta,
    ScoreMeta, ScoreSummary,
};

use crate::routes::{
    ActionFailure, AssetResponse, CreateProjectRequest, ErrorResponse, FixResponse, IssueFilters,
    IssuesResponse, ProjectResponse, ProjectView, ScanResponse, ScanRunsResponse, VpatResponse,
};

#[derive(OpenApi)]
#[openapi(
    servers((url = "/api")),
    paths(
        crate::routes::create_project,
        crate::routes::get_project,
        crate::routes::upload_package,
        crate::routes::download_asset,
        crate::routes::start_scan,
        crate::routes::start_rescan,
        crate::routes::scan_snapshot,
        crate::routes::list_issues,
        crate::routes::run_fix,
        crate::routes::download_fix,
        crate::routes::scan_runs,
        crate::routes::compare_runs,
        crate::routes::create_vpat,
        crate::routes::download_vpat,
        crate::routes::openapi_json
    ),
    components(
        schemas(
            ErrorResponse,
            ActionFailure,
            CreateProjectRequest,
            ProjectResponse,
            ProjectView,
            AssetResponse,
            ScanResponse,
            FixResponse,
            VpatResponse,
            IssueFilters,
            IssuesResponse,
            ScanRunsResponse,
            Project,
            Asset,
            AssetKind,
            ScanRun,
            ScanStatus,
            Issue,
            IssueCategory,
            IssueSeverity,
            ScoreSummary,
            ScoreMeta,
            CategoryStat,
            ScoreWeights,
            SeverityPenalties,
            ScanReport,
            ScanSnapshot,
            RunWithScore,
            RunComparison,
            ScoreDelta,
            FixCounts,
            FixRunResult
        )
    ),
    tags(
        (name = "projects", description = "Projects and package uploads"),
        (name = "assets", description = "Stored assets"),
        (name = "scans", description = "QA scans and findings"),
        (name = "fixes", description = "Auto-fix artifacts"),
        (name = "history", description = "Run history and comparison"),
        (name = "vpat", description = "VPAT drafts"),
        (name = "system", description = "System endpoints")
    )
)]
/// OpenAPI specification for the courseqa server.
pub struct ApiDoc;

//! HTTP handlers for the courseqa server.

use actix_web::error::BlockingError;
use actix_web::http::{StatusCode, header};
use actix_web::{HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use courseqa_core::{
    Asset, CourseQaError, FixRunResult, Issue, IssueCategory, IssueFilter, IssueSeverity, Project,
    QaService, QaStore, Result, ScanReport, ScanRun, ScoreSummary, StoredArtifact,
};

use crate::openapi::ApiDoc;

/// Largest accepted package upload.
pub const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

#[derive(Clone)]
/// Shared application state for handlers.
pub struct AppState {
    /// Project-scoped QA operations.
    pub service: QaService,
}

/// Register every route and the upload size limit.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
        .service(create_project)
        .service(get_project)
        .service(upload_package)
        .service(download_asset)
        .service(start_scan)
        .service(start_rescan)
        .service(scan_snapshot)
        .service(list_issues)
        .service(run_fix)
        .service(download_fix)
        .service(scan_runs)
        .service(compare_runs)
        .service(create_vpat)
        .service(download_vpat)
        .service(openapi_json);
}

/// Error payload returned by API endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Failure payload of action endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActionFailure {
    /// Always `false`.
    pub ok: bool,
    /// Error message.
    pub error: String,
}

impl ActionFailure {
    fn new(err: &CourseQaError) -> Self {
        Self {
            ok: false,
            error: err.to_string(),
        }
    }
}

/// Project creation payload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    /// Display title.
    #[serde(default)]
    pub title: String,
}

/// A single project.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProjectResponse {
    /// The project.
    pub project: Project,
}

/// A project with its assets and latest run.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    /// The project.
    pub project: Project,
    /// Stored assets, oldest first.
    pub assets: Vec<Asset>,
    /// The newest scan run.
    pub latest_scan_run: Option<ScanRun>,
    /// Score of the newest scan run.
    pub latest_score: Option<ScoreSummary>,
}

/// A registered upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssetResponse {
    /// The stored asset.
    pub asset: Asset,
}

/// A finished scan.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanResponse {
    /// Always `true`.
    pub ok: bool,
    /// Run, findings and score.
    #[serde(flatten)]
    pub report: ScanReport,
    /// Set by the rescan endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescan: Option<bool>,
}

/// A finished auto-fix.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FixResponse {
    /// Always `true`.
    pub ok: bool,
    /// Stored artifacts and fix counts.
    #[serde(flatten)]
    pub result: FixRunResult,
}

/// A generated VPAT draft.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VpatResponse {
    /// Always `true`.
    pub ok: bool,
    /// Stored name of the draft.
    pub file_name: String,
    /// Download path of the draft.
    pub download_url: String,
}

/// Selects a scan run; the latest run when absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRunQuery {
    /// Run identifier.
    pub scan_run_id: Option<String>,
}

impl ScanRunQuery {
    fn run_id(&self) -> Option<String> {
        self.scan_run_id
            .clone()
            .filter(|value| !value.trim().is_empty())
    }
}

/// Issue listing query. Unknown categories and severities are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuesQuery {
    /// Restrict to one run.
    pub scan_run_id: Option<String>,
    /// Category name.
    pub category: Option<String>,
    /// Severity name.
    pub severity: Option<String>,
    /// Text search over title, detail and rule key.
    pub q: Option<String>,
    /// Page size.
    pub limit: Option<String>,
    /// Page start.
    pub offset: Option<String>,
}

impl IssuesQuery {
    fn filter(&self, project_id: &str) -> IssueFilter {
        let number = |raw: &Option<String>| raw.as_deref().and_then(|value| value.trim().parse::<i64>().ok());
        let mut filter =
            IssueFilter::new(project_id).with_page(number(&self.limit), number(&self.offset));
        filter.scan_run_id = self
            .scan_run_id
            .clone()
            .filter(|value| !value.trim().is_empty());
        filter.category = self
            .category
            .as_deref()
            .and_then(|value| value.parse::<IssueCategory>().ok());
        filter.severity = self
            .severity
            .as_deref()
            .and_then(|value| value.parse::<IssueSeverity>().ok());
        filter.query = self.q.clone();
        filter
    }
}

/// Filters echoed back with an issue page.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueFilters {
    /// Applied run filter.
    pub scan_run_id: Option<String>,
    /// Applied category filter.
    pub category: Option<IssueCategory>,
    /// Applied severity filter.
    pub severity: Option<IssueSeverity>,
    /// Raw text query.
    pub q: String,
}

/// One page of issues.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IssuesResponse {
    /// The page.
    pub issues: Vec<Issue>,
    /// Matches across all pages.
    pub total: u64,
    /// Effective page size.
    pub limit: u32,
    /// Effective page start.
    pub offset: u32,
    /// Applied filters.
    pub filters: IssueFilters,
}

/// Scan history of a project.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanRunsResponse {
    /// Runs with their scores, newest first.
    pub runs: Vec<courseqa_core::RunWithScore>,
    /// Number of runs.
    pub total: usize,
}

/// Artifact download query.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    /// Must be present and non-empty.
    pub download: Option<String>,
    /// Stored artifact name.
    pub file: Option<String>,
}

impl DownloadQuery {
    fn file_name(&self) -> std::result::Result<String, HttpResponse> {
        if self.download.as_deref().is_none_or(str::is_empty) {
            return Err(bad_request("download query is required"));
        }
        self.file
            .clone()
            .filter(|file| !file.is_empty())
            .ok_or_else(|| bad_request("file query is required"))
    }
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: message.to_string(),
    })
}

fn status_for(err: &CourseQaError) -> StatusCode {
    match err {
        CourseQaError::NotFound(_) => StatusCode::NOT_FOUND,
        CourseQaError::Precondition(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &CourseQaError) -> HttpResponse {
    HttpResponse::build(status_for(err)).json(ErrorResponse {
        error: err.to_string(),
    })
}

fn task_failed(err: BlockingError) -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        error: format!("task failed: {err}"),
    })
}

fn attachment(artifact: StoredArtifact) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(artifact.content_type)
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.file_name),
        ))
        .body(artifact.bytes)
}

#[utoipa::path(
    post,
    path = "/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Missing title", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[post("/api/projects")]
/// Create a project.
pub async fn create_project(
    state: web::Data<AppState>,
    payload: web::Json<CreateProjectRequest>,
) -> impl Responder {
    let service = state.service.clone();
    let title = payload.into_inner().title;
    let result = web::block(move || service.create_project(&title)).await;

    match result {
        Ok(Ok(project)) => HttpResponse::Created().json(ProjectResponse { project }),
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    params(
        ("id" = String, Path, description = "Project identifier")
    ),
    responses(
        (status = 200, description = "Project with assets and latest run", body = ProjectView),
        (status = 404, description = "Unknown project", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[get("/api/projects/{id}")]
/// Fetch a project with its assets and latest run.
pub async fn get_project(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let project_id = path.into_inner();
    let service = state.service.clone();
    let result = web::block(move || -> Result<ProjectView> {
        let project = service.require_project(&project_id)?;
        let store = service.store();
        let assets = store.list_assets(&project_id)?;
        let latest_scan_run = store.latest_scan_run(&project_id)?;
        let latest_score = match &latest_scan_run {
            Some(run) => store.get_score_summary(&run.id)?,
            None => None,
        };
        Ok(ProjectView {
            project,
            assets,
            latest_scan_run,
            latest_score,
        })
    })
    .await;

    match result {
        Ok(Ok(view)) => HttpResponse::Ok().json(view),
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    post,
    path = "/projects/{id}/packages",
    params(
        ("id" = String, Path, description = "Project identifier")
    ),
    request_body(content = Vec<u8>, description = "Course package archive", content_type = "application/zip"),
    responses(
        (status = 201, description = "Package stored", body = AssetResponse),
        (status = 400, description = "Not a zip archive", body = ErrorResponse),
        (status = 404, description = "Unknown project", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[post("/api/projects/{id}/packages")]
/// Upload a course package archive.
pub async fn upload_package(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> impl Responder {
    let project_id = path.into_inner();
    let service = state.service.clone();
    let result = web::block(move || service.upload_package(&project_id, body.to_vec())).await;

    match result {
        Ok(Ok(asset)) => HttpResponse::Created().json(AssetResponse { asset }),
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    get,
    path = "/assets/{id}",
    params(
        ("id" = String, Path, description = "Asset identifier")
    ),
    responses(
        (status = 200, description = "Asset contents", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown asset", body = ErrorResponse)
    ),
    tag = "assets"
)]
#[get("/api/assets/{id}")]
/// Download a stored asset.
pub async fn download_asset(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let asset_id = path.into_inner();
    let service = state.service.clone();
    let result = web::block(move || service.read_asset(&asset_id)).await;

    match result {
        Ok(Ok((asset, bytes))) => HttpResponse::Ok()
            .content_type(asset.mime_type)
            .insert_header((header::CACHE_CONTROL, "public, max-age=31536000, immutable"))
            .body(bytes),
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

async fn execute_scan(state: web::Data<AppState>, project_id: String, rescan: bool) -> HttpResponse {
    let service = state.service.clone();
    let result = web::block(move || {
        service
            .require_project(&project_id)
            .map(|_| service.execute_scan(&project_id))
    })
    .await;

    match result {
        Ok(Ok(Ok(report))) => HttpResponse::Ok().json(ScanResponse {
            ok: true,
            report,
            rescan: rescan.then_some(true),
        }),
        Ok(Ok(Err(err))) => HttpResponse::InternalServerError().json(ActionFailure::new(&err)),
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    post,
    path = "/projects/{id}/scan",
    params(
        ("id" = String, Path, description = "Project identifier")
    ),
    responses(
        (status = 200, description = "Scan completed", body = ScanResponse),
        (status = 404, description = "Unknown project", body = ErrorResponse),
        (status = 500, description = "Scan failed", body = ActionFailure)
    ),
    tag = "scans"
)]
#[post("/api/projects/{id}/scan")]
/// Run a QA scan over the latest package.
pub async fn start_scan(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    execute_scan(state, path.into_inner(), false).await
}

#[utoipa::path(
    post,
    path = "/projects/{id}/rescan",
    params(
        ("id" = String, Path, description = "Project identifier")
    ),
    responses(
        (status = 200, description = "Rescan completed", body = ScanResponse),
        (status = 404, description = "Unknown project", body = ErrorResponse),
        (status = 500, description = "Rescan failed", body = ActionFailure)
    ),
    tag = "scans"
)]
#[post("/api/projects/{id}/rescan")]
/// Run a fresh scan, typically after an auto-fix.
pub async fn start_rescan(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    execute_scan(state, path.into_inner(), true).await
}

#[utoipa::path(
    get,
    path = "/projects/{id}/scan",
    params(
        ("id" = String, Path, description = "Project identifier"),
        ("scanRunId" = Option<String>, Query, description = "Run to load; the latest when absent")
    ),
    responses(
        (status = 200, description = "Run with findings and score", body = courseqa_core::ScanSnapshot),
        (status = 400, description = "Run belongs to another project", body = ErrorResponse),
        (status = 404, description = "Unknown project", body = ErrorResponse)
    ),
    tag = "scans"
)]
#[get("/api/projects/{id}/scan")]
/// Fetch a scan run with its findings.
pub async fn scan_snapshot(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ScanRunQuery>,
) -> impl Responder {
    let project_id = path.into_inner();
    let run_id = query.run_id();
    let service = state.service.clone();
    let result =
        web::block(move || service.scan_snapshot(&project_id, run_id.as_deref())).await;

    match result {
        Ok(Ok(snapshot)) => HttpResponse::Ok().json(snapshot),
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    get,
    path = "/projects/{id}/issues",
    params(
        ("id" = String, Path, description = "Project identifier"),
        ("scanRunId" = Option<String>, Query, description = "Restrict to one run"),
        ("category" = Option<String>, Query, description = "accessibility, scorm or reliability"),
        ("severity" = Option<String>, Query, description = "critical, high, medium or low"),
        ("q" = Option<String>, Query, description = "Text search"),
        ("limit" = Option<i64>, Query, description = "Page size, 1 to 200"),
        ("offset" = Option<i64>, Query, description = "Page start")
    ),
    responses(
        (status = 200, description = "Filtered issues", body = IssuesResponse),
        (status = 404, description = "Unknown project", body = ErrorResponse)
    ),
    tag = "scans"
)]
#[get("/api/projects/{id}/issues")]
/// List issues with filters and pagination.
pub async fn list_issues(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<IssuesQuery>,
) -> impl Responder {
    let project_id = path.into_inner();
    let filter = query.filter(&project_id);
    let filters = IssueFilters {
        scan_run_id: filter.scan_run_id.clone(),
        category: filter.category,
        severity: filter.severity,
        q: query.q.clone().unwrap_or_default(),
    };
    let service = state.service.clone();
    let result = web::block(move || service.list_issues(&filter)).await;

    match result {
        Ok(Ok(page)) => HttpResponse::Ok().json(IssuesResponse {
            issues: page.issues,
            total: page.total,
            limit: page.limit,
            offset: page.offset,
            filters,
        }),
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    post,
    path = "/projects/{id}/fix",
    params(
        ("id" = String, Path, description = "Project identifier")
    ),
    responses(
        (status = 200, description = "Fixed archive and diff stored", body = FixResponse),
        (status = 400, description = "Nothing to fix", body = ActionFailure),
        (status = 404, description = "Unknown project", body = ErrorResponse),
        (status = 500, description = "Auto-fix failed", body = ActionFailure)
    ),
    tag = "fixes"
)]
#[post("/api/projects/{id}/fix")]
/// Apply the auto-fix rules to the latest package.
pub async fn run_fix(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let project_id = path.into_inner();
    let service = state.service.clone();
    let result = web::block(move || {
        service
            .require_project(&project_id)
            .map(|_| service.run_auto_fix(&project_id))
    })
    .await;

    match result {
        Ok(Ok(Ok(result))) => HttpResponse::Ok().json(FixResponse { ok: true, result }),
        Ok(Ok(Err(err))) if err.is_client_error() => {
            HttpResponse::BadRequest().json(ActionFailure::new(&err))
        }
        Ok(Ok(Err(err))) => {
            log::error!("auto-fix failed: {err}");
            HttpResponse::InternalServerError().json(ActionFailure::new(&err))
        }
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    get,
    path = "/projects/{id}/fix",
    params(
        ("id" = String, Path, description = "Project identifier"),
        ("download" = String, Query, description = "Must be set"),
        ("file" = String, Query, description = "Stored artifact name")
    ),
    responses(
        (status = 200, description = "Artifact contents", content_type = "application/octet-stream"),
        (status = 400, description = "Missing query", body = ErrorResponse),
        (status = 404, description = "Unknown project or artifact", body = ErrorResponse)
    ),
    tag = "fixes"
)]
#[get("/api/projects/{id}/fix")]
/// Download a fixed archive or its diff.
pub async fn download_fix(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DownloadQuery>,
) -> impl Responder {
    download_artifact(state, path.into_inner(), &query, |service, project_id, file| {
        service.resolve_fix_artifact(project_id, file)
    })
    .await
}

async fn download_artifact(
    state: web::Data<AppState>,
    project_id: String,
    query: &DownloadQuery,
    read: fn(&QaService, &str, &str) -> Result<StoredArtifact>,
) -> HttpResponse {
    let service = state.service.clone();
    let project_check = service.clone();
    let lookup_id = project_id.clone();
    match web::block(move || project_check.require_project(&lookup_id)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => return error_response(&err),
        Err(err) => return task_failed(err),
    }
    let file = match query.file_name() {
        Ok(file) => file,
        Err(response) => return response,
    };
    let result = web::block(move || read(&service, &project_id, &file)).await;

    match result {
        Ok(Ok(artifact)) => attachment(artifact),
        Ok(Err(err)) => HttpResponse::NotFound().json(ErrorResponse {
            error: err.to_string(),
        }),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    get,
    path = "/projects/{id}/scan-runs",
    params(
        ("id" = String, Path, description = "Project identifier")
    ),
    responses(
        (status = 200, description = "Runs with scores", body = ScanRunsResponse),
        (status = 404, description = "Unknown project", body = ErrorResponse)
    ),
    tag = "history"
)]
#[get("/api/projects/{id}/scan-runs")]
/// List every scan run of a project with its score.
pub async fn scan_runs(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let project_id = path.into_inner();
    let service = state.service.clone();
    let result = web::block(move || service.scan_history(&project_id)).await;

    match result {
        Ok(Ok(runs)) => HttpResponse::Ok().json(ScanRunsResponse {
            total: runs.len(),
            runs,
        }),
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    get,
    path = "/projects/{id}/compare",
    params(
        ("id" = String, Path, description = "Project identifier"),
        ("scanRunId" = Option<String>, Query, description = "Active run; the latest when absent")
    ),
    responses(
        (status = 200, description = "Active run against the previous scored run", body = courseqa_core::RunComparison),
        (status = 404, description = "Unknown project", body = ErrorResponse)
    ),
    tag = "history"
)]
#[get("/api/projects/{id}/compare")]
/// Compare a run against the previous scored run.
pub async fn compare_runs(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ScanRunQuery>,
) -> impl Responder {
    let project_id = path.into_inner();
    let run_id = query.run_id();
    let service = state.service.clone();
    let result = web::block(move || service.compare(&project_id, run_id.as_deref())).await;

    match result {
        Ok(Ok(comparison)) => HttpResponse::Ok().json(comparison),
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    post,
    path = "/projects/{id}/vpat",
    params(
        ("id" = String, Path, description = "Project identifier")
    ),
    responses(
        (status = 200, description = "Draft stored", body = VpatResponse),
        (status = 400, description = "No scored run", body = ActionFailure),
        (status = 404, description = "Unknown project", body = ErrorResponse)
    ),
    tag = "vpat"
)]
#[post("/api/projects/{id}/vpat")]
/// Generate a VPAT draft from the latest scan.
pub async fn create_vpat(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let project_id = path.into_inner();
    let service = state.service.clone();
    let result = web::block(move || {
        service
            .require_project(&project_id)
            .map(|_| service.generate_vpat(&project_id))
    })
    .await;

    match result {
        Ok(Ok(Ok(draft))) => HttpResponse::Ok().json(VpatResponse {
            ok: true,
            file_name: draft.file_name,
            download_url: draft.download_url,
        }),
        Ok(Ok(Err(err))) => {
            HttpResponse::build(status_for(&err)).json(ActionFailure::new(&err))
        }
        Ok(Err(err)) => error_response(&err),
        Err(err) => task_failed(err),
    }
}

#[utoipa::path(
    get,
    path = "/projects/{id}/vpat",
    params(
        ("id" = String, Path, description = "Project identifier"),
        ("download" = String, Query, description = "Must be set"),
        ("file" = String, Query, description = "Stored draft name")
    ),
    responses(
        (status = 200, description = "Draft contents", content_type = "text/markdown"),
        (status = 400, description = "Missing query", body = ErrorResponse),
        (status = 404, description = "Unknown project or draft", body = ErrorResponse)
    ),
    tag = "vpat"
)]
#[get("/api/projects/{id}/vpat")]
/// Download a stored VPAT draft.
pub async fn download_vpat(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DownloadQuery>,
) -> impl Responder {
    download_artifact(state, path.into_inner(), &query, |service, project_id, file| {
        service.read_vpat(project_id, file)
    })
    .await
}

#[utoipa::path(
    get,
    path = "/openapi.json",
    responses(
        (status = 200, description = "OpenAPI document", body = serde_json::Value)
    ),
    tag = "system"
)]
#[get("/api/openapi.json")]
/// Serve the OpenAPI document.
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

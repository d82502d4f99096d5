//! SQLite-backed [`QaStore`].

use std::sync::OnceLock;

use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

use courseqa_core::domain::{NewAsset, NewIssue};
use courseqa_core::{
    Asset, CourseQaError, Issue, IssueFilter, Project, QaStore, Result, ScanRun, ScanStatus,
    ScoreSummary, Scores,
};

use crate::db::{DbPool, run_migrations};
use crate::models::{AssetRow, IssueRow, ProjectRow, ScanRunRow, ScoreSummaryRow};
use crate::schema::{assets, issues, projects, scan_runs, score_summaries};

type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

fn store_err(err: impl std::fmt::Display) -> CourseQaError {
    CourseQaError::Store(err.to_string())
}

/// Relational store on a pooled SQLite database.
pub struct DieselStore {
    pool: DbPool,
    schema_ready: OnceLock<()>,
}

impl DieselStore {
    /// Wrap a pool. Call [`QaStore::ensure_schema`] before use.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            schema_ready: OnceLock::new(),
        }
    }

    fn conn(&self) -> Result<Conn> {
        self.pool.get().map_err(store_err)
    }

    fn filtered<'a>(filter: &'a IssueFilter) -> issues::BoxedQuery<'a, diesel::sqlite::Sqlite> {
        let mut query = issues::table
            .filter(issues::project_id.eq(&filter.project_id))
            .into_boxed();
        if let Some(run) = filter.scan_run_id.as_deref() {
            query = query.filter(issues::scan_run_id.eq(run));
        }
        if let Some(category) = filter.category {
            query = query.filter(issues::category.eq(category.as_str()));
        }
        if let Some(severity) = filter.severity {
            query = query.filter(issues::severity.eq(severity.as_str()));
        }
        if let Some(text) = filter.query_text() {
            // SQLite LIKE is case-insensitive for ASCII.
            let pattern = format!("%{}%", escape_like(text));
            query = query.filter(
                issues::title
                    .like(pattern.clone())
                    .escape('\\')
                    .or(issues::detail.like(pattern.clone()).escape('\\'))
                    .or(issues::rule_key.like(pattern).escape('\\')),
            );
        }
        query
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl QaStore for DieselStore {
    fn ensure_schema(&self) -> Result<()> {
        if self.schema_ready.get().is_some() {
            return Ok(());
        }
        run_migrations(&self.pool)?;
        let _ = self.schema_ready.set(());
        log::info!("database schema is up to date");
        Ok(())
    }

    fn create_project(&self, title: &str) -> Result<Project> {
        let row = ProjectRow {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: Utc::now().naive_utc(),
        };
        diesel::insert_into(projects::table)
            .values(&row)
            .execute(&mut self.conn()?)
            .map_err(store_err)?;
        Ok(row.into())
    }

    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let row = projects::table
            .find(id)
            .select(ProjectRow::as_select())
            .first(&mut self.conn()?)
            .optional()
            .map_err(store_err)?;
        Ok(row.map(Project::from))
    }

    fn list_assets(&self, project_id: &str) -> Result<Vec<Asset>> {
        assets::table
            .filter(assets::project_id.eq(project_id))
            .order(assets::created_at.asc())
            .select(AssetRow::as_select())
            .load(&mut self.conn()?)
            .map_err(store_err)?
            .into_iter()
            .map(Asset::try_from)
            .collect()
    }

    fn add_asset(&self, asset: NewAsset) -> Result<Asset> {
        let row = AssetRow {
            id: Uuid::new_v4().to_string(),
            project_id: asset.project_id,
            kind: asset.kind.as_str().to_string(),
            file_path: asset.file_path,
            mime_type: asset.mime_type,
            created_at: Utc::now().naive_utc(),
        };
        diesel::insert_into(assets::table)
            .values(&row)
            .execute(&mut self.conn()?)
            .map_err(store_err)?;
        Asset::try_from(row)
    }

    fn get_asset(&self, id: &str) -> Result<Option<Asset>> {
        assets::table
            .find(id)
            .select(AssetRow::as_select())
            .first(&mut self.conn()?)
            .optional()
            .map_err(store_err)?
            .map(Asset::try_from)
            .transpose()
    }

    fn create_scan_run(&self, project_id: &str) -> Result<ScanRun> {
        let run = ScanRun {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            status: ScanStatus::Queued,
            started_at: None,
            finished_at: None,
            error_text: None,
            created_at: Utc::now(),
        };
        diesel::insert_into(scan_runs::table)
            .values(ScanRunRow::from(&run))
            .execute(&mut self.conn()?)
            .map_err(store_err)?;
        Ok(run)
    }

    fn update_scan_run_status(
        &self,
        id: &str,
        status: ScanStatus,
        error_text: Option<String>,
    ) -> Result<ScanRun> {
        let mut conn = self.conn()?;
        let row = scan_runs::table
            .find(id)
            .select(ScanRunRow::as_select())
            .first(&mut conn)
            .optional()
            .map_err(store_err)?
            .ok_or_else(|| CourseQaError::NotFound(format!("Scan run not found: {id}")))?;
        let mut run = ScanRun::try_from(row)?;
        run.transition(status, error_text, Utc::now());

        let ScanRunRow {
            status,
            started_at,
            finished_at,
            error_text,
            ..
        } = ScanRunRow::from(&run);
        diesel::update(scan_runs::table.find(id))
            .set((
                scan_runs::status.eq(status),
                scan_runs::started_at.eq(started_at),
                scan_runs::finished_at.eq(finished_at),
                scan_runs::error_text.eq(error_text),
            ))
            .execute(&mut conn)
            .map_err(store_err)?;
        Ok(run)
    }

    fn fail_if_active(&self, id: &str, error_text: String) -> Result<Option<ScanRun>> {
        let active = [ScanStatus::Queued.as_str(), ScanStatus::Running.as_str()];
        let mut conn = self.conn()?;
        let updated = diesel::update(
            scan_runs::table
                .find(id)
                .filter(scan_runs::status.eq_any(active)),
        )
        .set((
            scan_runs::status.eq(ScanStatus::Failed.as_str()),
            scan_runs::finished_at.eq(Some(Utc::now().naive_utc())),
            scan_runs::error_text.eq(Some(error_text)),
        ))
        .execute(&mut conn)
        .map_err(store_err)?;
        if updated == 0 {
            return Ok(None);
        }
        scan_runs::table
            .find(id)
            .select(ScanRunRow::as_select())
            .first(&mut conn)
            .optional()
            .map_err(store_err)?
            .map(ScanRun::try_from)
            .transpose()
    }

    fn get_scan_run(&self, id: &str) -> Result<Option<ScanRun>> {
        scan_runs::table
            .find(id)
            .select(ScanRunRow::as_select())
            .first(&mut self.conn()?)
            .optional()
            .map_err(store_err)?
            .map(ScanRun::try_from)
            .transpose()
    }

    fn latest_scan_run(&self, project_id: &str) -> Result<Option<ScanRun>> {
        scan_runs::table
            .filter(scan_runs::project_id.eq(project_id))
            .order(scan_runs::created_at.desc())
            .select(ScanRunRow::as_select())
            .first(&mut self.conn()?)
            .optional()
            .map_err(store_err)?
            .map(ScanRun::try_from)
            .transpose()
    }

    fn list_scan_runs(&self, project_id: &str) -> Result<Vec<ScanRun>> {
        scan_runs::table
            .filter(scan_runs::project_id.eq(project_id))
            .order(scan_runs::created_at.desc())
            .select(ScanRunRow::as_select())
            .load(&mut self.conn()?)
            .map_err(store_err)?
            .into_iter()
            .map(ScanRun::try_from)
            .collect()
    }

    fn add_issue(&self, issue: NewIssue) -> Result<Issue> {
        let issue = Issue::from_draft(
            Uuid::new_v4().to_string(),
            &issue.scan_run_id,
            &issue.project_id,
            issue.draft,
            Utc::now(),
        );
        diesel::insert_into(issues::table)
            .values(IssueRow::from(&issue))
            .execute(&mut self.conn()?)
            .map_err(store_err)?;
        Ok(issue)
    }

    fn clear_issues_for_run(&self, scan_run_id: &str) -> Result<()> {
        diesel::delete(issues::table.filter(issues::scan_run_id.eq(scan_run_id)))
            .execute(&mut self.conn()?)
            .map_err(store_err)?;
        Ok(())
    }

    fn list_issues_for_run(&self, scan_run_id: &str) -> Result<Vec<Issue>> {
        issues::table
            .filter(issues::scan_run_id.eq(scan_run_id))
            .order((issues::severity_rank.desc(), issues::created_at.asc()))
            .select(IssueRow::as_select())
            .load(&mut self.conn()?)
            .map_err(store_err)?
            .into_iter()
            .map(Issue::try_from)
            .collect()
    }

    fn list_issues_filtered(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        Self::filtered(filter)
            .order((issues::severity_rank.desc(), issues::created_at.desc()))
            .limit(i64::from(filter.limit()))
            .offset(i64::from(filter.offset()))
            .select(IssueRow::as_select())
            .load(&mut self.conn()?)
            .map_err(store_err)?
            .into_iter()
            .map(Issue::try_from)
            .collect()
    }

    fn count_issues_filtered(&self, filter: &IssueFilter) -> Result<u64> {
        let total: i64 = Self::filtered(filter)
            .count()
            .get_result(&mut self.conn()?)
            .map_err(store_err)?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    fn upsert_score_summary(
        &self,
        project_id: &str,
        scan_run_id: &str,
        scores: Scores,
    ) -> Result<ScoreSummary> {
        let row = ScoreSummaryRow {
            scan_run_id: scan_run_id.to_string(),
            project_id: project_id.to_string(),
            total_score: i32::from(scores.total_score),
            accessibility_score: i32::from(scores.accessibility_score),
            scorm_score: i32::from(scores.scorm_score),
            reliability_score: i32::from(scores.reliability_score),
            created_at: Utc::now().naive_utc(),
        };
        diesel::insert_into(score_summaries::table)
            .values(&row)
            .on_conflict(score_summaries::scan_run_id)
            .do_update()
            .set(&row)
            .execute(&mut self.conn()?)
            .map_err(store_err)?;
        Ok(row.into())
    }

    fn get_score_summary(&self, scan_run_id: &str) -> Result<Option<ScoreSummary>> {
        let row = score_summaries::table
            .find(scan_run_id)
            .select(ScoreSummaryRow::as_select())
            .first(&mut self.conn()?)
            .optional()
            .map_err(store_err)?;
        Ok(row.map(ScoreSummary::from))
    }
}

//! Diesel schema definitions for the courseqa server.

diesel::table! {
    projects (id) {
        id -> Text,
        title -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    assets (id) {
        id -> Text,
        project_id -> Text,
        kind -> Text,
        file_path -> Text,
        mime_type -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    scan_runs (id) {
        id -> Text,
        project_id -> Text,
        status -> Text,
        started_at -> Nullable<Timestamp>,
        finished_at -> Nullable<Timestamp>,
        error_text -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    issues (id) {
        id -> Text,
        scan_run_id -> Text,
        project_id -> Text,
        category -> Text,
        severity -> Text,
        severity_rank -> Integer,
        rule_key -> Text,
        title -> Text,
        detail -> Text,
        evidence -> Nullable<Text>,
        file_path -> Nullable<Text>,
        line_no -> Nullable<Integer>,
        selector -> Nullable<Text>,
        fix_suggestion -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    score_summaries (scan_run_id) {
        scan_run_id -> Text,
        project_id -> Text,
        total_score -> Integer,
        accessibility_score -> Integer,
        scorm_score -> Integer,
        reliability_score -> Integer,
        created_at -> Timestamp,
    }
}

diesel::joinable!(assets -> projects (project_id));
diesel::joinable!(scan_runs -> projects (project_id));
diesel::joinable!(issues -> scan_runs (scan_run_id));
diesel::joinable!(score_summaries -> scan_runs (scan_run_id));

diesel::allow_tables_to_appear_in_same_query!(projects, assets, scan_runs, issues, score_summaries);

#![deny(missing_docs)]
//! courseqa server executable.
//!
//! Hosts HTTP endpoints for course package uploads, QA scans, auto-fix
//! artifacts, run history and VPAT drafts.

mod db;
mod models;
mod openapi;
mod repo;
mod routes;
mod schema;

#[cfg(not(test))]
use std::str::FromStr;
#[cfg(not(test))]
use std::sync::Arc;

#[cfg(not(test))]
use actix_cors::Cors;
#[cfg(not(test))]
use actix_web::{App, HttpServer, http::header, web};
#[cfg(not(test))]
use dotenvy::dotenv;

#[cfg(not(test))]
use courseqa_core::{
    AutoFixer, LocalObjectStorage, MemoryStore, QaService, QaStore, QualityScanner, ScanConfig,
};

#[cfg(not(test))]
use crate::db::init_pool;
#[cfg(not(test))]
use crate::repo::DieselStore;
#[cfg(not(test))]
use crate::routes::{AppState, configure};

#[cfg(not(test))]
fn open_store() -> courseqa_core::Result<Arc<dyn QaStore>> {
    let backend = std::env::var("COURSEQA_DB_BACKEND").unwrap_or_else(|_| "sqlite".to_string());
    let store: Arc<dyn QaStore> = match backend.trim().to_ascii_lowercase().as_str() {
        "memory" => Arc::new(MemoryStore::new()),
        "" | "sqlite" => Arc::new(DieselStore::new(init_pool()?)),
        other => {
            return Err(courseqa_core::CourseQaError::Other(format!(
                "unsupported COURSEQA_DB_BACKEND value: {other}"
            )));
        }
    };
    store.ensure_schema()?;
    log::info!("using {backend} record store");
    Ok(store)
}

#[cfg(not(test))]
fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let store = open_store().map_err(std::io::Error::other)?;
    let config = ScanConfig::from_env().map_err(std::io::Error::other)?;

    // Build blocking HTTP clients before the Actix runtime starts;
    // creating them inside it panics.
    let scanner = QualityScanner::from_config(&config);
    if config.auditor.is_none() {
        log::warn!("OPENAI_API_KEY is not set; reliability audits will be skipped");
    }
    let service = QaService::new(
        store,
        Arc::new(LocalObjectStorage::from_env()),
        scanner,
        AutoFixer::new(config.scratch.clone()),
    );
    let state = web::Data::new(AppState { service });

    let ui_origin =
        std::env::var("COURSEQA_UI_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let allowed_origins: Vec<String> = ui_origin
        .split(',')
        .map(|value| value.trim())
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect();

    let listen_addr = std::env::var("COURSEQA_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let listen_port =
        u16::from_str(&std::env::var("COURSEQA_PORT").unwrap_or_else(|_| "8080".to_string()))
            .map_err(|err| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("COURSEQA_PORT must be a u16 number: {err}"),
                )
            })?;
    log::info!("listening on {listen_addr}:{listen_port}");

    // Manually start the Actix system
    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            let mut cors = Cors::default()
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::CONTENT_TYPE])
                .expose_headers(vec![header::CONTENT_DISPOSITION])
                .max_age(3600);
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            App::new()
                .wrap(actix_web::middleware::Logger::default())
                .wrap(cors)
                .app_data(state.clone())
                .configure(configure)
        })
        .bind((listen_addr, listen_port))?
        .run()
        .await
    })
}

#[cfg(test)]
fn main() {}

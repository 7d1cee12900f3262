use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use actix_web::{web, HttpResponse, Result};
use log::info;

use crate::api::{AppState, HealthResponse, Job, JobCreatedResponse, JobOutcome, JobStatusResponse, SlotsResponse};
use crate::assembler::{spawn_build, BuildCommand};
use crate::errors::PackError;
use crate::logging::{FacadeSink, LogSink, MemorySink, TeeSink};
use crate::template::TemplateKind;
use crate::utils::create_pack_archive;

static START_TIME: std::sync::OnceLock<SystemTime> = std::sync::OnceLock::new();

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .route("/templates/{kind}/slots", web::get().to(template_slots))
            .route("/packs", web::post().to(create_pack))
            .route("/packs/{id}", web::get().to(pack_status))
            .route("/packs/{id}/cancel", web::post().to(cancel_pack))
            .route("/packs/{id}/archive", web::get().to(pack_archive)),
    );
}

pub fn init_start_time() {
    START_TIME.set(SystemTime::now()).ok();
}

async fn health_check() -> Result<HttpResponse> {
    let now = SystemTime::now();
    let start_time = START_TIME.get().unwrap_or(&now);
    let uptime = SystemTime::now()
        .duration_since(*start_time)
        .unwrap_or_default()
        .as_secs();

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
    }))
}

async fn template_slots(state: web::Data<AppState>, kind: web::Path<String>) -> Result<HttpResponse, PackError> {
    let kind = TemplateKind::parse(&kind)
        .ok_or_else(|| PackError::InvalidCommand(format!("unknown template kind \"{}\"", kind)))?;
    let manifest = state.assembler.resolver().load_template(kind)?;

    Ok(HttpResponse::Ok().json(SlotsResponse {
        kind,
        slots: manifest.keys().map(str::to_string).collect(),
    }))
}

async fn create_pack(state: web::Data<AppState>, command: web::Json<BuildCommand>) -> Result<HttpResponse, PackError> {
    let command = command.into_inner();
    let job_id = format!("{:016x}", rand::random::<u64>());
    info!("Starting pack job {}: {:?}", job_id, command.source);

    let log = Arc::new(MemorySink::new());
    let sinks: Vec<Arc<dyn LogSink>> = vec![Arc::new(FacadeSink), log.clone()];
    let sink: Arc<dyn LogSink> = Arc::new(TeeSink::new(sinks));
    let task = spawn_build(state.assembler.clone(), command, sink);

    let outcome = Arc::new(Mutex::new(None));
    state.insert_job(
        job_id.clone(),
        Job {
            log,
            cancel: task.cancel_token(),
            outcome: outcome.clone(),
        },
    );

    tokio::spawn(async move {
        let result = JobOutcome::from(task.wait().await);
        *outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
    });

    Ok(HttpResponse::Accepted().json(JobCreatedResponse { job_id }))
}

async fn pack_status(state: web::Data<AppState>, id: web::Path<String>) -> Result<HttpResponse, PackError> {
    let response = state.with_job(&id, |job| {
        let outcome = job.outcome.lock().unwrap_or_else(|e| e.into_inner()).clone();
        JobStatusResponse {
            job_id: id.to_string(),
            phase: job.log.current_phase(),
            finished: outcome.is_some(),
            outcome,
            log: job.log.lines(),
        }
    })?;
    Ok(HttpResponse::Ok().json(response))
}

async fn cancel_pack(state: web::Data<AppState>, id: web::Path<String>) -> Result<HttpResponse, PackError> {
    state.with_job(&id, |job| job.cancel.cancel())?;
    Ok(HttpResponse::Accepted().finish())
}

async fn pack_archive(state: web::Data<AppState>, id: web::Path<String>) -> Result<HttpResponse, PackError> {
    let outcome = state.with_job(&id, |job| job.outcome.lock().unwrap_or_else(|e| e.into_inner()).clone())?;
    let Some(JobOutcome::Succeeded { report }) = outcome else {
        return Err(PackError::InvalidCommand(format!("job {} has not finished successfully", id)));
    };

    let bytes = web::block(move || {
        let dir = tempfile::tempdir().map_err(|e| PackError::io(std::env::temp_dir(), e))?;
        let zip_path = dir.path().join("pack.zip");
        create_pack_archive(&report.pack_dir, &zip_path)?;
        std::fs::read(&zip_path).map_err(|e| PackError::io(&zip_path, e))
    })
    .await
    .map_err(|e| PackError::Task(e.to_string()))??;

    Ok(HttpResponse::Ok().content_type("application/zip").body(bytes))
}

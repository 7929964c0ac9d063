//! Request handlers.

use std::process::Stdio;
use std::time::Duration;

use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{error, info};
use vton_core::write_pairs;

use crate::session::Session;
use crate::state::SharedState;
use crate::types::{bad_request, server_error, ErrorResponse, TryonParams};

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// `POST /api/tryon?filename=<stem>&filename2=<stem>`
///
/// Stages the uploaded pair, runs the composition stage and streams the
/// rendered PNG back.
pub async fn tryon(
    State(state): State<SharedState>,
    Query(params): Query<TryonParams>,
    mut multipart: Multipart,
) -> Result<Response, ErrorResponse> {
    let filename = params
        .filename
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("Missing filename or filename2"))?;
    if params.filename2.as_deref().unwrap_or("").is_empty() {
        return Err(bad_request("Missing filename or filename2"));
    }

    let mut person_bytes = None;
    let mut cloth_bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("person_image") => {
                person_bytes = Some(field.bytes().await.map_err(|e| {
                    bad_request(format!("failed reading person_image: {e}"))
                })?);
            }
            Some("clothes_image") => {
                cloth_bytes = Some(field.bytes().await.map_err(|e| {
                    bad_request(format!("failed reading clothes_image: {e}"))
                })?);
            }
            _ => {}
        }
    }
    let (person_bytes, cloth_bytes) = match (person_bytes, cloth_bytes) {
        (Some(p), Some(c)) => (p, c),
        _ => return Err(bad_request("Missing image files")),
    };

    let session = Session::create();
    let staging = &state.config.staging;
    info!(session = %session.id, "staging try-on request");

    stage_file(&session.person_path(staging), &person_bytes).await?;
    stage_file(&session.cloth_path(staging), &cloth_bytes).await?;

    let manifest = session.manifest_path(staging);
    write_pairs(&manifest, &[session.pair()])
        .map_err(|e| server_error(format!("failed writing pair manifest: {e}")))?;

    let result_dir = session.result_dir(staging);
    tokio::fs::create_dir_all(&result_dir)
        .await
        .map_err(|e| server_error(format!("failed creating result directory: {e}")))?;

    // One permit per driver subprocess; further requests queue here.
    let _permit = state
        .jobs
        .acquire()
        .await
        .map_err(|_| server_error("job queue closed"))?;

    let driver = &state.config.driver;
    let mut command = Command::new(&driver.program);
    command
        .args(&driver.base_args)
        .arg("--name")
        .arg(session.id.to_string())
        .arg("--stage")
        .arg("TOM")
        .arg("--dataroot")
        .arg(&staging.dataroot)
        .arg("--datamode")
        .arg(&staging.datamode)
        .arg("--data-list")
        .arg(&manifest)
        .arg("--checkpoint")
        .arg(&driver.checkpoint)
        .arg("--result-dir")
        .arg(&result_dir)
        .arg("--board-dir")
        .arg(&driver.board_dir)
        .arg("--workers")
        .arg(driver.workers.to_string())
        .arg("--device")
        .arg(&driver.device)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(pose) = &driver.pose_checkpoint {
        command.arg("--pose-checkpoint").arg(pose);
    }

    let timeout = Duration::from_secs(state.config.jobs.timeout_secs);
    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            error!(session = %session.id, "driver spawn failed: {e}");
            return Err(server_error(format!("failed to launch driver: {e}")));
        }
        Err(_) => {
            error!(session = %session.id, "driver timed out");
            return Err(server_error(format!(
                "driver timed out after {}s",
                state.config.jobs.timeout_secs
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(session = %session.id, status = ?output.status, "driver failed");
        return Err(server_error(format!(
            "Model failed to process images. {stderr}"
        )));
    }

    let result_path = session.expected_result(staging, driver);
    let bytes = tokio::fs::read(&result_path).await.map_err(|e| {
        error!(session = %session.id, "missing result {}: {e}", result_path.display());
        server_error(format!("result image not found: {e}"))
    })?;

    info!(session = %session.id, bytes = bytes.len(), "try-on complete");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}.png\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn stage_file(path: &std::path::Path, bytes: &[u8]) -> Result<(), ErrorResponse> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| server_error(format!("failed creating staging directory: {e}")))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| server_error(format!("failed staging upload: {e}")))
}

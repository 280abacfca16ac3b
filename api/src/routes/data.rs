//! Dataset endpoints: manifest, chunks and the legacy gzip export.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::FileType;
use flate2::{write::GzEncoder, Compression};
use std::io::Write;

use super::{chunk_collection, parse_chunk_index, Resource};
use crate::error::{ApiError, ApiResult};
use crate::range::{parse_range, RangeError};
use crate::state::AppState;

/// `GET /{resource}`: manifest or legacy export, depending on the suffix.
pub async fn resource(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    match Resource::classify(&segment)? {
        Resource::Metadata(file_type) => metadata(&state, file_type).await,
        Resource::Export(file_type) => export(&state, file_type, &headers).await,
    }
}

/// `GET /{fileType}-data/{chunkIndex}`
pub async fn chunk(
    State(state): State<AppState>,
    Path((segment, index)): Path<(String, String)>,
) -> ApiResult<Response> {
    let file_type = chunk_collection(&segment)?;
    let index = parse_chunk_index(&index)?;
    let request_id = uuid::Uuid::new_v4();

    tracing::debug!(request_id = %request_id, file_type = %file_type, chunk_index = index, "Chunk requested");

    let bytes = state
        .store()
        .read_chunk_bytes(&file_type, index)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Chunk {} of '{}' does not exist", index, file_type))
        })?;

    tracing::info!(
        request_id = %request_id,
        file_type = %file_type,
        chunk_index = index,
        bytes = bytes.len(),
        "Chunk served"
    );

    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        bytes,
    )
        .into_response())
}

async fn metadata(state: &AppState, file_type: FileType) -> ApiResult<Response> {
    let request_id = uuid::Uuid::new_v4();
    tracing::debug!(request_id = %request_id, file_type = %file_type, "Manifest requested");

    let manifest = state.store().read_manifest(&file_type).await?.ok_or_else(|| {
        ApiError::NotFound(format!("Metadata for '{}' is not available", file_type))
    })?;

    tracing::info!(
        request_id = %request_id,
        file_type = %file_type,
        records = manifest.total_records,
        chunks = manifest.total_chunks,
        "Manifest served"
    );

    Ok(Json(manifest).into_response())
}

/// Whole source file, gzip-encoded, optionally sliced by a `Range` header.
///
/// Ranges address the uncompressed bytes; the selected slice is compressed
/// on its own.
async fn export(state: &AppState, file_type: FileType, headers: &HeaderMap) -> ApiResult<Response> {
    let request_id = uuid::Uuid::new_v4();
    let path = state
        .source_path(&file_type)
        .ok_or_else(|| ApiError::NotFound(format!("No source configured for '{}'", file_type)))?
        .to_path_buf();

    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!(
                "Source file for '{}' does not exist",
                file_type
            )));
        }
        Err(e) => return Err(e.into()),
    };
    let total = data.len() as u64;

    let range_header = headers.get(header::RANGE).map(|v| v.to_str().unwrap_or_default());
    let (status, body, content_range) = match range_header {
        Some(value) => {
            let range = parse_range(value, total).map_err(|e| {
                tracing::warn!(request_id = %request_id, file_type = %file_type, range = value, "Rejected range");
                range_error(e, total)
            })?;
            let slice = data[range.start as usize..=range.end as usize].to_vec();
            (StatusCode::PARTIAL_CONTENT, slice, Some(range.content_range(total)))
        }
        None => (StatusCode::OK, data, None),
    };

    let raw_len = body.len();
    let compressed = tokio::task::spawn_blocking(move || gzip(&body))
        .await
        .map_err(|e| ApiError::InternalError(format!("Compression task failed: {}", e)))??;

    tracing::info!(
        request_id = %request_id,
        file_type = %file_type,
        status = status.as_u16(),
        bytes = raw_len,
        compressed = compressed.len(),
        "Legacy export served"
    );

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/csv")
        .header(header::CONTENT_ENCODING, "gzip")
        .header(header::ACCEPT_RANGES, "bytes");
    if let Some(content_range) = content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }
    builder
        .body(Body::from(compressed))
        .map_err(|e| ApiError::InternalError(format!("Failed to build response: {}", e)))
}

fn range_error(err: RangeError, total: u64) -> ApiError {
    ApiError::RangeNotSatisfiable {
        detail: err.to_string(),
        total,
    }
}

fn gzip(bytes: &[u8]) -> ApiResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity((bytes.len() / 2).max(256)),
        Compression::fast(),
    );
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

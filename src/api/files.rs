//! Serves stored assets back to clients, with single byte-range support so
//! players can seek.

use std::path::Path;

use axum::{
    body::Body,
    extract::{Path as AxumPath, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;

use super::{
    AppState,
    response::{ApiError, ApiResult},
};
use crate::assets::resolve_asset_path;

pub async fn serve_asset(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = state
        .assets
        .local_root()
        .and_then(|root| resolve_asset_path(root, &name))
        .ok_or_else(|| ApiError::not_found("Asset not found"))?;
    stream_file(&path, &headers).await
}

async fn stream_file(path: &Path, headers: &HeaderMap) -> ApiResult<Response> {
    let mut file = File::open(path)
        .await
        .map_err(|_| ApiError::not_found("Asset not found"))?;
    let size = file
        .metadata()
        .await
        .map_err(|_| ApiError::not_found("Asset not found"))?
        .len();
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_range(value, size));

    let mut response = match range {
        Some((start, _)) if start >= size => {
            let mut response = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            return Ok(response);
        }
        Some((start, end)) => {
            let end = end.min(size.saturating_sub(1));
            let length = end - start + 1;
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(anyhow::Error::from)?;
            let mut response = Body::from_stream(ReaderStream::new(file.take(length))).into_response();
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            if let Ok(value) = HeaderValue::from_str(&format!("bytes {start}-{end}/{size}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            response
        }
        None => {
            let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(size));
            response
        }
    };

    response
        .headers_mut()
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(mime) = mime_guess::from_path(path).first_raw() {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
    }
    Ok(response)
}

/// Parses `bytes=start-end`, `bytes=start-` and `bytes=-suffix`. Multiple
/// ranges are not supported.
fn parse_range(value: &str, size: u64) -> Option<(u64, u64)> {
    let ranges = value.trim().strip_prefix("bytes=")?.trim();
    if ranges.contains(',') {
        return None;
    }
    let (start, end) = ranges.split_once('-')?;
    let last = size.saturating_sub(1);

    if start.is_empty() {
        let suffix: u64 = end.parse().ok()?;
        if suffix == 0 {
            return None;
        }
        return Some((size.saturating_sub(suffix), last));
    }

    let start: u64 = start.parse().ok()?;
    let end = if end.is_empty() { last } else { end.parse().ok()? };
    (end >= start).then_some((start, end))
}

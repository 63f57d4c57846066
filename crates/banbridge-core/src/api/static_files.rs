//! Static file serving for the web front end.

use std::path::{Component, Path, PathBuf};

use axum::http::header;
use axum::response::{IntoResponse, Response};

use super::ApiError;

/// Map a request path to a path relative to the static root.
///
/// `/` serves `index.html`, and a `/public/` prefix is dropped.
pub fn relative_path(request_path: &str) -> &str {
    match request_path {
        "" | "/" => "index.html",
        p => p.strip_prefix("/public/").unwrap_or(p).trim_start_matches('/'),
    }
}

/// Join `relative` onto `root`, resolving `.` and `..` lexically.
///
/// Returns `None` when the result would leave `root`.
pub fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.iter().fold(root.to_path_buf(), |path, part| path.join(part)))
}

/// Content type for a file, by extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}

/// Serve `request_path` from `root`.
pub async fn serve_file(root: &Path, request_path: &str) -> Result<Response, ApiError> {
    let path = resolve(root, relative_path(request_path)).ok_or(ApiError::OutsideRoot)?;
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(ApiError::NotFound),
    }
    let data = tokio::fs::read(&path).await?;
    Ok(([(header::CONTENT_TYPE, content_type(&path))], data).into_response())
}

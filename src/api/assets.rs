//! 静态文件
//!
//! `public/{app}/` 下的文件原样返回，图片接口也复用这里的文件流

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::AppState;

/// 根据扩展名推断 Content-Type
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// 把请求路径拼到 `root` 下；出现 `..`、根目录等非普通组件时返回 `None`
pub fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(joined)
}

/// 以流的形式返回文件，带 Content-Type 和 Content-Length
pub async fn stream_file(path: &Path, content_type: &'static str) -> std::io::Result<Response> {
    let file = File::open(path).await?;
    let len = file.metadata().await?.len();
    let body = Body::from_stream(ReaderStream::new(file));

    let mut resp = Response::new(body);
    let headers = resp.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    Ok(resp)
}

async fn serve_from_app(public_dir: &Path, app: &str, relative: &str) -> Response {
    let Some(app_dir) = safe_join(public_dir, app) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(mut path) = safe_join(&app_dir, relative) else {
        debug!("拒绝越界路径: /{}/{}", app, relative);
        return StatusCode::NOT_FOUND.into_response();
    };

    if tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        path.push("index.html");
    }

    match stream_file(&path, content_type_for(&path)).await {
        Ok(resp) => resp,
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `GET /{app}/`
pub async fn app_index<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    AxumPath(app): AxumPath<String>,
) -> Response
where
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    serve_from_app(&state.public_dir, &app, "").await
}

/// `GET /{app}/{path..}`
pub async fn app_asset<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    AxumPath((app, path)): AxumPath<(String, String)>,
) -> Response
where
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    serve_from_app(&state.public_dir, &app, &path).await
}

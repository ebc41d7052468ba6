//! 截图接口
//!
//! - `GET /{app}.png`：按需渲染后返回截图，没有截图时返回兜底图片
//! - `GET /render.png`：旧接口，对应 `screen` 目标
//! - `GET /{app}`：跳转到 `/{app}/`

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{error, info};

use super::assets::{content_type_for, safe_join, stream_file};
use super::device::{DeviceInfo, DeviceQuery};
use super::AppState;
use crate::infrastructure::{BrowserSession, ImageConverter};
use crate::models::{LEGACY_ROUTE, LEGACY_TARGET};

/// `GET /{name}` 的统一入口
pub async fn entry<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    AxumPath(name): AxumPath<String>,
    Query(query): Query<DeviceQuery>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> Response
where
    S: BrowserSession + 'static,
    C: ImageConverter + 'static,
{
    let device = || DeviceInfo::from_request(&query, &headers, connect.as_ref().map(|c| c.0));

    if name == LEGACY_ROUTE {
        info!("[{}] {}", LEGACY_ROUTE, device());
        return legacy_render(&state).await;
    }

    if let Some(app) = name.strip_suffix(".png") {
        if let Some(spec) = state.coordinator.target(app) {
            info!("[{}] {}", name, device());
            state.coordinator.request_render(app).await;
            return serve_image(&name, &spec.output_path, &state.fallback_image).await;
        }
        return StatusCode::NOT_FOUND.into_response();
    }

    // 与静态文件服务一致：`/{app}` 跳转到 `/{app}/`
    let is_app_dir = match safe_join(&state.public_dir, &name) {
        Some(dir) => tokio::fs::metadata(dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false),
        None => false,
    };
    if is_app_dir {
        return Redirect::permanent(&format!("/{}/", name)).into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}

async fn legacy_render<S, C>(state: &AppState<S, C>) -> Response
where
    S: BrowserSession + 'static,
    C: ImageConverter + 'static,
{
    let output = match state.coordinator.target(LEGACY_TARGET) {
        Some(spec) => {
            state.coordinator.request_render(LEGACY_TARGET).await;
            spec.output_path.clone()
        }
        None => state
            .screenshots_dir
            .join(format!("{}.png", LEGACY_TARGET)),
    };
    serve_image(LEGACY_ROUTE, &output, &state.fallback_image).await
}

/// 有截图就返回截图，否则返回兜底图片
async fn serve_image(label: &str, screenshot: &Path, fallback: &Path) -> Response {
    if tokio::fs::try_exists(screenshot).await.unwrap_or(false) {
        match stream_file(screenshot, "image/png").await {
            Ok(resp) => {
                info!("[{}] Serving screenshot", label);
                return resp;
            }
            Err(e) => error!("[{}] 读取截图 {} 失败: {}", label, screenshot.display(), e),
        }
    }

    info!("[{}] Serving fallback: {}", label, fallback.display());
    match stream_file(fallback, content_type_for(fallback)).await {
        Ok(resp) => resp,
        Err(e) => {
            error!("[{}] 读取兜底图片 {} 失败: {}", label, fallback.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "fallback image unavailable").into_response()
        }
    }
}

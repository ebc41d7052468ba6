//! HTTP 接口层
//!
//! 路由：
//! - `GET /{app}.png`、`GET /render.png` → 截图（见 `screenshot`）
//! - `GET /{app}`、`GET /{app}/`、`GET /{app}/{path..}` → 静态文件（见 `assets`）

pub mod assets;
pub mod device;
pub mod screenshot;

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::config::Config;
use crate::infrastructure::{BrowserSession, ImageConverter};
use crate::services::RenderCoordinator;

/// 各个处理函数共享的状态
pub struct AppState<S, C> {
    pub coordinator: Arc<RenderCoordinator<S, C>>,
    pub public_dir: PathBuf,
    pub screenshots_dir: PathBuf,
    pub fallback_image: PathBuf,
}

impl<S, C> AppState<S, C> {
    pub fn new(coordinator: Arc<RenderCoordinator<S, C>>, config: &Config) -> Self {
        Self {
            coordinator,
            public_dir: config.public_dir.clone(),
            screenshots_dir: config.screenshots_dir.clone(),
            fallback_image: config.fallback_image.clone(),
        }
    }
}

/// 构建路由
pub fn router<S, C>(state: Arc<AppState<S, C>>) -> Router
where
    S: BrowserSession + 'static,
    C: ImageConverter + 'static,
{
    Router::new()
        .route("/:name", get(screenshot::entry::<S, C>))
        .route("/:name/", get(assets::app_index::<S, C>))
        .route("/:name/*path", get(assets::app_asset::<S, C>))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(req: Request<Body>, next: Next) -> Response {
    info!("[REQUEST] {} {}", req.method(), req.uri());
    next.run(req).await
}

//! 应用生命周期 - 编排层
//!
//! 1. **初始化**：校验配置、扫描应用、启动浏览器、为每个目标创建页面
//! 2. **运行**：启动可选的后台刷新，监听 HTTP，Ctrl-C 时优雅退出
//!
//! 只有本模块持有 Browser，协调器只拿到各自的页面会话

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::browser;
use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::{Converter, PageSession};
use crate::models::LEGACY_TARGET;
use crate::orchestrator::refresher;
use crate::services::{self, RenderCoordinator, RenderPolicy, TargetRegistry};
use crate::utils::logging;

/// 生产环境使用的协调器类型
pub type Coordinator = RenderCoordinator<PageSession, Converter>;

/// 应用主结构
pub struct App {
    config: Config,
    browser: Browser,
    browser_events: JoinHandle<()>,
    coordinator: Arc<Coordinator>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate().map_err(AppError::from)?;
        logging::log_startup(&config);

        tokio::fs::create_dir_all(&config.screenshots_dir)
            .await
            .with_context(|| {
                format!("无法创建截图目录: {}", config.screenshots_dir.display())
            })?;

        let apps = services::discover_apps(&config.public_dir).await?;
        logging::log_discovered(&apps);
        let specs = services::build_target_specs(&apps, &config);

        let (browser, browser_events) = browser::launch_headless_browser(&config).await?;

        let mut registry = TargetRegistry::new();
        for spec in specs {
            let page = browser::open_blank_page(&browser, &spec.name).await?;
            let session = PageSession::new(
                page,
                config.viewport_width,
                config.viewport_height,
                config.settle_delay(),
            )
            .await
            .map_err(AppError::from)
            .with_context(|| format!("设置 {} 的视口失败", spec.name))?;
            info!("✓ 注册渲染目标 {}", spec);
            registry.insert(spec, session);
        }
        if registry.is_empty() {
            warn!("⚠️ 没有任何渲染目标，只会返回兜底图片");
        }

        let coordinator = Arc::new(RenderCoordinator::new(
            registry,
            Converter::from_config(&config),
            RenderPolicy::from_config(&config),
        ));

        Ok(Self {
            config,
            browser,
            browser_events,
            coordinator,
        })
    }

    /// 运行 HTTP 服务，直到收到 Ctrl-C
    pub async fn run(self) -> Result<()> {
        let refresher = self
            .config
            .refresh_interval()
            .map(|every| refresher::spawn_refresher(self.coordinator.clone(), every));

        let addr: SocketAddr = self
            .config
            .bind
            .parse()
            .with_context(|| format!("无效的监听地址: {}", self.config.bind))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("无法监听 {}", addr))?;

        let app_names: Vec<String> = self
            .coordinator
            .names()
            .iter()
            .filter(|name| name.as_str() != LEGACY_TARGET)
            .cloned()
            .collect();
        logging::log_available_apps(&self.config.bind, &app_names, self.config.legacy_enabled);

        let state = Arc::new(AppState::new(self.coordinator.clone(), &self.config));
        let router = api::router(state);

        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Server(e.to_string()));

        if let Some(task) = refresher {
            task.abort();
        }
        self.shutdown().await;
        served?;
        Ok(())
    }

    async fn shutdown(mut self) {
        info!("正在关闭浏览器...");
        if let Err(e) = self.browser.close().await {
            warn!("关闭浏览器失败: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("等待浏览器退出失败: {}", e);
        }
        self.browser_events.abort();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("无法监听 Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("收到退出信号");
}

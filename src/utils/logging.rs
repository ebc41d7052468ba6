/// 日志工具模块
///
/// 负责初始化 tracing 订阅器，并提供启动信息的输出函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志
///
/// 设置了 `RUST_LOG` 时以其为准，否则根据 `verbose` 选择 `debug` 或 `info`。
/// 重复调用是安全的（测试中会多次调用）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 e-ink 渲染服务启动 - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!(
        "🖼️ 视口: {}x{} | 转换方式: {:?}",
        config.viewport_width, config.viewport_height, config.converter
    );
    info!(
        "⏱️ 最小渲染间隔: {}s | 等待上限: {}s | 截图超时: {}s",
        config.min_render_interval_secs, config.wait_ceiling_secs, config.capture_timeout_secs
    );
    info!("{}", "=".repeat(60));
}

/// 记录已发现的应用
pub fn log_discovered(names: &[String]) {
    if names.is_empty() {
        info!("Discovered apps: none");
    } else {
        info!("Discovered apps: {}", names.join(", "));
    }
}

/// 列出所有可访问的地址
pub fn log_available_apps(bind: &str, names: &[String], legacy: bool) {
    let port = bind.rsplit(':').next().unwrap_or(bind);
    info!("PNG 服务已监听所有网络接口: {}", bind);
    info!("Local: http://localhost:{}", port);
    info!("\n可用应用:");
    for name in names {
        info!("  - http://localhost:{}/{}/ (app)", port, name);
        info!("    http://localhost:{}/{}.png (screenshot)", port, name);
    }
    if legacy {
        info!("  - http://localhost:{}/render.png (legacy)", port);
    }
}

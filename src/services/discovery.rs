//! 应用发现
//!
//! `public/` 下的每个子目录就是一个应用，也就是一个渲染目标

use std::path::Path;

use tokio::fs;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{TargetSpec, LEGACY_ROUTE};

/// 扫描 `public_dir` 的直接子目录，按名称排序
///
/// 目录不存在时返回空列表；以 `.` 开头的条目会被跳过
pub async fn discover_apps(public_dir: &Path) -> AppResult<Vec<String>> {
    if !fs::try_exists(public_dir).await.unwrap_or(false) {
        tracing::warn!("应用目录不存在: {}", public_dir.display());
        return Ok(Vec::new());
    }

    let discovery_err = |source| AppError::Discovery {
        path: public_dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    let mut entries = fs::read_dir(public_dir).await.map_err(discovery_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(discovery_err)? {
        let file_type = entry.file_type().await.map_err(discovery_err)?;
        if !file_type.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::warn!("跳过非 UTF-8 目录名: {:?}", entry.file_name());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }

    names.sort();
    Ok(names)
}

/// 根据发现的应用和配置生成全部渲染目标
///
/// `{app}.png` 与旧接口路径相同的应用无法通过 HTTP 取到截图，不为它注册目标
pub fn build_target_specs(apps: &[String], config: &Config) -> Vec<TargetSpec> {
    let mut specs: Vec<TargetSpec> = apps
        .iter()
        .filter(|name| {
            let shadowed = format!("{}.png", name) == LEGACY_ROUTE;
            if shadowed {
                tracing::warn!(
                    "⚠️ 应用 {} 的截图地址与旧接口 /{} 冲突，不注册渲染目标",
                    name,
                    LEGACY_ROUTE
                );
            }
            !shadowed
        })
        .map(|name| TargetSpec::for_app(name, &config.base_url, &config.screenshots_dir))
        .collect();

    if config.legacy_enabled {
        specs.push(TargetSpec::legacy(
            &config.legacy_render_url,
            &config.screenshots_dir,
        ));
    }
    specs
}

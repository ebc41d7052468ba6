//! 渲染目标的静态描述

use std::fmt::Display;
use std::path::{Path, PathBuf};

/// 旧接口 `/render.png` 使用的目标名
pub const LEGACY_TARGET: &str = "screen";

/// 旧接口路径，同名应用的截图会被它遮挡
pub const LEGACY_ROUTE: &str = "render.png";

/// 渲染目标描述
///
/// 启动时根据目录扫描结果构造，之后不再变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    /// 目标名称（唯一）
    pub name: String,

    /// 浏览器导航地址
    pub source_url: String,

    /// 最终图片位置
    pub output_path: PathBuf,
}

impl TargetSpec {
    pub fn new(
        name: impl Into<String>,
        source_url: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            output_path: output_path.into(),
        }
    }

    /// 为 `public/` 下的应用构造目标：`{base_url}/{name}/` → `{screenshots_dir}/{name}.png`
    pub fn for_app(name: &str, base_url: &str, screenshots_dir: &Path) -> Self {
        Self::new(
            name,
            format!("{}/{}/", base_url.trim_end_matches('/'), name),
            screenshots_dir.join(format!("{}.png", name)),
        )
    }

    /// 旧接口目标
    pub fn legacy(render_url: &str, screenshots_dir: &Path) -> Self {
        Self::new(
            LEGACY_TARGET,
            render_url,
            screenshots_dir.join(format!("{}.png", LEGACY_TARGET)),
        )
    }
}

impl Display for TargetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} ← {}]", self.name, self.source_url)
    }
}

/// 渲染状态：`Idle -> InProgress -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    InProgress,
}

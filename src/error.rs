use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 渲染阶段（用于超时错误的定位）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    /// 浏览器导航与截图
    Capture,
    /// 图片格式转换
    Convert,
}

impl std::fmt::Display for RenderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderStage::Capture => write!(f, "截图"),
            RenderStage::Convert => write!(f, "转换"),
        }
    }
}

/// 渲染错误
///
/// 除 `NotFound` 外，其余错误都在协调器内部就地恢复：
/// 记录日志、目标回到空闲状态、上一次成功的图片继续可用。
#[derive(Debug, Error)]
pub enum RenderError {
    /// 未注册的渲染目标
    #[error("未知的渲染目标: {name}")]
    NotFound { name: String },

    /// 导航或截图失败
    #[error("导航到 {url} 失败: {message}")]
    Navigation { url: String, message: String },

    /// 某个阶段超时
    #[error("{stage}超时 ({after:?})")]
    Timeout { stage: RenderStage, after: Duration },

    /// 图片转换失败
    #[error("图片转换失败: {message}")]
    Conversion { message: String },

    /// 发布最终图片失败
    #[error("写入图片失败 ({}): {source}", .path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    /// 创建转换错误
    pub fn conversion(message: impl Into<String>) -> Self {
        RenderError::Conversion {
            message: message.into(),
        }
    }

    /// 创建导航错误
    pub fn navigation(url: impl Into<String>, source: impl std::fmt::Display) -> Self {
        RenderError::Navigation {
            url: url.into(),
            message: source.to_string(),
        }
    }
}

impl From<image::ImageError> for RenderError {
    fn from(err: image::ImageError) -> Self {
        RenderError::conversion(err.to_string())
    }
}

impl From<png::EncodingError> for RenderError {
    fn from(err: png::EncodingError) -> Self {
        RenderError::conversion(err.to_string())
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },

    /// 配置文件读取或解析失败
    #[error("配置文件 {path} 无效: {message}")]
    FileInvalid { path: String, message: String },

    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 浏览器启动或页面创建失败
    #[error("浏览器错误: {0}")]
    Browser(String),

    /// 目标扫描失败
    #[error("扫描目录 {} 失败: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP 服务错误
    #[error("服务器错误: {0}")]
    Server(String),

    /// 其他 IO 错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(err.to_string())
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

//! # e-ink Render
//!
//! 用无头浏览器为本地网页应用截图，转换为 e-ink 屏幕可用的黑白 PNG，并通过 HTTP 提供
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `PageSession` - 每个目标独占的浏览器页面，提供 capture() 能力
//! - `Converter` - 截图转 1 位黑白 PNG（进程内或外部工具）
//! - `publisher` - 临时文件 + 改名的原子发布
//!
//! ### ② 流程层（Workflow）
//! - `RenderFlow` - 一次渲染：截图 → 转换 → 发布
//!
//! ### ③ 业务能力层（Services）
//! - `RenderCoordinator` - 限流、同目标串行化、失败恢复
//! - `TargetRegistry` - 启动时构建的目标注册表
//! - `discovery` - 从 `public/` 发现应用
//!
//! ### ④ 接口与编排层（API / Orchestration）
//! - `api/` - axum 路由：截图、旧接口、静态文件
//! - `orchestrator/` - 应用生命周期与后台刷新
//!
//! ## 模块结构

pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, RenderError};
pub use infrastructure::{BrowserSession, ImageConverter};
pub use models::{RenderState, TargetSpec};
pub use orchestrator::App;
pub use services::{RenderCoordinator, RenderOutcome, RenderPolicy, TargetRegistry};
pub use utils::logging as logger;

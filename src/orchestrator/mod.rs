//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用生命周期
//! - 启动浏览器、扫描应用、构建协调器
//! - 持有 Browser，运行 HTTP 服务
//!
//! ### `refresher` - 后台定时刷新
//! - 按固定周期对所有目标请求渲染
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator (App / refresher)
//!     ↓
//! api (HTTP 路由) ─→ services::RenderCoordinator (限流 / 串行化)
//!                         ↓
//!                   workflow::RenderFlow (截图 → 转换 → 发布)
//!                         ↓
//!                   infrastructure (PageSession / Converter / publisher)
//! ```

pub mod app;
pub mod refresher;

pub use app::{App, Coordinator};
pub use refresher::{refresh_all, spawn_refresher};

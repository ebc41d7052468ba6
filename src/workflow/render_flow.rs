//! 单次渲染流程 - 流程层
//!
//! 流程顺序：
//! 1. 浏览器截图（有超时）
//! 2. 转换为黑白图片（有超时）
//! 3. 原子发布到输出路径

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{RenderError, RenderStage};
use crate::infrastructure::{publisher, BrowserSession, ImageConverter};
use crate::models::TargetSpec;

/// 渲染流程
///
/// - 只负责"一次渲染"的步骤
/// - 不持有状态，不做限流，不处理并发
#[derive(Debug, Clone, Copy)]
pub struct RenderFlow {
    capture_timeout: Duration,
    convert_timeout: Duration,
}

impl RenderFlow {
    pub fn new(capture_timeout: Duration, convert_timeout: Duration) -> Self {
        Self {
            capture_timeout,
            convert_timeout,
        }
    }

    /// 执行 截图 → 转换 → 发布，返回发布的字节数
    pub async fn run<S, C>(
        &self,
        spec: &TargetSpec,
        session: &S,
        converter: &C,
    ) -> Result<usize, RenderError>
    where
        S: BrowserSession,
        C: ImageConverter,
    {
        debug!("[{}] 📸 开始截图: {}", spec.name, spec.source_url);
        let raw = timeout(
            self.capture_timeout,
            session.capture(&spec.source_url, self.capture_timeout),
        )
        .await
        .map_err(|_| RenderError::Timeout {
            stage: RenderStage::Capture,
            after: self.capture_timeout,
        })??;

        debug!("[{}] 🎨 转换截图 ({} 字节)", spec.name, raw.len());
        let converted = timeout(self.convert_timeout, converter.convert(&raw))
            .await
            .map_err(|_| RenderError::Timeout {
                stage: RenderStage::Convert,
                after: self.convert_timeout,
            })??;

        publisher::publish(&spec.output_path, &converted).await?;
        info!(
            "[{}] Updated PNG at {} ({} 字节)",
            spec.name,
            spec.output_path.display(),
            converted.len()
        );

        Ok(converted.len())
    }
}

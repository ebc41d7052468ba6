//! 浏览器会话 - 基础设施层
//!
//! 每个渲染目标独占一个页面，只暴露"导航并截图"的能力

use std::future::Future;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::error::{RenderError, RenderStage};

/// 截图能力
///
/// 同一会话不会被并发调用：协调器的 InProgress 状态保证了这一点
pub trait BrowserSession: Send + Sync {
    /// 导航到 `url` 并返回原始截图
    fn capture(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, RenderError>> + Send;
}

/// 基于 chromiumoxide 页面的会话
///
/// 职责：
/// - 持有目标专属的 Page
/// - 设置视口、导航、截图
/// - 不关心限流与并发
pub struct PageSession {
    page: Page,
    width: u32,
    height: u32,
    settle_delay: Duration,
}

impl PageSession {
    /// 包装页面并设置视口尺寸
    pub async fn new(
        page: Page,
        width: u32,
        height: u32,
        settle_delay: Duration,
    ) -> Result<Self, chromiumoxide::error::CdpError> {
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(width),
            i64::from(height),
            1.0,
            false,
        ))
        .await?;

        Ok(Self {
            page,
            width,
            height,
            settle_delay,
        })
    }

    async fn navigate_and_shoot(&self, url: &str) -> Result<Vec<u8>, RenderError> {
        debug!("导航到: {} ({}x{})", url, self.width, self.height);
        self.page
            .goto(url)
            .await
            .map_err(|e| RenderError::navigation(url, e))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| RenderError::navigation(url, e))?;

        if !self.settle_delay.is_zero() {
            sleep(self.settle_delay).await;
        }

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let bytes = self
            .page
            .screenshot(params)
            .await
            .map_err(|e| RenderError::navigation(url, e))?;
        debug!("截图完成: {} 字节", bytes.len());
        Ok(bytes)
    }
}

impl BrowserSession for PageSession {
    async fn capture(&self, url: &str, limit: Duration) -> Result<Vec<u8>, RenderError> {
        match timeout(limit, self.navigate_and_shoot(url)).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout {
                stage: RenderStage::Capture,
                after: limit,
            }),
        }
    }
}

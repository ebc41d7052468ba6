//! 后台定时刷新
//!
//! 每个周期对所有目标并发调用一次 `request_render`，
//! 限流和串行化仍由协调器负责

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::infrastructure::{BrowserSession, ImageConverter};
use crate::services::RenderCoordinator;

/// 对所有目标请求一次渲染，返回有可用图片的目标数
pub async fn refresh_all<S, C>(coordinator: &RenderCoordinator<S, C>) -> usize
where
    S: BrowserSession + 'static,
    C: ImageConverter + 'static,
{
    let results = join_all(
        coordinator
            .names()
            .iter()
            .map(|name| coordinator.request_render(name)),
    )
    .await;
    results.into_iter().filter(|ok| *ok).count()
}

/// 启动刷新任务
pub fn spawn_refresher<S, C>(
    coordinator: Arc<RenderCoordinator<S, C>>,
    every: Duration,
) -> JoinHandle<()>
where
    S: BrowserSession + 'static,
    C: ImageConverter + 'static,
{
    info!("🔁 后台刷新已开启，间隔 {:?}", every);
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let available = refresh_all(&coordinator).await;
            debug!(
                "后台刷新完成: {}/{} 个目标有可用图片",
                available,
                coordinator.names().len()
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::RenderError;
    use crate::models::TargetSpec;
    use crate::services::{RenderPolicy, TargetRegistry};

    struct CountingSession(Arc<AtomicUsize>);

    impl BrowserSession for CountingSession {
        async fn capture(&self, _url: &str, _timeout: Duration) -> Result<Vec<u8>, RenderError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        }
    }

    struct Passthrough;

    impl ImageConverter for Passthrough {
        async fn convert(&self, raw: &[u8]) -> Result<Vec<u8>, RenderError> {
            Ok(raw.to_vec())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refresher_renders_every_target_respecting_interval() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = TargetRegistry::new();
        for name in ["dash", "weather"] {
            registry.insert(
                TargetSpec::for_app(name, "http://localhost:5000", dir.path()),
                CountingSession(calls.clone()),
            );
        }
        let coordinator = Arc::new(RenderCoordinator::new(
            registry,
            Passthrough,
            RenderPolicy::default(),
        ));

        assert_eq!(refresh_all(&coordinator).await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // 刷新周期短于最小渲染间隔时，多出的周期命中缓存
        let handle = spawn_refresher(coordinator.clone(), Duration::from_secs(20));
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        handle.abort();

        assert!(dir.path().join("dash.png").exists());
        assert!(dir.path().join("weather.png").exists());
    }
}

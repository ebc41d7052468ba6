//! 渲染协调器 - 业务能力层
//!
//! 决定每次请求是直接使用缓存、等待正在进行的渲染，还是发起新的渲染。
//!
//! 规则：
//! 1. 距上次成功渲染不足 `min_interval` → 直接返回缓存
//! 2. 已有渲染在进行 → 最多等待 `wait_ceiling`
//! 3. 否则由当前调用者独占执行 截图 → 转换 → 发布
//!
//! 检查与进入 InProgress 在同一次 `watch` 修改中完成，
//! 因此同一目标任意时刻至多只有一个渲染。不同目标之间互不影响。
//!
//! 渲染本身在独立任务中执行：发起者被取消（例如客户端断开连接）时，
//! 渲染照常进行到完成或超时。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::RenderError;
use crate::infrastructure::{BrowserSession, ImageConverter};
use crate::models::{RenderState, TargetSpec};
use crate::services::target_registry::{RenderTarget, TargetRegistry, TargetStatus};
use crate::workflow::RenderFlow;

/// 渲染策略
#[derive(Debug, Clone, Copy)]
pub struct RenderPolicy {
    pub min_interval: Duration,
    pub wait_ceiling: Duration,
    pub capture_timeout: Duration,
    pub convert_timeout: Duration,
}

impl RenderPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_interval: config.min_render_interval(),
            wait_ceiling: config.wait_ceiling(),
            capture_timeout: config.capture_timeout(),
            convert_timeout: config.convert_timeout(),
        }
    }
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(60),
            wait_ceiling: Duration::from_secs(35),
            capture_timeout: Duration::from_secs(30),
            convert_timeout: Duration::from_secs(30),
        }
    }
}

/// 一次请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// 在最小间隔内，直接使用缓存
    Cached,
    /// 本次调用完成了渲染
    Rendered,
    /// 等待他人的渲染；`finished` 表示等待结束时渲染已不在进行
    Joined { finished: bool },
    /// 本次渲染失败；`has_previous` 表示输出路径上仍有旧图片
    Failed { has_previous: bool },
}

impl RenderOutcome {
    /// 调用结束后是否有可用图片
    pub fn image_available(&self) -> bool {
        match self {
            RenderOutcome::Cached | RenderOutcome::Rendered => true,
            RenderOutcome::Joined { finished } => *finished,
            RenderOutcome::Failed { has_previous } => *has_previous,
        }
    }
}

/// 准入判断
enum Admission<S> {
    Fresh,
    Busy,
    Granted(RenderGuard<S>),
}

/// 持有期间目标处于 InProgress，析构时一定回到 Idle
///
/// 守卫持有目标的所有权，可以随渲染任务一起移动到后台
struct RenderGuard<S> {
    target: Arc<RenderTarget<S>>,
    succeeded: bool,
}

impl<S> RenderGuard<S> {
    /// 标记渲染成功，析构时写入完成时间
    fn succeed(mut self) {
        self.succeeded = true;
    }
}

impl<S> Drop for RenderGuard<S> {
    fn drop(&mut self) {
        let succeeded = self.succeeded;
        self.target.status.send_modify(|status| {
            status.state = RenderState::Idle;
            if succeeded {
                status.last_render = Some(Instant::now());
            }
        });
    }
}

impl<S> RenderTarget<S> {
    /// 原子地完成 限流检查 → 忙碌检查 → 进入 InProgress
    fn admit(self: &Arc<Self>, min_interval: Duration) -> Admission<S> {
        let mut fresh = false;
        let granted = self.status.send_if_modified(|status| {
            if let Some(last) = status.last_render {
                if last.elapsed() < min_interval {
                    fresh = true;
                    return false;
                }
            }
            if status.state == RenderState::InProgress {
                return false;
            }
            status.state = RenderState::InProgress;
            true
        });

        if granted {
            Admission::Granted(RenderGuard {
                target: Arc::clone(self),
                succeeded: false,
            })
        } else if fresh {
            Admission::Fresh
        } else {
            Admission::Busy
        }
    }

    /// 等待正在进行的渲染结束，最多等待 `ceiling`
    async fn wait_idle(&self, ceiling: Duration) -> bool {
        let mut rx = self.status.subscribe();
        let settled = async {
            loop {
                if rx.borrow_and_update().state != RenderState::InProgress {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };
        let _ = timeout(ceiling, settled).await;
        self.status.borrow().state != RenderState::InProgress
    }
}

/// 渲染协调器
///
/// 职责：
/// - 持有目标注册表和转换器
/// - 对外只暴露 `request_render`
/// - 渲染失败不会向上传播，只记录日志
pub struct RenderCoordinator<S, C> {
    registry: TargetRegistry<S>,
    converter: Arc<C>,
    policy: RenderPolicy,
    flow: RenderFlow,
}

impl<S, C> RenderCoordinator<S, C>
where
    S: BrowserSession + 'static,
    C: ImageConverter + 'static,
{
    pub fn new(registry: TargetRegistry<S>, converter: C, policy: RenderPolicy) -> Self {
        let flow = RenderFlow::new(policy.capture_timeout, policy.convert_timeout);
        Self {
            registry,
            converter: Arc::new(converter),
            policy,
            flow,
        }
    }

    /// 请求渲染，返回调用结束后是否有可用图片
    pub async fn request_render(&self, name: &str) -> bool {
        match self.try_request_render(name).await {
            Ok(outcome) => outcome.image_available(),
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// 同 `request_render`，但返回详细结果；未知目标返回 `NotFound`
    pub async fn try_request_render(&self, name: &str) -> Result<RenderOutcome, RenderError> {
        let target = self.registry.get(name).ok_or_else(|| RenderError::NotFound {
            name: name.to_string(),
        })?;

        match target.admit(self.policy.min_interval) {
            Admission::Fresh => {
                debug!("[{}] 距上次渲染不足 {:?}，使用缓存", name, self.policy.min_interval);
                Ok(RenderOutcome::Cached)
            }
            Admission::Busy => {
                debug!("[{}] ⏳ 已有渲染进行中，等待结果", name);
                let finished = target.wait_idle(self.policy.wait_ceiling).await;
                if !finished {
                    warn!(
                        "[{}] 等待 {:?} 后渲染仍未结束",
                        name, self.policy.wait_ceiling
                    );
                }
                Ok(RenderOutcome::Joined { finished })
            }
            Admission::Granted(guard) => {
                info!("[{}] 🖼️ 开始渲染 {}", name, target.spec.source_url);
                let task_target = Arc::clone(target);
                let converter = Arc::clone(&self.converter);
                let flow = self.flow;
                let render = tokio::spawn(async move {
                    let spec = &task_target.spec;
                    match flow.run(spec, &task_target.session, converter.as_ref()).await {
                        Ok(_) => {
                            guard.succeed();
                            true
                        }
                        Err(e) => {
                            drop(guard);
                            error!("[{}] ❌ 渲染失败: {}", spec.name, e);
                            false
                        }
                    }
                });

                let rendered = render.await.unwrap_or_else(|e| {
                    error!("[{}] ❌ 渲染任务异常退出: {}", name, e);
                    false
                });
                if rendered {
                    return Ok(RenderOutcome::Rendered);
                }
                let has_previous = tokio::fs::try_exists(&target.spec.output_path)
                    .await
                    .unwrap_or(false);
                Ok(RenderOutcome::Failed { has_previous })
            }
        }
    }
}

impl<S, C> RenderCoordinator<S, C> {
    /// 目标描述
    pub fn target(&self, name: &str) -> Option<&TargetSpec> {
        self.registry.get(name).map(|target| target.spec())
    }

    /// 目标当前状态
    pub fn status(&self, name: &str) -> Option<TargetStatus> {
        self.registry.get(name).map(|target| target.status())
    }

    /// 所有目标名（注册顺序）
    pub fn names(&self) -> &[String] {
        self.registry.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use futures::future::join_all;
    use tokio_test::assert_ok;

    use crate::error::RenderStage;

    /// 测试用会话统计
    #[derive(Default)]
    struct SessionStats {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    /// 可编排结果的假会话：按顺序弹出预设结果，用完后一直成功
    struct ScriptedSession {
        delay: Duration,
        script: Mutex<VecDeque<Result<Vec<u8>, RenderError>>>,
        stats: Arc<SessionStats>,
    }

    impl ScriptedSession {
        fn new(delay: Duration) -> (Self, Arc<SessionStats>) {
            let stats = Arc::new(SessionStats::default());
            let session = Self {
                delay,
                script: Mutex::new(VecDeque::new()),
                stats: stats.clone(),
            };
            (session, stats)
        }

        fn then(self, result: Result<Vec<u8>, RenderError>) -> Self {
            self.script.lock().unwrap().push_back(result);
            self
        }
    }

    impl BrowserSession for ScriptedSession {
        async fn capture(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, RenderError> {
            let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.stats.calls.fetch_add(1, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);

            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| Ok(format!("raw:{}", url).into_bytes()))
        }
    }

    /// 假转换器：输出 = "mono:" + 输入
    #[derive(Default)]
    struct PrefixConverter {
        fail: bool,
        calls: AtomicUsize,
    }

    impl ImageConverter for PrefixConverter {
        async fn convert(&self, raw: &[u8]) -> Result<Vec<u8>, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RenderError::conversion("convert: command not found"));
            }
            let mut out = b"mono:".to_vec();
            out.extend_from_slice(raw);
            Ok(out)
        }
    }

    fn coordinator_with(
        dir: &Path,
        sessions: Vec<(&str, ScriptedSession)>,
        converter: PrefixConverter,
    ) -> RenderCoordinator<ScriptedSession, PrefixConverter> {
        let mut registry = TargetRegistry::new();
        for (name, session) in sessions {
            registry.insert(
                TargetSpec::for_app(name, "http://localhost:5000", dir),
                session,
            );
        }
        RenderCoordinator::new(registry, converter, RenderPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn first_request_runs_full_render() {
        let dir = tempfile::tempdir().unwrap();
        let (session, stats) = ScriptedSession::new(Duration::from_millis(200));
        let coordinator =
            coordinator_with(dir.path(), vec![("dash", session)], PrefixConverter::default());

        let outcome = assert_ok!(coordinator.try_request_render("dash").await);
        assert_eq!(outcome, RenderOutcome::Rendered);
        assert_eq!(stats.calls.load(Ordering::SeqCst), 1);

        let stored = std::fs::read(dir.path().join("dash.png")).unwrap();
        assert_eq!(stored, b"mono:raw:http://localhost:5000/dash/");

        let status = coordinator.status("dash").unwrap();
        assert_eq!(status.state, RenderState::Idle);
        assert!(status.last_render.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn request_within_interval_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (session, stats) = ScriptedSession::new(Duration::ZERO);
        let coordinator =
            coordinator_with(dir.path(), vec![("dash", session)], PrefixConverter::default());

        assert!(coordinator.request_render("dash").await);
        let rendered_at = coordinator.status("dash").unwrap().last_render;

        tokio::time::advance(Duration::from_secs(5)).await;
        let outcome = coordinator.try_request_render("dash").await.unwrap();

        assert_eq!(outcome, RenderOutcome::Cached);
        assert_eq!(stats.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.converter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.status("dash").unwrap().last_render, rendered_at);
    }

    #[tokio::test(start_paused = true)]
    async fn request_after_interval_renders_again() {
        let dir = tempfile::tempdir().unwrap();
        let (session, stats) = ScriptedSession::new(Duration::ZERO);
        let coordinator =
            coordinator_with(dir.path(), vec![("dash", session)], PrefixConverter::default());

        assert!(coordinator.request_render("dash").await);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(
            coordinator.try_request_render("dash").await.unwrap(),
            RenderOutcome::Rendered
        );
        assert_eq!(stats.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator_with(dir.path(), vec![], PrefixConverter::default());

        assert!(!coordinator.request_render("ghost").await);
        let err = coordinator.try_request_render("ghost").await.unwrap_err();
        assert!(matches!(err, RenderError::NotFound { name } if name == "ghost"));
    }

    #[tokio::test(start_paused = true)]
    async fn capture_timeout_without_previous_image_reports_no_image() {
        let dir = tempfile::tempdir().unwrap();
        // 会话比截图超时（30s）更慢
        let (session, _) = ScriptedSession::new(Duration::from_secs(45));
        let coordinator =
            coordinator_with(dir.path(), vec![("dash", session)], PrefixConverter::default());

        let started = Instant::now();
        let outcome = coordinator.try_request_render("dash").await.unwrap();

        assert_eq!(outcome, RenderOutcome::Failed { has_previous: false });
        assert!(!outcome.image_available());
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        let status = coordinator.status("dash").unwrap();
        assert_eq!(status.state, RenderState::Idle);
        assert!(status.last_render.is_none());
        assert!(!dir.path().join("dash.png").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failure_keeps_previous_image_servable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dash.png"), b"old image").unwrap();
        let (session, _) = ScriptedSession::new(Duration::ZERO);
        let session = session.then(Err(RenderError::Timeout {
            stage: RenderStage::Capture,
            after: Duration::from_secs(30),
        }));
        let coordinator =
            coordinator_with(dir.path(), vec![("dash", session)], PrefixConverter::default());

        assert!(coordinator.request_render("dash").await);
        assert_eq!(std::fs::read(dir.path().join("dash.png")).unwrap(), b"old image");
        assert!(coordinator.status("dash").unwrap().last_render.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_render_can_be_retried_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let (session, stats) = ScriptedSession::new(Duration::ZERO);
        let session = session.then(Err(RenderError::navigation(
            "http://localhost:5000/dash/",
            "net::ERR_CONNECTION_REFUSED",
        )));
        let coordinator =
            coordinator_with(dir.path(), vec![("dash", session)], PrefixConverter::default());

        assert!(!coordinator.request_render("dash").await);
        assert!(coordinator.request_render("dash").await);
        assert_eq!(stats.calls.load(Ordering::SeqCst), 2);
        assert!(coordinator.status("dash").unwrap().last_render.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn conversion_failure_is_treated_like_capture_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = ScriptedSession::new(Duration::ZERO);
        let converter = PrefixConverter {
            fail: true,
            ..Default::default()
        };
        let coordinator = coordinator_with(dir.path(), vec![("dash", session)], converter);

        let outcome = coordinator.try_request_render("dash").await.unwrap();
        assert_eq!(outcome, RenderOutcome::Failed { has_previous: false });
        let status = coordinator.status("dash").unwrap();
        assert_eq!(status.state, RenderState::Idle);
        assert!(status.last_render.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_a_single_render() {
        let dir = tempfile::tempdir().unwrap();
        let (session, stats) = ScriptedSession::new(Duration::from_secs(5));
        let coordinator = Arc::new(coordinator_with(
            dir.path(),
            vec![("dash", session)],
            PrefixConverter::default(),
        ));

        let requests = (0..10).map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.try_request_render("dash").await })
        });
        let outcomes: Vec<RenderOutcome> = join_all(requests)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(stats.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == RenderOutcome::Rendered)
                .count(),
            1
        );
        assert!(outcomes.iter().all(RenderOutcome::image_available));
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_gives_up_at_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let (session, stats) = ScriptedSession::new(Duration::from_secs(50));
        let mut registry = TargetRegistry::new();
        registry.insert(
            TargetSpec::for_app("dash", "http://localhost:5000", dir.path()),
            session,
        );
        let policy = RenderPolicy {
            capture_timeout: Duration::from_secs(90),
            ..RenderPolicy::default()
        };
        let coordinator = Arc::new(RenderCoordinator::new(
            registry,
            PrefixConverter::default(),
            policy,
        ));

        let renderer = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.try_request_render("dash").await })
        };
        // 让渲染者先进入 InProgress
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            coordinator.status("dash").unwrap().state,
            RenderState::InProgress
        );

        let started = Instant::now();
        let waited = coordinator.try_request_render("dash").await.unwrap();
        assert_eq!(waited, RenderOutcome::Joined { finished: false });
        assert_eq!(started.elapsed(), Duration::from_secs(35));

        // 放弃等待不影响进行中的渲染
        assert_eq!(renderer.await.unwrap().unwrap(), RenderOutcome::Rendered);
        assert_eq!(stats.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn render_survives_cancelled_initiator() {
        let dir = tempfile::tempdir().unwrap();
        let (session, stats) = ScriptedSession::new(Duration::from_secs(10));
        let coordinator = Arc::new(coordinator_with(
            dir.path(),
            vec![("dash", session)],
            PrefixConverter::default(),
        ));

        let initiator = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.try_request_render("dash").await })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.try_request_render("dash").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // 客户端断开：发起者的 future 被丢弃
        initiator.abort();
        assert!(initiator.await.unwrap_err().is_cancelled());
        assert_eq!(
            coordinator.status("dash").unwrap().state,
            RenderState::InProgress
        );

        let started = Instant::now();
        let waited = waiter.await.unwrap().unwrap();
        assert_eq!(waited, RenderOutcome::Joined { finished: true });
        assert!(started.elapsed() <= Duration::from_secs(8));

        let stored = std::fs::read(dir.path().join("dash.png")).unwrap();
        assert_eq!(stored, b"mono:raw:http://localhost:5000/dash/");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let status = coordinator.status("dash").unwrap();
        assert_eq!(status.state, RenderState::Idle);
        assert!(status.last_render.is_some());
        assert_eq!(stats.calls.load(Ordering::SeqCst), 1);

        // 刚完成的渲染对后续请求是有效缓存
        assert_eq!(
            coordinator.try_request_render("dash").await.unwrap(),
            RenderOutcome::Cached
        );
    }

    #[tokio::test(start_paused = true)]
    async fn different_targets_render_independently() {
        let dir = tempfile::tempdir().unwrap();
        let (dash, dash_stats) = ScriptedSession::new(Duration::from_secs(10));
        let (weather, weather_stats) = ScriptedSession::new(Duration::from_secs(10));
        let coordinator = coordinator_with(
            dir.path(),
            vec![("dash", dash), ("weather", weather)],
            PrefixConverter::default(),
        );

        let started = Instant::now();
        let (a, b) = tokio::join!(
            coordinator.try_request_render("dash"),
            coordinator.try_request_render("weather")
        );

        assert_eq!(a.unwrap(), RenderOutcome::Rendered);
        assert_eq!(b.unwrap(), RenderOutcome::Rendered);
        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(dash_stats.calls.load(Ordering::SeqCst), 1);
        assert_eq!(weather_stats.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.names(), ["dash".to_string(), "weather".to_string()]);
    }

    #[test]
    fn outcome_image_availability() {
        assert!(RenderOutcome::Cached.image_available());
        assert!(RenderOutcome::Rendered.image_available());
        assert!(RenderOutcome::Joined { finished: true }.image_available());
        assert!(!RenderOutcome::Joined { finished: false }.image_available());
        assert!(RenderOutcome::Failed { has_previous: true }.image_available());
        assert!(!RenderOutcome::Failed { has_previous: false }.image_available());
    }
}

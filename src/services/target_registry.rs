//! 渲染目标注册表
//!
//! 启动时一次性构建，由协调器持有；每个目标拥有自己的会话和状态

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::warn;

use crate::models::{RenderState, TargetSpec};

/// 目标的运行时状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetStatus {
    pub state: RenderState,
    /// 上次成功渲染的完成时间，从未成功时为 `None`
    pub last_render: Option<Instant>,
}

impl Default for TargetStatus {
    fn default() -> Self {
        Self {
            state: RenderState::Idle,
            last_render: None,
        }
    }
}

/// 单个渲染目标
pub struct RenderTarget<S> {
    pub(crate) spec: TargetSpec,
    pub(crate) session: S,
    pub(crate) status: watch::Sender<TargetStatus>,
}

impl<S> RenderTarget<S> {
    pub fn new(spec: TargetSpec, session: S) -> Self {
        let (status, _) = watch::channel(TargetStatus::default());
        Self {
            spec,
            session,
            status,
        }
    }

    pub fn spec(&self) -> &TargetSpec {
        &self.spec
    }

    pub fn status(&self) -> TargetStatus {
        *self.status.borrow()
    }
}

/// 目标注册表（保持注册顺序）
pub struct TargetRegistry<S> {
    targets: HashMap<String, Arc<RenderTarget<S>>>,
    order: Vec<String>,
}

impl<S> TargetRegistry<S> {
    pub fn new() -> Self {
        Self {
            targets: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// 注册目标，名称重复时忽略并返回 `false`
    pub fn insert(&mut self, spec: TargetSpec, session: S) -> bool {
        if self.targets.contains_key(&spec.name) {
            warn!("重复的渲染目标已忽略: {}", spec.name);
            return false;
        }
        self.order.push(spec.name.clone());
        self.targets
            .insert(spec.name.clone(), Arc::new(RenderTarget::new(spec, session)));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RenderTarget<S>>> {
        self.targets.get(name)
    }

    /// 按注册顺序返回目标名
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<S> Default for TargetRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// 物料主数据同步系统 - 进度事件
// ==========================================
// 职责: 定义进度事件与订阅 trait，核心逻辑不依赖任何界面绑定
// 约定: 每处理一行发出一次事件
// ==========================================

use crate::domain::types::ProgressStage;
use serde::{Deserialize, Serialize};

/// 进度事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// 当前行序号（1 起）
    pub current: usize,
    /// 本次处理总行数
    pub total: usize,
    pub stage: ProgressStage,
    /// 当前行的物料名称/编码
    pub current_record: Option<String>,
}

// ==========================================
// 进度订阅 Trait
// ==========================================

/// 进度订阅者
///
/// 闭包 `FnMut(&ProgressEvent)` 自动实现此 trait
pub trait ProgressSink {
    fn on_progress(&mut self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressEvent),
{
    fn on_progress(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// 空操作订阅者
///
/// 用于不关心进度的调用方（如命令行 dry-run、单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn on_progress(&mut self, event: &ProgressEvent) {
        tracing::trace!(
            current = event.current,
            total = event.total,
            stage = %event.stage,
            "NoOpProgressSink: 忽略进度事件"
        );
    }
}

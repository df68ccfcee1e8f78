// ==========================================
// 进口散货分配系统 - 告警事件发布
// ==========================================
// 职责: 定义告警发布 trait，由外部通知渠道（短信/看板等）实现
// 说明: 引擎与 API 层只依赖 trait，不依赖具体渠道
// ==========================================

use crate::domain::alert::Alert;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 告警事件类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertEventType {
    /// 新开告警
    Opened,
    /// 已开告警被再次命中（刷新时间/等级）
    Refreshed,
    /// 条件解除
    Resolved,
}

impl AlertEventType {
    pub fn as_str(&self) -> &str {
        match self {
            AlertEventType::Opened => "Opened",
            AlertEventType::Refreshed => "Refreshed",
            AlertEventType::Resolved => "Resolved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub event_type: AlertEventType,
    pub alert: Alert,
}

impl AlertEvent {
    pub fn new(event_type: AlertEventType, alert: Alert) -> Self {
        Self { event_type, alert }
    }
}

// ==========================================
// 发布 Trait
// ==========================================

/// 告警发布者
///
/// # 返回
/// - `Ok(message_id)`: 渠道消息 ID（如果支持）或空字符串
pub trait AlertPublisher: Send + Sync {
    fn publish(&self, event: &AlertEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作发布者（默认）
#[derive(Debug, Clone, Default)]
pub struct NoOpAlertPublisher;

impl AlertPublisher for NoOpAlertPublisher {
    fn publish(&self, event: &AlertEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpAlertPublisher: 跳过告警发布 - alert_id={}, event_type={}",
            event.alert.alert_id,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 可选的告警发布者包装
pub struct OptionalAlertPublisher {
    inner: Option<Arc<dyn AlertPublisher>>,
}

impl OptionalAlertPublisher {
    pub fn with_publisher(publisher: Arc<dyn AlertPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布失败只记日志，不影响告警落库
    pub fn publish(&self, event: &AlertEvent) {
        match &self.inner {
            Some(publisher) => {
                if let Err(e) = publisher.publish(event) {
                    tracing::warn!(
                        alert_id = %event.alert.alert_id,
                        event_type = event.event_type.as_str(),
                        error = %e,
                        "告警发布失败"
                    );
                }
            }
            None => {
                tracing::debug!(
                    "OptionalAlertPublisher: 未配置发布者，跳过 - alert_id={}, event_type={}",
                    event.alert.alert_id,
                    event.event_type.as_str()
                );
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalAlertPublisher {
    fn default() -> Self {
        Self::none()
    }
}

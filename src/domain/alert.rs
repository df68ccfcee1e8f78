// ==========================================
// 进口散货分配系统 - 告警领域模型
// ==========================================
// 红线: 同一 (地点, 物料, 类型) 最多一条未关闭告警
// ==========================================

use crate::domain::types::{AlertLevel, AlertType, Material};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub location_code: String,
    pub material: Option<Material>, // 拥堵告警无物料维度
    pub alert_type: AlertType,
    pub level: AlertLevel,
    pub message: String,
    pub metric_value: Option<f64>, // 触发时的指标值（可用天数/拥堵指数/剩余天数）
    pub opened_at: NaiveDateTime,
    pub last_seen_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    /// 幂等键
    pub fn dedup_key(&self) -> (String, Option<Material>, AlertType) {
        (self.location_code.clone(), self.material, self.alert_type)
    }
}

/// 规则引擎对单个 (地点, 物料, 类型) 的判定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    pub location_code: String,
    pub material: Option<Material>,
    pub alert_type: AlertType,
    pub level: AlertLevel, // Normal 表示条件已解除
    pub message: String,
    pub metric_value: Option<f64>,
}

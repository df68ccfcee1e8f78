// ==========================================
// 进口散货分配系统 - 库存台账领域模型
// ==========================================
// 红线: 库存只由事件折叠得出，不存独立可写的快照字段
// ==========================================

use crate::domain::types::Material;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// StockEvent - 库存事件
// ==========================================
// 入库为正，消耗为负
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEvent {
    pub location_code: String,
    pub material: Material,
    pub seq_no: i64,                // 同一 (地点, 物料) 内单调递增的序号
    pub quantity_t: f64,            // 带符号吨位
    pub event_ts: NaiveDateTime,    // 业务发生时间
    pub recorded_at: NaiveDateTime, // 写入时间
}

// ==========================================
// StockRecord - 某地点某物料的事件序列
// ==========================================
// events 按 (event_ts, seq_no) 排序；同一时间戳按写入顺序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub location_code: String,
    pub material: Material,
    pub events: Vec<StockEvent>,
}

impl StockRecord {
    pub fn empty(location_code: &str, material: Material) -> Self {
        Self {
            location_code: location_code.to_string(),
            material,
            events: Vec::new(),
        }
    }

    /// 当前库存 = 全部事件之和
    pub fn current_stock_t(&self) -> f64 {
        self.events.iter().map(|e| e.quantity_t).sum()
    }

    /// 截至某时刻（含）的库存
    pub fn stock_as_of(&self, as_of: NaiveDateTime) -> f64 {
        self.events
            .iter()
            .filter(|e| e.event_ts <= as_of)
            .map(|e| e.quantity_t)
            .sum()
    }

    /// 截至某日日终（含当日全部事件）的库存
    pub fn stock_through(&self, date: NaiveDate) -> f64 {
        self.events
            .iter()
            .filter(|e| e.event_ts.date() <= date)
            .map(|e| e.quantity_t)
            .sum()
    }

    /// 最新序号（版本号）；无事件时为 0
    pub fn version(&self) -> i64 {
        self.events.iter().map(|e| e.seq_no).max().unwrap_or(0)
    }
}

// ==========================================
// 进口散货分配系统 - 规划状态快照
// ==========================================
// 职责: 一次优化运行所读取的只读状态视图
// 红线: 优化期间快照不可变；引擎只通过 PlanningState 读取状态
// ==========================================

use crate::domain::capacity::{CapacityEntry, CapacityLocation};
use crate::domain::network::NetworkModel;
use crate::domain::stock::StockRecord;
use crate::domain::types::Material;
use chrono::NaiveDate;
use std::collections::BTreeMap;

// ==========================================
// Trait: PlanningState
// ==========================================
// 实现者: PlanningSnapshot（基线）、OverlayView（情景叠加）
pub trait PlanningState: Send + Sync {
    fn network(&self) -> &NetworkModel;

    /// 某日某地点的能力登记；None 表示缺失（按 0 能力处理并告警）
    fn capacity_entry(&self, date: NaiveDate, location: &CapacityLocation) -> Option<&CapacityEntry>;

    /// 当前库存（截至快照基准日的事件折叠）
    fn current_stock_t(&self, location_code: &str, material: Material) -> f64;

    /// 钢厂日耗；未知或为 0 时为 None
    fn daily_rate(&self, plant_code: &str, material: Material) -> Option<f64>;
}

// ==========================================
// CapacitySnapshot - 能力登记快照
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CapacitySnapshot {
    entries: BTreeMap<(NaiveDate, CapacityLocation), CapacityEntry>,
}

impl CapacitySnapshot {
    /// 同键多条时后者覆盖前者
    pub fn from_entries(entries: Vec<CapacityEntry>) -> Self {
        let mut snapshot = Self::default();
        for entry in entries {
            snapshot.insert(entry);
        }
        snapshot
    }

    pub fn insert(&mut self, entry: CapacityEntry) {
        self.entries
            .insert((entry.entry_date, entry.location.clone()), entry);
    }

    pub fn get(&self, date: NaiveDate, location: &CapacityLocation) -> Option<&CapacityEntry> {
        self.entries.get(&(date, location.clone()))
    }

    /// 某日全部登记（按地点键排序）
    pub fn entries_on(&self, date: NaiveDate) -> impl Iterator<Item = &CapacityEntry> {
        self.entries
            .iter()
            .filter(move |((d, _), _)| *d == date)
            .map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapacityEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==========================================
// StockSnapshot - 库存事件快照
// ==========================================
// as_of 为 None 时折叠全部事件；否则只计入基准日日终之前的事件
#[derive(Debug, Clone, Default)]
pub struct StockSnapshot {
    records: BTreeMap<(String, Material), StockRecord>,
    as_of: Option<NaiveDate>,
}

impl StockSnapshot {
    pub fn from_records(records: Vec<StockRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| ((r.location_code.clone(), r.material), r))
                .collect(),
            as_of: None,
        }
    }

    /// 以基准日截断的快照（晚于基准日的事件不计入）
    pub fn from_records_as_of(records: Vec<StockRecord>, as_of: NaiveDate) -> Self {
        Self {
            as_of: Some(as_of),
            ..Self::from_records(records)
        }
    }

    pub fn as_of(&self) -> Option<NaiveDate> {
        self.as_of
    }

    pub fn record(&self, location_code: &str, material: Material) -> Option<&StockRecord> {
        self.records.get(&(location_code.to_string(), material))
    }

    pub fn current_stock_t(&self, location_code: &str, material: Material) -> f64 {
        self.record(location_code, material)
            .map(|r| match self.as_of {
                Some(date) => r.stock_through(date),
                None => r.current_stock_t(),
            })
            .unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StockRecord> {
        self.records.values()
    }
}

// ==========================================
// PlanningSnapshot - 基线快照
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct PlanningSnapshot {
    pub network: NetworkModel,
    pub capacity: CapacitySnapshot,
    pub stock: StockSnapshot,
}

impl PlanningSnapshot {
    pub fn new(network: NetworkModel, capacity: CapacitySnapshot, stock: StockSnapshot) -> Self {
        Self {
            network,
            capacity,
            stock,
        }
    }
}

impl PlanningState for PlanningSnapshot {
    fn network(&self) -> &NetworkModel {
        &self.network
    }

    fn capacity_entry(&self, date: NaiveDate, location: &CapacityLocation) -> Option<&CapacityEntry> {
        self.capacity.get(date, location)
    }

    fn current_stock_t(&self, location_code: &str, material: Material) -> f64 {
        self.stock.current_stock_t(location_code, material)
    }

    fn daily_rate(&self, plant_code: &str, material: Material) -> Option<f64> {
        self.network
            .plant(plant_code)
            .and_then(|p| p.daily_rate(material))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stock::StockEvent;

    fn record(events: &[(u32, f64)]) -> StockRecord {
        let events = events
            .iter()
            .enumerate()
            .map(|(i, (day, quantity_t))| {
                let ts = NaiveDate::from_ymd_opt(2026, 3, *day)
                    .unwrap()
                    .and_hms_opt(6, 0, 0)
                    .unwrap();
                StockEvent {
                    location_code: "RSP".to_string(),
                    material: Material::CokingCoal,
                    seq_no: i as i64 + 1,
                    quantity_t: *quantity_t,
                    event_ts: ts,
                    recorded_at: ts,
                }
            })
            .collect();
        StockRecord {
            location_code: "RSP".to_string(),
            material: Material::CokingCoal,
            events,
        }
    }

    #[test]
    fn test_future_events_excluded_at_as_of() {
        let records = vec![record(&[(1, 40_000.0), (3, -2_000.0), (25, -20_000.0)])];

        let all = StockSnapshot::from_records(records.clone());
        assert_eq!(all.current_stock_t("RSP", Material::CokingCoal), 18_000.0);

        let day3 = StockSnapshot::from_records_as_of(records, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        assert_eq!(day3.current_stock_t("RSP", Material::CokingCoal), 38_000.0);
        assert_eq!(day3.current_stock_t("BSP", Material::CokingCoal), 0.0);
    }
}

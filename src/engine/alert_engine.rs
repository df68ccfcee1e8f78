// ==========================================
// 进口散货分配系统 - 告警规则引擎
// ==========================================
// 状态机 (每个 地点+物料+类型):
//   Normal → Warning   可用天数 < 最低天数
//   Warning → Critical 可用天数 < 最低天数 × critical_cover_ratio
//   条件解除时回到 Normal（已打开的告警关闭）
// 其他规则:
//   - HighCongestion: 港口 as_of 日拥堵指数 >= 阈值
//   - UrgentRequest: 未分配船货距 required_by 不足 N 天
// 红线: 可用天数无定义时不能告警（不是 Critical）
// 职责: 只产出判定，落库与去重由告警仓储完成
// ==========================================

use crate::config::PlanningConfig;
use crate::domain::alert::AlertCondition;
use crate::domain::capacity::CapacityLocation;
use crate::domain::shipment::Shipment;
use crate::domain::types::{AlertLevel, AlertType, Material};
use crate::engine::snapshot::PlanningState;
use crate::engine::stock_ledger::StockLedger;
use chrono::NaiveDate;
use tracing::{debug, instrument};

pub struct AlertRuleEngine {
    ledger: StockLedger,
}

impl AlertRuleEngine {
    pub fn new() -> Self {
        Self {
            ledger: StockLedger::new(),
        }
    }

    /// 评估全部规则；返回的判定中 level = Normal 表示应关闭对应告警
    #[instrument(skip(self, state, shipments, config), fields(as_of = %as_of_date))]
    pub fn evaluate<S: PlanningState + ?Sized>(
        &self,
        state: &S,
        as_of_date: NaiveDate,
        shipments: &[Shipment],
        config: &PlanningConfig,
    ) -> Vec<AlertCondition> {
        let mut conditions = self.evaluate_days_cover(state, config);
        conditions.extend(self.evaluate_congestion(state, as_of_date, config));
        conditions.extend(self.evaluate_urgent_requests(as_of_date, shipments, config));

        debug!(
            total = conditions.len(),
            active = conditions.iter().filter(|c| c.level != AlertLevel::Normal).count(),
            "告警规则评估完成"
        );
        conditions
    }

    /// 钢厂库存可用天数
    pub fn evaluate_days_cover<S: PlanningState + ?Sized>(
        &self,
        state: &S,
        config: &PlanningConfig,
    ) -> Vec<AlertCondition> {
        let mut out = Vec::new();
        for plant in state.network().plants.values() {
            for material in Material::ALL {
                let days_cover = self.ledger.days_cover(state, &plant.plant_code, material);
                let level = match StockLedger::cover_level(
                    days_cover,
                    plant.min_days_cover,
                    config.critical_cover_ratio,
                ) {
                    Some(level) => level,
                    None => continue,
                };
                let cover = days_cover.unwrap_or_default();
                out.push(AlertCondition {
                    location_code: plant.plant_code.clone(),
                    material: Some(material),
                    alert_type: AlertType::LowDaysCover,
                    level,
                    message: format!(
                        "{} {} 可用 {:.1} 天（最低 {:.1} 天）",
                        plant.plant_code, material, cover, plant.min_days_cover
                    ),
                    metric_value: Some(cover),
                });
            }
        }
        out
    }

    /// 港口拥堵；缺少当日登记的港口不产出判定（见 undetermined_congestion_ports）
    pub fn evaluate_congestion<S: PlanningState + ?Sized>(
        &self,
        state: &S,
        as_of_date: NaiveDate,
        config: &PlanningConfig,
    ) -> Vec<AlertCondition> {
        state
            .network()
            .ports
            .values()
            .filter_map(|port| {
                let entry = state.capacity_entry(as_of_date, &CapacityLocation::port(&port.port_code))?;
                let ci = entry.congestion_index();
                let level = if ci >= config.congestion_alert_threshold {
                    AlertLevel::Warning
                } else {
                    AlertLevel::Normal
                };
                Some(AlertCondition {
                    location_code: port.port_code.clone(),
                    material: None,
                    alert_type: AlertType::HighCongestion,
                    level,
                    message: format!(
                        "{} {} 拥堵指数 {:.2}（阈值 {:.2}）",
                        port.port_code, as_of_date, ci, config.congestion_alert_threshold
                    ),
                    metric_value: Some(ci),
                })
            })
            .collect()
    }

    /// 当日缺少能力登记、无法判定拥堵的港口；其已打开的告警保持原状
    pub fn undetermined_congestion_ports<S: PlanningState + ?Sized>(
        &self,
        state: &S,
        as_of_date: NaiveDate,
    ) -> Vec<String> {
        state
            .network()
            .ports
            .values()
            .filter(|port| {
                state
                    .capacity_entry(as_of_date, &CapacityLocation::port(&port.port_code))
                    .is_none()
            })
            .map(|port| port.port_code.clone())
            .collect()
    }

    /// 临近 required_by 仍未分配的船货（已逾期为 Critical）
    pub fn evaluate_urgent_requests(
        &self,
        as_of_date: NaiveDate,
        shipments: &[Shipment],
        config: &PlanningConfig,
    ) -> Vec<AlertCondition> {
        shipments
            .iter()
            .filter(|s| s.status.is_plannable())
            .map(|s| {
                let days_left = (s.required_by - as_of_date).num_days();
                let level = if s.is_allocated() || days_left > config.urgent_request_days {
                    AlertLevel::Normal
                } else if days_left <= 0 {
                    AlertLevel::Critical
                } else {
                    AlertLevel::Warning
                };
                AlertCondition {
                    location_code: s.shipment_id.clone(),
                    material: Some(s.material),
                    alert_type: AlertType::UrgentRequest,
                    level,
                    message: format!(
                        "船货 {} ({:.0}t) 距要求到厂日 {} 还有 {} 天，尚未分配",
                        s.shipment_id, s.quantity_t, s.required_by, days_left
                    ),
                    metric_value: Some(days_left as f64),
                }
            })
            .collect()
    }
}

impl Default for AlertRuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::network::{NetworkModel, Plant};
    use crate::domain::types::ShipmentStatus;
    use crate::engine::snapshot::{CapacitySnapshot, PlanningSnapshot, StockSnapshot};
    use crate::domain::stock::{StockEvent, StockRecord};
    use std::collections::BTreeMap;

    fn snapshot_with_stock(stock_t: f64) -> PlanningSnapshot {
        let mut rates = BTreeMap::new();
        rates.insert(Material::CokingCoal, 3_500.0);
        let plant = Plant {
            plant_code: "BSP".to_string(),
            plant_name: "Bhilai".to_string(),
            latitude: 21.2,
            longitude: 81.4,
            consumption_rates: rates,
            min_days_cover: 15.0,
            target_days_cover: 30.0,
        };
        let ts = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_hms_opt(6, 0, 0).unwrap();
        let record = StockRecord {
            location_code: "BSP".to_string(),
            material: Material::CokingCoal,
            events: vec![StockEvent {
                location_code: "BSP".to_string(),
                material: Material::CokingCoal,
                seq_no: 1,
                quantity_t: stock_t,
                event_ts: ts,
                recorded_at: ts,
            }],
        };
        PlanningSnapshot::new(
            NetworkModel::new(vec![plant], vec![], vec![], vec![], vec![]),
            CapacitySnapshot::default(),
            StockSnapshot::from_records(vec![record]),
        )
    }

    #[test]
    fn test_days_cover_alert_levels() {
        let engine = AlertRuleEngine::new();
        let config = PlanningConfig::default();

        let healthy = engine.evaluate_days_cover(&snapshot_with_stock(195_000.0), &config);
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].level, AlertLevel::Normal);

        let low = engine.evaluate_days_cover(&snapshot_with_stock(45_000.0), &config);
        assert_eq!(low[0].level, AlertLevel::Warning);
        assert!((low[0].metric_value.unwrap() - 12.857).abs() < 1e-3);

        // 15 × 0.66 = 9.9 天 ⇒ 30,000t / 3,500 = 8.57 天为 Critical
        let critical = engine.evaluate_days_cover(&snapshot_with_stock(30_000.0), &config);
        assert_eq!(critical[0].level, AlertLevel::Critical);
    }

    #[test]
    fn test_unknown_rate_never_alerts() {
        let engine = AlertRuleEngine::new();
        let conditions = engine.evaluate_days_cover(&snapshot_with_stock(0.0), &PlanningConfig::default());
        // 只有炼焦煤有日耗；石灰石不产生判定
        assert!(conditions.iter().all(|c| c.material == Some(Material::CokingCoal)));
    }

    #[test]
    fn test_urgent_request_levels() {
        let engine = AlertRuleEngine::new();
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let mk = |id: &str, day: u32| Shipment {
            shipment_id: id.to_string(),
            material: Material::Limestone,
            quantity_t: 40_000.0,
            vessel_code: "V1".to_string(),
            supplier_port: "MINA_SAQR".to_string(),
            required_by: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            eta: None,
            status: ShipmentStatus::Scheduled,
            splits: vec![],
        };
        let conditions = engine.evaluate_urgent_requests(
            as_of,
            &[mk("S-LATE", 9), mk("S-SOON", 12), mk("S-FINE", 30)],
            &PlanningConfig::default(),
        );
        let levels: Vec<AlertLevel> = conditions.iter().map(|c| c.level).collect();
        assert_eq!(levels, vec![AlertLevel::Critical, AlertLevel::Warning, AlertLevel::Normal]);
    }
}

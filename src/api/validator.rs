// ==========================================
// 进口散货分配系统 - 输入校验器
// ==========================================
// 职责: 优化前的船货批次校验、能力登记与库存事件的输入校验
// 红线: 批次中任一条不合法则整批拒绝，不做部分处理
// ==========================================

use std::collections::BTreeSet;

use crate::api::error::{ApiError, ApiResult, ValidationViolation};
use crate::domain::capacity::{CapacityEntry, CapacityLocation, CapacityValues};
use crate::domain::network::NetworkModel;
use crate::domain::shipment::{Shipment, MIN_SHIPMENT_QUANTITY_T};
use crate::repository::stock_ledger_repo::NewStockEvent;

// ==========================================
// PlanningInputValidator - 输入校验器
// ==========================================

/// 输入校验器
///
/// 职责：
/// 1. 船货批次：吨位为正、船舶已登记、状态仍可分配、ID 不重复
/// 2. 能力登记：地点已登记、资源类型与地点一致、数值非负
/// 3. 库存事件：地点已登记、吨位为有限非零数
#[derive(Debug, Clone, Default)]
pub struct PlanningInputValidator;

impl PlanningInputValidator {
    pub fn new() -> Self {
        Self
    }

    /// 校验一个待优化的船货批次
    ///
    /// # 返回
    /// - Ok(()): 全部合法
    /// - Err(ApiError::ShipmentValidationError): 带逐条违规原因
    pub fn validate_shipments(&self, shipments: &[Shipment], network: &NetworkModel) -> ApiResult<()> {
        let violations = self.collect_shipment_violations(shipments, network);
        if violations.is_empty() {
            return Ok(());
        }

        let offending: BTreeSet<&str> = violations.iter().map(|v| v.shipment_id.as_str()).collect();
        tracing::warn!(
            violations = violations.len(),
            shipments = offending.len(),
            "船货批次校验失败，整批拒绝"
        );
        Err(ApiError::ShipmentValidationError {
            reason: format!("{}条船货存在{}处违规", offending.len(), violations.len()),
            violations,
        })
    }

    fn collect_shipment_violations(
        &self,
        shipments: &[Shipment],
        network: &NetworkModel,
    ) -> Vec<ValidationViolation> {
        let mut violations = Vec::new();
        let mut seen = BTreeSet::new();

        for shipment in shipments {
            let id = shipment.shipment_id.as_str();

            if id.trim().is_empty() {
                violations.push(violation("EMPTY_ID", id, "船货ID不能为空".to_string(), None));
            } else if !seen.insert(id) {
                violations.push(violation("DUPLICATE_ID", id, format!("船货ID {} 在批次中重复", id), None));
            }

            if !shipment.quantity_t.is_finite() || shipment.quantity_t < MIN_SHIPMENT_QUANTITY_T {
                violations.push(violation(
                    "QUANTITY",
                    id,
                    format!(
                        "吨位必须不小于 {} 吨，实际 {}",
                        MIN_SHIPMENT_QUANTITY_T, shipment.quantity_t
                    ),
                    Some(serde_json::json!({ "quantity_t": shipment.quantity_t })),
                ));
            }

            match network.vessel(&shipment.vessel_code) {
                None => violations.push(violation(
                    "UNKNOWN_VESSEL",
                    id,
                    format!("船舶 {} 未登记", shipment.vessel_code),
                    None,
                )),
                Some(vessel) if vessel.capacity_t > 0.0 && shipment.quantity_t > vessel.capacity_t => {
                    violations.push(violation(
                        "QUANTITY",
                        id,
                        format!(
                            "吨位 {:.0} 超出船舶 {} 载货量 {:.0}",
                            shipment.quantity_t, vessel.vessel_code, vessel.capacity_t
                        ),
                        Some(serde_json::json!({
                            "quantity_t": shipment.quantity_t,
                            "vessel_capacity_t": vessel.capacity_t,
                        })),
                    ))
                }
                Some(_) => {}
            }

            if !shipment.status.is_plannable() {
                violations.push(violation(
                    "STATUS",
                    id,
                    format!("状态 {} 的船货不能参与分配", shipment.status),
                    Some(serde_json::json!({ "status": shipment.status })),
                ));
            }
        }

        violations
    }

    /// 校验一条能力登记
    pub fn validate_capacity_entry(&self, entry: &CapacityEntry, network: &NetworkModel) -> ApiResult<()> {
        if !entry.is_consistent() {
            return Err(ApiError::ValidationError(format!(
                "地点 {} 与资源类型不一致",
                entry.location.key()
            )));
        }

        match &entry.location {
            CapacityLocation::Port { port_code } => {
                if network.port(port_code).is_none() {
                    return Err(ApiError::ValidationError(format!("港口 {} 未登记", port_code)));
                }
            }
            CapacityLocation::Route { port_code, plant_code } => {
                if network.route(port_code, plant_code).is_none() {
                    return Err(ApiError::ValidationError(format!(
                        "铁路线路 {} → {} 未登记",
                        port_code, plant_code
                    )));
                }
            }
        }

        if let CapacityValues::Port {
            stockyard_t,
            congestion_index,
            ..
        } = entry.values
        {
            if !stockyard_t.is_finite() || stockyard_t < 0.0 {
                return Err(ApiError::ValidationError(format!(
                    "堆场吨位必须为非负数，实际 {}",
                    stockyard_t
                )));
            }
            if !congestion_index.is_finite() || congestion_index < 0.0 {
                return Err(ApiError::ValidationError(format!(
                    "拥堵指数必须为非负数，实际 {}",
                    congestion_index
                )));
            }
        }

        Ok(())
    }

    /// 校验一条库存事件（地点可以是钢厂或港口）
    pub fn validate_stock_event(&self, event: &NewStockEvent, network: &NetworkModel) -> ApiResult<()> {
        let code = event.location_code.as_str();
        if network.plant(code).is_none() && network.port(code).is_none() {
            return Err(ApiError::ValidationError(format!("地点 {} 未登记", code)));
        }
        if !event.quantity_t.is_finite() || event.quantity_t == 0.0 {
            return Err(ApiError::ValidationError(format!(
                "库存事件吨位必须为非零有限数，实际 {}",
                event.quantity_t
            )));
        }
        Ok(())
    }
}

fn violation(
    violation_type: &str,
    shipment_id: &str,
    reason: String,
    details: Option<serde_json::Value>,
) -> ValidationViolation {
    ValidationViolation {
        violation_type: violation_type.to_string(),
        shipment_id: shipment_id.to_string(),
        reason,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::network::{Port, Vessel};
    use crate::domain::money::Money;
    use crate::domain::types::{Material, ShipmentStatus};
    use chrono::NaiveDate;

    fn network() -> NetworkModel {
        let mut network = NetworkModel::default();
        network.ports.insert(
            "VIZAG".to_string(),
            Port {
                port_code: "VIZAG".to_string(),
                port_name: "Visakhapatnam".to_string(),
                latitude: 17.69,
                longitude: 83.29,
                max_draft_m: 18.0,
                stockyard_capacity_t: 100_000.0,
                berths: 4,
                free_storage_days: 3.0,
                handling_rate: Money::inr(250.0),
                storage_rate_per_day: Money::inr(12.0),
                port_dues_rate: Money::inr(40.0),
            },
        );
        network.vessels.insert(
            "CAPE1".to_string(),
            Vessel {
                vessel_code: "CAPE1".to_string(),
                vessel_name: "Cape One".to_string(),
                draft_m: 16.2,
                capacity_t: 80_000.0,
            },
        );
        network
    }

    fn shipment(id: &str, quantity_t: f64, status: ShipmentStatus) -> Shipment {
        Shipment {
            shipment_id: id.to_string(),
            material: Material::CokingCoal,
            quantity_t,
            vessel_code: "CAPE1".to_string(),
            supplier_port: "GLADSTONE".to_string(),
            required_by: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            eta: None,
            status,
            splits: vec![],
        }
    }

    #[test]
    fn test_valid_batch_passes() {
        let validator = PlanningInputValidator::new();
        let batch = vec![
            shipment("S1", 75_000.0, ShipmentStatus::Scheduled),
            shipment("S2", 40_000.0, ShipmentStatus::Draft),
        ];
        assert!(validator.validate_shipments(&batch, &network()).is_ok());
    }

    #[test]
    fn test_whole_batch_rejected_with_reasons() {
        let validator = PlanningInputValidator::new();
        let mut unknown_vessel = shipment("S3", 10_000.0, ShipmentStatus::Scheduled);
        unknown_vessel.vessel_code = "GHOST".to_string();
        let batch = vec![
            shipment("S1", 75_000.0, ShipmentStatus::Scheduled),
            shipment("S2", -5.0, ShipmentStatus::Scheduled),
            shipment("S1", 10_000.0, ShipmentStatus::Delivered),
            unknown_vessel,
        ];

        match validator.validate_shipments(&batch, &network()) {
            Err(ApiError::ShipmentValidationError { violations, .. }) => {
                let kinds: Vec<&str> = violations.iter().map(|v| v.violation_type.as_str()).collect();
                assert!(kinds.contains(&"QUANTITY"));
                assert!(kinds.contains(&"DUPLICATE_ID"));
                assert!(kinds.contains(&"STATUS"));
                assert!(kinds.contains(&"UNKNOWN_VESSEL"));
            }
            other => panic!("Expected ShipmentValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_quantity_above_vessel_capacity() {
        let validator = PlanningInputValidator::new();
        let batch = vec![shipment("S1", 90_000.0, ShipmentStatus::Scheduled)];
        assert!(validator.validate_shipments(&batch, &network()).is_err());
    }

    #[test]
    fn test_sub_kilogram_quantity_rejected() {
        let validator = PlanningInputValidator::new();
        let batch = vec![
            shipment("S1", 40_000.0, ShipmentStatus::Scheduled),
            shipment("S-TINY", 0.0004, ShipmentStatus::Scheduled),
        ];

        match validator.validate_shipments(&batch, &network()) {
            Err(ApiError::ShipmentValidationError { violations, .. }) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].shipment_id, "S-TINY");
                assert_eq!(violations[0].violation_type, "QUANTITY");
            }
            other => panic!("Expected ShipmentValidationError, got {:?}", other),
        }

        let one_kg = vec![shipment("S2", MIN_SHIPMENT_QUANTITY_T, ShipmentStatus::Scheduled)];
        assert!(validator.validate_shipments(&one_kg, &network()).is_ok());
    }

    #[test]
    fn test_stock_event_location_must_exist() {
        let validator = PlanningInputValidator::new();
        let ts = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let ok = NewStockEvent {
            location_code: "VIZAG".to_string(),
            material: Material::Limestone,
            quantity_t: -1_200.0,
            event_ts: ts,
        };
        assert!(validator.validate_stock_event(&ok, &network()).is_ok());

        let unknown = NewStockEvent {
            location_code: "NOWHERE".to_string(),
            ..ok.clone()
        };
        assert!(validator.validate_stock_event(&unknown, &network()).is_err());

        let zero = NewStockEvent { quantity_t: 0.0, ..ok };
        assert!(validator.validate_stock_event(&zero, &network()).is_err());
    }
}

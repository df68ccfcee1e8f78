// ==========================================
// 进口散货分配系统 - 船货领域模型
// ==========================================
// 红线: 分拆吨位之和必须等于船货吨位
// ==========================================

use crate::domain::types::{Material, ShipmentStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 吨位比较容差（1 千克）
pub const TONNAGE_EPSILON_T: f64 = 1e-3;

/// 最小可分配吨位（求解以千克为单位）
pub const MIN_SHIPMENT_QUANTITY_T: f64 = 1e-3;

// ==========================================
// ShipmentSplit - 分拆腿
// ==========================================
// 一条腿 = (卸货港, 卸货日期, 目标钢厂, 吨位)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentSplit {
    pub port_code: String,
    pub discharge_date: NaiveDate,
    pub plant_code: String,
    pub tonnage_t: f64,
}

// ==========================================
// Shipment - 船货
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub shipment_id: String,
    pub material: Material,
    pub quantity_t: f64,
    pub vessel_code: String,
    pub supplier_port: String,      // 装货港（境外）
    pub required_by: NaiveDate,     // 要求到厂日期
    pub eta: Option<NaiveDate>,     // 登记的预计抵港日期
    pub status: ShipmentStatus,
    pub splits: Vec<ShipmentSplit>, // 已分配时非空
}

impl Shipment {
    pub fn allocated_tonnage_t(&self) -> f64 {
        self.splits.iter().map(|s| s.tonnage_t).sum()
    }

    /// 已分配 ⇔ 分拆非空且吨位之和与船货吨位一致
    pub fn is_allocated(&self) -> bool {
        !self.splits.is_empty()
            && (self.allocated_tonnage_t() - self.quantity_t).abs() <= TONNAGE_EPSILON_T
    }

    /// 校验一组分拆是否可写入本船货
    pub fn check_splits(&self, splits: &[ShipmentSplit]) -> Result<(), String> {
        if splits.is_empty() {
            return Err(format!("船货 {} 的分拆列表为空", self.shipment_id));
        }
        if let Some(bad) = splits.iter().find(|s| !(s.tonnage_t > 0.0)) {
            return Err(format!(
                "船货 {} 存在非正吨位分拆: port={}, plant={}, tonnage_t={}",
                self.shipment_id, bad.port_code, bad.plant_code, bad.tonnage_t
            ));
        }
        let total: f64 = splits.iter().map(|s| s.tonnage_t).sum();
        if (total - self.quantity_t).abs() > TONNAGE_EPSILON_T {
            return Err(format!(
                "船货 {} 分拆吨位之和 {:.3} 与船货吨位 {:.3} 不一致",
                self.shipment_id, total, self.quantity_t
            ));
        }
        Ok(())
    }
}

// ==========================================
// EtaEstimate - 预计抵港（外部延误预测的输入接口）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaEstimate {
    pub shipment_id: String,
    pub eta: NaiveDate,
    pub delay_days: i64, // 相对登记 ETA 的延误天数
    pub source: String,  // 估计来源 (SCHEDULE / 外部模型名)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shipment(quantity_t: f64) -> Shipment {
        Shipment {
            shipment_id: "SH-1".to_string(),
            material: Material::CokingCoal,
            quantity_t,
            vessel_code: "V1".to_string(),
            supplier_port: "GLADSTONE".to_string(),
            required_by: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            eta: None,
            status: ShipmentStatus::Scheduled,
            splits: vec![],
        }
    }

    fn split(port: &str, plant: &str, tonnage_t: f64) -> ShipmentSplit {
        ShipmentSplit {
            port_code: port.to_string(),
            discharge_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            plant_code: plant.to_string(),
            tonnage_t,
        }
    }

    #[test]
    fn test_splits_must_sum_to_quantity() {
        let s = shipment(75_000.0);
        assert!(s.check_splits(&[split("VIZAG", "BSP", 40_000.0), split("VIZAG", "RSP", 35_000.0)]).is_ok());
        assert!(s.check_splits(&[split("VIZAG", "BSP", 70_000.0)]).is_err());
        assert!(s.check_splits(&[]).is_err());
        assert!(s.check_splits(&[split("VIZAG", "BSP", 75_000.0), split("VIZAG", "RSP", 0.0)]).is_err());
    }

    #[test]
    fn test_is_allocated_requires_consistent_splits() {
        let mut s = shipment(75_000.0);
        assert!(!s.is_allocated());
        s.splits = vec![split("VIZAG", "BSP", 75_000.0)];
        assert!(s.is_allocated());
        s.splits = vec![split("VIZAG", "BSP", 74_000.0)];
        assert!(!s.is_allocated());
    }
}

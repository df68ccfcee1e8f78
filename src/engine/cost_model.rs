// ==========================================
// 进口散货分配系统 - 到厂成本模型
// ==========================================
// 职责: 计算 (船货, 港口, 钢厂, 吨位) 的到厂成本分项
//   到厂成本 = 海运费 + 港杂(装卸+港务) + 堆存费 + 滞期(待泊+拥堵风险) + 铁路运费
// 红线:
//   - 每一项费用携带币种，按本次运行固定的单一汇率换算到报表币种
//   - 堆存费与拥堵滞期随港口负载分段递增（凸函数）
// ==========================================

use crate::config::PlanningConfig;
use crate::domain::money::{Money, PinnedExchangeRate};
use crate::domain::network::{NetworkModel, Port, RailRoute};
use crate::domain::plan::LegCost;
use crate::domain::shipment::Shipment;
use crate::domain::types::Currency;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::feasibility::PortDateOption;
use serde::{Deserialize, Serialize};

/// 港口负载分段: (该段上限占堆场能力的比例, 费用倍数)
pub const PORT_LOAD_BANDS: [(f64, f64); 4] = [(0.50, 1.0), (0.75, 2.0), (0.90, 4.0), (1.00, 8.0)];

// ==========================================
// CurrencyConverter - 单次运行的币种换算器
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrencyConverter {
    pinned: PinnedExchangeRate,
    reporting: Currency,
}

impl CurrencyConverter {
    /// # 错误
    /// - CurrencyMismatch: 汇率非正或非有限值
    pub fn new(reporting: Currency, fx_usd_inr: f64) -> EngineResult<Self> {
        if !(fx_usd_inr.is_finite() && fx_usd_inr > 0.0) {
            return Err(EngineError::CurrencyMismatch(format!(
                "USD/INR 汇率无效: {}",
                fx_usd_inr
            )));
        }
        Ok(Self {
            pinned: PinnedExchangeRate::usd_inr(fx_usd_inr),
            reporting,
        })
    }

    pub fn pinned(&self) -> PinnedExchangeRate {
        self.pinned
    }

    pub fn reporting_currency(&self) -> Currency {
        self.reporting
    }

    /// 换算到报表币种
    pub fn convert(&self, money: &Money) -> EngineResult<f64> {
        if !money.amount.is_finite() {
            return Err(EngineError::CurrencyMismatch(format!(
                "金额无效: {} {}",
                money.amount, money.currency
            )));
        }
        let rate = self.pinned.rate;
        match (money.currency, self.reporting) {
            (from, to) if from == to => Ok(money.amount),
            (Currency::Usd, Currency::Inr) => Ok(money.amount * rate),
            (Currency::Inr, Currency::Usd) => Ok(money.amount / rate),
            (from, to) => Err(EngineError::CurrencyMismatch(format!(
                "无法换算 {} -> {}",
                from, to
            ))),
        }
    }

    /// 两个汇率快照必须完全一致才能合并/比较金额
    pub fn ensure_same_basis(
        left: (Currency, &PinnedExchangeRate),
        right: (Currency, &PinnedExchangeRate),
    ) -> EngineResult<()> {
        if left.0 != right.0 || left.1 != right.1 {
            return Err(EngineError::CurrencyMismatch(format!(
                "报表口径不同: {} @ {} vs {} @ {}",
                left.0, left.1.rate, right.0, right.1.rate
            )));
        }
        Ok(())
    }
}

// ==========================================
// BandSegment - 港口负载分段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSegment {
    pub band: usize,
    pub capacity_t: f64,
    pub multiplier: f64,
    pub storage_per_t: f64,   // 报表币种/吨
    pub demurrage_per_t: f64, // 报表币种/吨
}

impl BandSegment {
    pub fn cost_per_t(&self) -> f64 {
        self.storage_per_t + self.demurrage_per_t
    }
}

// ==========================================
// CostModel - 到厂成本模型
// ==========================================
#[derive(Debug, Clone)]
pub struct CostModel {
    converter: CurrencyConverter,
    config: PlanningConfig,
}

impl CostModel {
    pub fn new(config: &PlanningConfig) -> EngineResult<Self> {
        Ok(Self {
            converter: CurrencyConverter::new(config.reporting_currency, config.fx_usd_inr)?,
            config: config.clone(),
        })
    }

    pub fn converter(&self) -> &CurrencyConverter {
        &self.converter
    }

    pub fn config(&self) -> &PlanningConfig {
        &self.config
    }

    // ==========================================
    // 分项单价（报表币种/吨）
    // ==========================================

    /// 海运费；无航线运价时返回 None
    pub fn ocean_freight_per_t(
        &self,
        network: &NetworkModel,
        supplier_port: &str,
        port_code: &str,
    ) -> EngineResult<Option<f64>> {
        match network.ocean_freight(supplier_port, port_code) {
            Some(rate) => Ok(Some(self.converter.convert(&rate.rate_per_t)?)),
            None => Ok(None),
        }
    }

    /// 港杂 = 装卸费 + 港务费
    pub fn port_handling_per_t(&self, port: &Port) -> EngineResult<f64> {
        Ok(self.converter.convert(&port.handling_rate)? + self.converter.convert(&port.port_dues_rate)?)
    }

    /// 待泊滞期：等待天数 × 船日滞期费，按船货吨位摊到每吨
    pub fn waiting_demurrage_per_t(&self, wait_days: i64, quantity_t: f64) -> EngineResult<f64> {
        if wait_days <= 0 || quantity_t <= 0.0 {
            return Ok(0.0);
        }
        let per_vessel = Money::usd(self.config.demurrage_usd_per_vessel_day * wait_days as f64);
        Ok(self.converter.convert(&per_vessel)? / quantity_t)
    }

    /// 超期堆存费: storage_rate × max(0, 预计堆存天数 × 倍数 − 免堆存天数)
    pub fn storage_per_t(&self, port: &Port, multiplier: f64) -> EngineResult<f64> {
        let chargeable_days = (self.config.expected_dwell_days * multiplier - port.free_storage_days).max(0.0);
        self.converter
            .convert(&port.storage_rate_per_day.times(chargeable_days))
    }

    /// 拥堵滞期风险: 基准 × (1 + 拥堵指数) × 倍数 / 泊位数
    pub fn demurrage_risk_per_t(&self, congestion_index: f64, berths: u32, multiplier: f64) -> EngineResult<f64> {
        let berths = berths.max(1) as f64;
        let base = Money::usd(self.config.congestion_demurrage_usd_per_t);
        Ok(self.converter.convert(&base)? * (1.0 + congestion_index.max(0.0)) * multiplier / berths)
    }

    pub fn rail_freight_per_t(&self, route: &RailRoute) -> EngineResult<f64> {
        self.converter.convert(&route.freight_per_t())
    }

    /// 某港某日的负载分段（容量按登记堆场能力切分）
    pub fn band_segments(&self, port: &Port, option: &PortDateOption) -> EngineResult<Vec<BandSegment>> {
        let mut segments = Vec::with_capacity(PORT_LOAD_BANDS.len());
        let mut lower = 0.0;
        for (band, (upper, multiplier)) in PORT_LOAD_BANDS.iter().enumerate() {
            segments.push(BandSegment {
                band,
                capacity_t: option.stockyard_t * (upper - lower),
                multiplier: *multiplier,
                storage_per_t: self.storage_per_t(port, *multiplier)?,
                demurrage_per_t: self.demurrage_risk_per_t(option.congestion_index, option.berths, *multiplier)?,
            });
            lower = *upper;
        }
        Ok(segments)
    }

    /// 给定负载下的 (堆存费, 拥堵滞期) 总额，按分段由低到高填充
    pub fn port_load_cost(segments: &[BandSegment], load_t: f64) -> (f64, f64) {
        let mut remaining = load_t.max(0.0);
        let mut storage = 0.0;
        let mut demurrage = 0.0;
        for seg in segments {
            if remaining <= 0.0 {
                break;
            }
            let take = remaining.min(seg.capacity_t);
            storage += take * seg.storage_per_t;
            demurrage += take * seg.demurrage_per_t;
            remaining -= take;
        }
        (storage, demurrage)
    }

    // ==========================================
    // 钢厂库存目标（报表币种/吨）
    // ==========================================

    /// 低于最低天数时每吨到货的价值
    pub fn shortage_value_per_t(&self, daily_rate_t: f64) -> f64 {
        if daily_rate_t > 0.0 {
            self.config.shortage_penalty_per_day / daily_rate_t
        } else {
            0.0
        }
    }

    /// 最低到目标之间每吨到货的价值
    pub fn target_gap_value_per_t(&self, daily_rate_t: f64) -> f64 {
        if daily_rate_t > 0.0 {
            self.config.target_gap_reward_per_day / daily_rate_t
        } else {
            0.0
        }
    }

    // ==========================================
    // 单腿成本
    // ==========================================

    /// 单独评估一个 (船货, 港口, 钢厂, 吨位) 组合的到厂成本
    ///
    /// 假设该港该日仅此一笔卸货；港口/线路/运价缺失时返回 None
    #[allow(clippy::too_many_arguments)]
    pub fn estimate_triple(
        &self,
        network: &NetworkModel,
        shipment: &Shipment,
        option: &PortDateOption,
        wait_days: i64,
        plant_code: &str,
        tonnage_t: f64,
    ) -> EngineResult<Option<LegCost>> {
        let port = match network.port(&option.port_code) {
            Some(p) => p,
            None => return Ok(None),
        };
        let route = match network.route(&option.port_code, plant_code) {
            Some(r) => r,
            None => return Ok(None),
        };
        let ocean = match self.ocean_freight_per_t(network, &shipment.supplier_port, &option.port_code)? {
            Some(v) => v,
            None => return Ok(None),
        };

        let segments = self.band_segments(port, option)?;
        let (storage, congestion) = Self::port_load_cost(&segments, tonnage_t);

        Ok(Some(LegCost {
            ocean_freight: ocean * tonnage_t,
            port_handling: self.port_handling_per_t(port)? * tonnage_t,
            storage,
            demurrage: self.waiting_demurrage_per_t(wait_days, shipment.quantity_t)? * tonnage_t + congestion,
            rail_freight: self.rail_freight_per_t(route)? * tonnage_t,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(free_days: f64) -> Port {
        Port {
            port_code: "VIZAG".to_string(),
            port_name: "Visakhapatnam".to_string(),
            latitude: 17.69,
            longitude: 83.29,
            max_draft_m: 18.0,
            stockyard_capacity_t: 100_000.0,
            berths: 4,
            free_storage_days: free_days,
            handling_rate: Money::inr(250.0),
            storage_rate_per_day: Money::inr(10.0),
            port_dues_rate: Money::inr(40.0),
        }
    }

    fn option(stockyard_t: f64) -> PortDateOption {
        PortDateOption {
            port_code: "VIZAG".to_string(),
            date: chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            stockyard_t,
            berths: 2,
            congestion_index: 0.5,
            plants: vec![("BSP".to_string(), 4)],
        }
    }

    #[test]
    fn test_converter_pins_single_rate() {
        let fx = CurrencyConverter::new(Currency::Inr, 83.0).unwrap();
        assert_eq!(fx.convert(&Money::usd(10.0)).unwrap(), 830.0);
        assert_eq!(fx.convert(&Money::inr(10.0)).unwrap(), 10.0);

        let usd = CurrencyConverter::new(Currency::Usd, 83.0).unwrap();
        assert!((usd.convert(&Money::inr(830.0)).unwrap() - 10.0).abs() < 1e-12);

        assert!(matches!(
            CurrencyConverter::new(Currency::Inr, 0.0),
            Err(EngineError::CurrencyMismatch(_))
        ));
    }

    #[test]
    fn test_mixed_rates_rejected() {
        let a = PinnedExchangeRate::usd_inr(83.0);
        let b = PinnedExchangeRate::usd_inr(84.0);
        assert!(CurrencyConverter::ensure_same_basis((Currency::Inr, &a), (Currency::Inr, &a)).is_ok());
        assert!(matches!(
            CurrencyConverter::ensure_same_basis((Currency::Inr, &a), (Currency::Inr, &b)),
            Err(EngineError::CurrencyMismatch(_))
        ));
    }

    #[test]
    fn test_band_costs_are_monotone_and_convex() {
        let model = CostModel::new(&PlanningConfig::default()).unwrap();
        let segments = model.band_segments(&port(7.0), &option(100_000.0)).unwrap();
        assert_eq!(segments.len(), 4);
        let total_cap: f64 = segments.iter().map(|s| s.capacity_t).sum();
        assert!((total_cap - 100_000.0).abs() < 1e-6);

        for pair in segments.windows(2) {
            assert!(pair[1].cost_per_t() > pair[0].cost_per_t());
        }

        // 边际成本递增 ⇒ 同样 10kt，高负载时更贵
        let (s1, d1) = CostModel::port_load_cost(&segments, 10_000.0);
        let (s2, d2) = CostModel::port_load_cost(&segments, 90_000.0);
        let (s3, d3) = CostModel::port_load_cost(&segments, 100_000.0);
        assert!((s3 + d3) - (s2 + d2) > (s1 + d1));
    }

    fn shipment(quantity_t: f64) -> Shipment {
        Shipment {
            shipment_id: "SHP-1".to_string(),
            material: crate::domain::types::Material::CokingCoal,
            quantity_t,
            vessel_code: "CAPE".to_string(),
            supplier_port: "GLADSTONE".to_string(),
            required_by: chrono::NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            eta: None,
            status: crate::domain::types::ShipmentStatus::Scheduled,
            splits: vec![],
        }
    }

    fn network() -> NetworkModel {
        NetworkModel::new(
            vec![],
            vec![port(7.0)],
            vec![RailRoute {
                port_code: "VIZAG".to_string(),
                plant_code: "BSP".to_string(),
                distance_km: 560.0,
                max_rakes_per_day: 60,
                freight_rate_per_t_km: Money::inr(1.5),
            }],
            vec![],
            vec![crate::domain::network::OceanFreightRate {
                supplier_port: "GLADSTONE".to_string(),
                discharge_port: "VIZAG".to_string(),
                rate_per_t: Money::usd(18.4),
            }],
        )
    }

    #[test]
    fn test_estimate_triple_sums_all_terms() {
        let model = CostModel::new(&PlanningConfig::default()).unwrap();
        let network = network();
        let cargo = shipment(50_000.0);
        let opt = option(100_000.0);

        let cost = model
            .estimate_triple(&network, &cargo, &opt, 1, "BSP", 50_000.0)
            .unwrap()
            .expect("港口、线路、运价齐全");
        assert!((cost.ocean_freight - 18.4 * 83.0 * 50_000.0).abs() < 1e-3);
        assert!((cost.port_handling - 290.0 * 50_000.0).abs() < 1e-6);
        assert!((cost.rail_freight - 560.0 * 1.5 * 50_000.0).abs() < 1e-6);

        // 50,000t 正好填满第一段
        let segments = model.band_segments(&port(7.0), &opt).unwrap();
        let (storage, congestion) = CostModel::port_load_cost(&segments, 50_000.0);
        assert!((cost.storage - storage).abs() < 1e-6);
        let waiting = 25_000.0 * 83.0;
        assert!((cost.demurrage - (waiting + congestion)).abs() < 1e-6);

        // 无线路 / 无运价
        assert!(model
            .estimate_triple(&network, &cargo, &opt, 0, "RSP", 50_000.0)
            .unwrap()
            .is_none());
        let mut other_supplier = cargo.clone();
        other_supplier.supplier_port = "RICHARDS_BAY".to_string();
        assert!(model
            .estimate_triple(&network, &other_supplier, &opt, 0, "BSP", 50_000.0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_waiting_demurrage_spread_over_cargo() {
        let model = CostModel::new(&PlanningConfig::default()).unwrap();
        assert_eq!(model.waiting_demurrage_per_t(0, 75_000.0).unwrap(), 0.0);
        let per_t = model.waiting_demurrage_per_t(2, 83_000.0).unwrap();
        // 2 天 × 25000 USD × 83 / 83000 t = 50 INR/t
        assert!((per_t - 50.0).abs() < 1e-9);
    }
}

// ==========================================
// 进口散货分配系统 - CSV 导入器
// ==========================================
// 支持:
//   - 能力登记: entry_date,location_kind,port_code,plant_code,berths,stockyard_t,congestion_index,rakes
//   - 库存事件: location_code,material,quantity_t,event_ts
// 规则: 逐行校验，坏行带行号记入报告，好行照常写入
// ==========================================

use crate::domain::capacity::{CapacityEntry, CapacityLocation, CapacityValues};
use crate::domain::network::NetworkModel;
use crate::domain::types::Material;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::capacity_repo::CapacityRepository;
use crate::repository::row_codec::{parse_date, parse_datetime};
use crate::repository::stock_ledger_repo::{NewStockEvent, StockLedgerRepository};
use chrono::{Local, NaiveDateTime};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

pub const CAPACITY_COLUMNS: [&str; 8] = [
    "entry_date",
    "location_kind",
    "port_code",
    "plant_code",
    "berths",
    "stockyard_t",
    "congestion_index",
    "rakes",
];

pub const STOCK_EVENT_COLUMNS: [&str; 4] = ["location_code", "material", "quantity_t", "event_ts"];

// ==========================================
// RowError / ImportReport
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub line: u64, // 原始文件行号（表头为第 1 行）
    pub field: String,
    pub message: String,
}

impl RowError {
    fn new(line: u64, field: &str, message: impl Into<String>) -> Self {
        Self {
            line,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub file: String,
    pub total_rows: usize,
    pub applied: usize,
    pub rejected: Vec<RowError>,
    pub elapsed_ms: u64,
}

// ==========================================
// CSV 读取
// ==========================================
#[derive(Debug, Clone)]
pub struct RawRow {
    pub line: u64,
    fields: HashMap<String, String>,
}

impl RawRow {
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(|s| s.as_str()).unwrap_or("")
    }

    fn required(&self, column: &str) -> Result<&str, RowError> {
        let v = self.get(column);
        if v.is_empty() {
            Err(RowError::new(self.line, column, "不能为空"))
        } else {
            Ok(v)
        }
    }

    fn parse_f64(&self, column: &str) -> Result<f64, RowError> {
        let raw = self.required(column)?;
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(RowError::new(self.line, column, format!("不是有效数值: {}", raw))),
        }
    }

    fn parse_u32(&self, column: &str) -> Result<u32, RowError> {
        let raw = self.required(column)?;
        raw.parse::<u32>()
            .map_err(|_| RowError::new(self.line, column, format!("不是非负整数: {}", raw)))
    }
}

/// 读取 CSV，校验表头，返回带行号的原始行（跳过空行）
pub fn read_rows(path: &Path, required_columns: &[&str]) -> ImportResult<Vec<RawRow>> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    if let Some(ext) = path.extension() {
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext.to_string_lossy().to_string()));
        }
    }

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    for column in required_columns {
        if !headers.iter().any(|h| h == column) {
            return Err(ImportError::MissingColumn(column.to_string()));
        }
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let fields: HashMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect();

        // 跳过完全空白的行
        if fields.values().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(RawRow { line, fields });
    }
    Ok(rows)
}

// ==========================================
// 行解析
// ==========================================

/// 解析一行能力登记；network 非空时校验港口/线路代码
pub fn parse_capacity_row(
    row: &RawRow,
    network: Option<&NetworkModel>,
    updated_at: NaiveDateTime,
) -> Result<CapacityEntry, RowError> {
    let raw_date = row.required("entry_date")?;
    let entry_date = parse_date(raw_date)
        .ok_or_else(|| RowError::new(row.line, "entry_date", format!("期望 YYYY-MM-DD，实际 {}", raw_date)))?;

    let kind = row.required("location_kind")?;
    let port_code = row.required("port_code")?;
    let plant_code = row.get("plant_code");
    let location = CapacityLocation::from_parts(kind, port_code, Some(plant_code)).ok_or_else(|| {
        RowError::new(
            row.line,
            "location_kind",
            format!("无法识别的地点: kind={}, port={}, plant={}", kind, port_code, plant_code),
        )
    })?;

    if let Some(net) = network {
        if net.port(port_code).is_none() {
            return Err(RowError::new(row.line, "port_code", format!("未知港口 {}", port_code)));
        }
        if let Some(plant) = location.plant_code() {
            if net.route(port_code, plant).is_none() {
                return Err(RowError::new(
                    row.line,
                    "plant_code",
                    format!("未知线路 {} -> {}", port_code, plant),
                ));
            }
        }
    }

    let values = match location {
        CapacityLocation::Port { .. } => {
            let stockyard_t = row.parse_f64("stockyard_t")?;
            if stockyard_t < 0.0 {
                return Err(RowError::new(row.line, "stockyard_t", "不能为负"));
            }
            let congestion_index = row.parse_f64("congestion_index")?;
            if congestion_index < 0.0 {
                return Err(RowError::new(row.line, "congestion_index", "不能为负"));
            }
            CapacityValues::Port {
                berths: row.parse_u32("berths")?,
                stockyard_t,
                congestion_index,
            }
        }
        CapacityLocation::Route { .. } => CapacityValues::Route {
            rakes: row.parse_u32("rakes")?,
        },
    };

    Ok(CapacityEntry {
        entry_date,
        location,
        values,
        updated_at,
    })
}

pub fn parse_stock_event_row(row: &RawRow) -> Result<NewStockEvent, RowError> {
    let location_code = row.required("location_code")?.to_string();
    let raw_material = row.required("material")?;
    let material = Material::from_str(raw_material)
        .ok_or_else(|| RowError::new(row.line, "material", format!("未知物料 {}", raw_material)))?;
    let quantity_t = row.parse_f64("quantity_t")?;
    if quantity_t == 0.0 {
        return Err(RowError::new(row.line, "quantity_t", "库存变动不能为 0"));
    }
    let raw_ts = row.required("event_ts")?;
    let event_ts = parse_datetime(raw_ts)
        .ok_or_else(|| RowError::new(row.line, "event_ts", format!("无法解析时间 {}", raw_ts)))?;

    Ok(NewStockEvent {
        location_code,
        material,
        quantity_t,
        event_ts,
    })
}

// ==========================================
// CapacityCsvImporter - 能力登记导入
// ==========================================
pub struct CapacityCsvImporter {
    repo: Arc<CapacityRepository>,
}

impl CapacityCsvImporter {
    pub fn new(repo: Arc<CapacityRepository>) -> Self {
        Self { repo }
    }

    /// 导入能力登记文件；同一 (日期, 地点) 以整行替换
    #[instrument(skip(self, network), fields(file = %path.display()))]
    pub fn import_file(&self, path: &Path, network: Option<&NetworkModel>) -> ImportResult<ImportReport> {
        let started = Instant::now();
        let rows = read_rows(path, &CAPACITY_COLUMNS)?;
        let now = Local::now().naive_local();

        let mut good = Vec::new();
        let mut rejected = Vec::new();
        for row in &rows {
            match parse_capacity_row(row, network, now) {
                Ok(entry) => good.push(entry),
                Err(e) => {
                    warn!(line = e.line, field = %e.field, message = %e.message, "能力登记行被拒绝");
                    rejected.push(e);
                }
            }
        }

        let applied = self.repo.upsert_batch(&good)?;
        let report = ImportReport {
            file: path.display().to_string(),
            total_rows: rows.len(),
            applied,
            rejected,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            total = report.total_rows,
            applied = report.applied,
            rejected = report.rejected.len(),
            "能力登记导入完成"
        );
        Ok(report)
    }
}

// ==========================================
// StockEventCsvImporter - 库存事件导入
// ==========================================
pub struct StockEventCsvImporter {
    repo: Arc<StockLedgerRepository>,
}

impl StockEventCsvImporter {
    pub fn new(repo: Arc<StockLedgerRepository>) -> Self {
        Self { repo }
    }

    /// 导入库存事件文件；事件按文件顺序追加
    #[instrument(skip(self), fields(file = %path.display()))]
    pub fn import_file(&self, path: &Path) -> ImportResult<ImportReport> {
        let started = Instant::now();
        let rows = read_rows(path, &STOCK_EVENT_COLUMNS)?;

        let mut good = Vec::new();
        let mut rejected = Vec::new();
        for row in &rows {
            match parse_stock_event_row(row) {
                Ok(event) => good.push(event),
                Err(e) => {
                    warn!(line = e.line, field = %e.field, message = %e.message, "库存事件行被拒绝");
                    rejected.push(e);
                }
            }
        }

        let applied = self.repo.append_batch(&good)?.len();
        let report = ImportReport {
            file: path.display().to_string(),
            total_rows: rows.len(),
            applied,
            rejected,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            total = report.total_rows,
            applied = report.applied,
            rejected = report.rejected.len(),
            "库存事件导入完成"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_read_rows_reports_line_numbers() {
        let file = csv_file(
            "location_code,material,quantity_t,event_ts\n\
             BSP,COKING_COAL,1000,2026-03-01 06:00:00\n\
             ,,,\n\
             BSP,IRON_ORE,5,2026-03-01 07:00:00\n",
        );
        let rows = read_rows(file.path(), &STOCK_EVENT_COLUMNS).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].line, 4);

        let err = parse_stock_event_row(&rows[1]).unwrap_err();
        assert_eq!((err.line, err.field.as_str()), (4, "material"));
    }

    #[test]
    fn test_missing_column_rejects_whole_file() {
        let file = csv_file("entry_date,port_code\n2026-03-01,VIZAG\n");
        assert!(matches!(
            read_rows(file.path(), &CAPACITY_COLUMNS),
            Err(ImportError::MissingColumn(c)) if c == "location_kind"
        ));
    }

    #[test]
    fn test_parse_capacity_rows() {
        let file = csv_file(
            "entry_date,location_kind,port_code,plant_code,berths,stockyard_t,congestion_index,rakes\n\
             2026-03-01,PORT,VIZAG,,3,100000,0.4,\n\
             2026-03-01,ROUTE,VIZAG,BSP,,,,6\n\
             2026-03-01,ROUTE,VIZAG,,,,,6\n\
             2026-03-xx,PORT,VIZAG,,3,100000,0.4,\n\
             2026-03-01,PORT,VIZAG,,3,-5,0.4,\n",
        );
        let rows = read_rows(file.path(), &CAPACITY_COLUMNS).unwrap();
        let parsed: Vec<_> = rows.iter().map(|r| parse_capacity_row(r, None, now())).collect();

        let port = parsed[0].as_ref().unwrap();
        assert_eq!(port.stockyard_t(), 100_000.0);
        assert_eq!(port.berths(), 3);
        assert_eq!(parsed[1].as_ref().unwrap().rakes(), 6);

        let errors: Vec<(u64, &str)> = parsed
            .iter()
            .filter_map(|r| r.as_ref().err())
            .map(|e| (e.line, e.field.as_str()))
            .collect();
        assert_eq!(errors, vec![(4, "location_kind"), (5, "entry_date"), (6, "stockyard_t")]);
    }
}

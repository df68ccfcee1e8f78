// ==========================================
// 进口散货分配系统 - 能力登记仓储
// ==========================================
// 职责: capacity_entry 表的读写
// 红线: (entry_date, location_key) 唯一；写入为整行替换，
//       读者不会看到泊位旧值与堆场新值混杂的记录
// ==========================================

use crate::domain::capacity::{CapacityEntry, CapacityLocation, CapacityValues};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_date, fmt_datetime, get_date, get_datetime};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

const ENTRY_COLUMNS: &str = r#"
    entry_date, location_kind, port_code, plant_code,
    berths, stockyard_t, congestion_index, rakes, updated_at
"#;

// ==========================================
// CapacityRepository - 能力登记仓储
// ==========================================
pub struct CapacityRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CapacityRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_entry(row: &rusqlite::Row<'_>) -> SqliteResult<CapacityEntry> {
        let kind: String = row.get(1)?;
        let port_code: String = row.get(2)?;
        let plant_code: Option<String> = row.get(3)?;
        let location = CapacityLocation::from_parts(&kind, &port_code, plant_code.as_deref())
            .ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    Type::Text,
                    format!("无效能力地点: kind={}, port={}", kind, port_code).into(),
                )
            })?;

        let values = match location {
            CapacityLocation::Port { .. } => CapacityValues::Port {
                berths: row.get::<_, Option<u32>>(4)?.unwrap_or(0),
                stockyard_t: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                congestion_index: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
            },
            CapacityLocation::Route { .. } => CapacityValues::Route {
                rakes: row.get::<_, Option<u32>>(7)?.unwrap_or(0),
            },
        };

        Ok(CapacityEntry {
            entry_date: get_date(row, 0)?,
            location,
            values,
            updated_at: get_datetime(row, 8)?,
        })
    }

    fn write_entry(conn: &Connection, entry: &CapacityEntry) -> RepositoryResult<()> {
        if !entry.is_consistent() {
            return Err(RepositoryError::ValidationError(format!(
                "能力登记地点 {} 与资源类型不一致",
                entry.location
            )));
        }

        let (berths, stockyard_t, congestion_index, rakes) = match entry.values {
            CapacityValues::Port {
                berths,
                stockyard_t,
                congestion_index,
            } => (Some(berths), Some(stockyard_t), Some(congestion_index), None),
            CapacityValues::Route { rakes } => (None, None, None, Some(rakes)),
        };

        conn.execute(
            r#"
            INSERT INTO capacity_entry (
                entry_date, location_key, location_kind, port_code, plant_code,
                berths, stockyard_t, congestion_index, rakes, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(entry_date, location_key) DO UPDATE SET
                location_kind = excluded.location_kind,
                port_code = excluded.port_code,
                plant_code = excluded.plant_code,
                berths = excluded.berths,
                stockyard_t = excluded.stockyard_t,
                congestion_index = excluded.congestion_index,
                rakes = excluded.rakes,
                updated_at = excluded.updated_at
            "#,
            params![
                fmt_date(entry.entry_date),
                entry.location.key(),
                entry.location.kind_str(),
                entry.location.port_code(),
                entry.location.plant_code(),
                berths,
                stockyard_t,
                congestion_index,
                rakes,
                fmt_datetime(entry.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 插入或整行替换
    ///
    /// # 错误
    /// - ValidationError: 地点与资源类型不一致
    pub fn upsert(&self, entry: &CapacityEntry) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::write_entry(&conn, entry)
    }

    /// 批量整行替换（同一事务，任一失败整体回滚）
    pub fn upsert_batch(&self, entries: &[CapacityEntry]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for entry in entries {
            Self::write_entry(&tx, entry)?;
        }
        tx.commit()?;
        Ok(entries.len())
    }

    pub fn find(&self, entry_date: NaiveDate, location: &CapacityLocation) -> RepositoryResult<Option<CapacityEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM capacity_entry WHERE entry_date = ?1 AND location_key = ?2",
            ENTRY_COLUMNS
        );
        let entry = conn
            .query_row(&sql, params![fmt_date(entry_date), location.key()], Self::map_entry)
            .optional()?;
        Ok(entry)
    }

    /// 日期区间内全部登记（含端点，按日期、地点键排序）
    pub fn list_range(&self, start_date: NaiveDate, end_date: NaiveDate) -> RepositoryResult<Vec<CapacityEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM capacity_entry
            WHERE entry_date BETWEEN ?1 AND ?2
            ORDER BY entry_date, location_key
            "#,
            ENTRY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![fmt_date(start_date), fmt_date(end_date)], Self::map_entry)?
            .collect::<SqliteResult<Vec<CapacityEntry>>>()?;
        Ok(entries)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM capacity_entry", [], |row| row.get(0))?)
    }
}

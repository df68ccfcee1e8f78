// ==========================================
// 进口散货分配系统 - 库存事件仓储
// ==========================================
// 职责: stock_event 表的追加与读取
// 红线: 只追加，不更新、不删除
// 并发: 同一 (地点, 物料) 的序号在 IMMEDIATE 事务内分配，
//       写锁保证并发追加被串行化，序号无空洞无重复
// ==========================================

use crate::domain::stock::{StockEvent, StockRecord};
use crate::domain::types::Material;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_datetime, get_datetime, get_enum};
use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, Result as SqliteResult, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// 追加请求
#[derive(Debug, Clone, PartialEq)]
pub struct NewStockEvent {
    pub location_code: String,
    pub material: Material,
    pub quantity_t: f64,
    pub event_ts: NaiveDateTime,
}

// ==========================================
// StockLedgerRepository - 库存事件仓储
// ==========================================
pub struct StockLedgerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StockLedgerRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_event(row: &rusqlite::Row<'_>) -> SqliteResult<StockEvent> {
        Ok(StockEvent {
            location_code: row.get(0)?,
            material: get_enum(row, 1, Material::from_str)?,
            seq_no: row.get(2)?,
            quantity_t: row.get(3)?,
            event_ts: get_datetime(row, 4)?,
            recorded_at: get_datetime(row, 5)?,
        })
    }

    fn insert_in_tx(tx: &Transaction<'_>, event: &NewStockEvent, recorded_at: NaiveDateTime) -> RepositoryResult<StockEvent> {
        let seq_no: i64 = tx.query_row(
            r#"
            SELECT COALESCE(MAX(seq_no), 0) + 1
            FROM stock_event
            WHERE location_code = ?1 AND material = ?2
            "#,
            params![event.location_code, event.material.to_db_str()],
            |row| row.get(0),
        )?;

        tx.execute(
            r#"
            INSERT INTO stock_event (
                location_code, material, seq_no, quantity_t, event_ts, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.location_code,
                event.material.to_db_str(),
                seq_no,
                event.quantity_t,
                fmt_datetime(event.event_ts),
                fmt_datetime(recorded_at),
            ],
        )?;

        Ok(StockEvent {
            location_code: event.location_code.clone(),
            material: event.material,
            seq_no,
            quantity_t: event.quantity_t,
            event_ts: event.event_ts,
            recorded_at,
        })
    }

    /// 追加单个事件
    ///
    /// # 返回
    /// - Ok(StockEvent): 已分配序号的事件
    pub fn append(&self, event: &NewStockEvent) -> RepositoryResult<StockEvent> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored = Self::insert_in_tx(&tx, event, Local::now().naive_local())?;
        tx.commit()?;
        Ok(stored)
    }

    /// 批量追加（同一事务，全部成功或全部回滚）
    pub fn append_batch(&self, events: &[NewStockEvent]) -> RepositoryResult<Vec<StockEvent>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let recorded_at = Local::now().naive_local();
        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            stored.push(Self::insert_in_tx(&tx, event, recorded_at)?);
        }
        tx.commit()?;
        Ok(stored)
    }

    /// 读取某地点某物料的全部事件（按 event_ts, seq_no 排序）
    pub fn load_record(&self, location_code: &str, material: Material) -> RepositoryResult<StockRecord> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT location_code, material, seq_no, quantity_t, event_ts, recorded_at
            FROM stock_event
            WHERE location_code = ?1 AND material = ?2
            ORDER BY event_ts, seq_no
            "#,
        )?;
        let events = stmt
            .query_map(params![location_code, material.to_db_str()], Self::map_event)?
            .collect::<SqliteResult<Vec<StockEvent>>>()?;

        Ok(StockRecord {
            location_code: location_code.to_string(),
            material,
            events,
        })
    }

    /// 读取全部 (地点, 物料) 的事件序列
    pub fn load_all_records(&self) -> RepositoryResult<Vec<StockRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT location_code, material, seq_no, quantity_t, event_ts, recorded_at
            FROM stock_event
            ORDER BY location_code, material, event_ts, seq_no
            "#,
        )?;
        let events = stmt
            .query_map([], Self::map_event)?
            .collect::<SqliteResult<Vec<StockEvent>>>()?;

        let mut grouped: BTreeMap<(String, Material), Vec<StockEvent>> = BTreeMap::new();
        for event in events {
            grouped
                .entry((event.location_code.clone(), event.material))
                .or_default()
                .push(event);
        }
        Ok(grouped
            .into_iter()
            .map(|((location_code, material), events)| StockRecord {
                location_code,
                material,
                events,
            })
            .collect())
    }

    /// 事件总数（测试/诊断用）
    pub fn count_events(&self, location_code: &str, material: Material) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM stock_event WHERE location_code = ?1 AND material = ?2",
            params![location_code, material.to_db_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

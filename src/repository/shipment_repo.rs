// ==========================================
// 进口散货分配系统 - 船货数据仓储
// ==========================================
// 职责: shipment / shipment_split 的读写
// 红线: 状态只能原地或前进一步；分拆吨位之和必须等于船货吨位
// ==========================================

use crate::domain::shipment::{Shipment, ShipmentSplit};
use crate::domain::types::{Material, ShipmentStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_date, fmt_datetime, get_date, get_enum, get_opt_date};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Transaction};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const SHIPMENT_COLUMNS: &str = r#"
    shipment_id, material, quantity_t, vessel_code, supplier_port,
    required_by, eta, status
"#;

// ==========================================
// ShipmentRepository - 船货仓储
// ==========================================
pub struct ShipmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ShipmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_header(row: &rusqlite::Row<'_>) -> SqliteResult<Shipment> {
        Ok(Shipment {
            shipment_id: row.get(0)?,
            material: get_enum(row, 1, Material::from_str)?,
            quantity_t: row.get(2)?,
            vessel_code: row.get(3)?,
            supplier_port: row.get(4)?,
            required_by: get_date(row, 5)?,
            eta: get_opt_date(row, 6)?,
            status: get_enum(row, 7, ShipmentStatus::from_str)?,
            splits: Vec::new(),
        })
    }

    fn load_splits(conn: &Connection, shipment_id: &str) -> RepositoryResult<Vec<ShipmentSplit>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT port_code, discharge_date, plant_code, tonnage_t
            FROM shipment_split
            WHERE shipment_id = ?1
            ORDER BY leg_no
            "#,
        )?;
        let splits = stmt
            .query_map(params![shipment_id], |row| {
                Ok(ShipmentSplit {
                    port_code: row.get(0)?,
                    discharge_date: get_date(row, 1)?,
                    plant_code: row.get(2)?,
                    tonnage_t: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(splits)
    }

    fn replace_splits(tx: &Transaction<'_>, shipment_id: &str, splits: &[ShipmentSplit]) -> RepositoryResult<()> {
        tx.execute("DELETE FROM shipment_split WHERE shipment_id = ?1", params![shipment_id])?;
        for (leg_no, split) in splits.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO shipment_split (
                    shipment_id, leg_no, port_code, discharge_date, plant_code, tonnage_t
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    shipment_id,
                    leg_no as i64 + 1,
                    split.port_code,
                    fmt_date(split.discharge_date),
                    split.plant_code,
                    split.tonnage_t,
                ],
            )?;
        }
        Ok(())
    }

    /// 插入或更新船货（含分拆）
    pub fn upsert(&self, shipment: &Shipment) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO shipment (
                shipment_id, material, quantity_t, vessel_code, supplier_port,
                required_by, eta, status, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(shipment_id) DO UPDATE SET
                material = excluded.material,
                quantity_t = excluded.quantity_t,
                vessel_code = excluded.vessel_code,
                supplier_port = excluded.supplier_port,
                required_by = excluded.required_by,
                eta = excluded.eta,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
            params![
                shipment.shipment_id,
                shipment.material.to_db_str(),
                shipment.quantity_t,
                shipment.vessel_code,
                shipment.supplier_port,
                fmt_date(shipment.required_by),
                shipment.eta.map(fmt_date),
                shipment.status.to_db_str(),
                fmt_datetime(Local::now().naive_local()),
            ],
        )?;
        Self::replace_splits(&tx, &shipment.shipment_id, &shipment.splits)?;
        tx.commit()?;
        Ok(())
    }

    fn find_with_conn(conn: &Connection, shipment_id: &str) -> RepositoryResult<Option<Shipment>> {
        let sql = format!("SELECT {} FROM shipment WHERE shipment_id = ?1", SHIPMENT_COLUMNS);
        let header = conn
            .query_row(&sql, params![shipment_id], Self::map_header)
            .optional()?;
        match header {
            Some(mut shipment) => {
                shipment.splits = Self::load_splits(conn, shipment_id)?;
                Ok(Some(shipment))
            }
            None => Ok(None),
        }
    }

    pub fn find_by_id(&self, shipment_id: &str) -> RepositoryResult<Option<Shipment>> {
        let conn = self.get_conn()?;
        Self::find_with_conn(&conn, shipment_id)
    }

    /// 全部船货（按 shipment_id 排序）
    pub fn list_all(&self) -> RepositoryResult<Vec<Shipment>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM shipment ORDER BY shipment_id", SHIPMENT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut shipments = stmt
            .query_map([], Self::map_header)?
            .collect::<SqliteResult<Vec<Shipment>>>()?;
        drop(stmt);

        let mut splits: BTreeMap<String, Vec<ShipmentSplit>> = BTreeMap::new();
        {
            let mut stmt = conn.prepare(
                r#"
                SELECT shipment_id, port_code, discharge_date, plant_code, tonnage_t
                FROM shipment_split
                ORDER BY shipment_id, leg_no
                "#,
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        ShipmentSplit {
                            port_code: row.get(1)?,
                            discharge_date: get_date(row, 2)?,
                            plant_code: row.get(3)?,
                            tonnage_t: row.get(4)?,
                        },
                    ))
                })?
                .collect::<SqliteResult<Vec<_>>>()?;
            for (shipment_id, split) in rows {
                splits.entry(shipment_id).or_default().push(split);
            }
        }
        for shipment in shipments.iter_mut() {
            shipment.splits = splits.remove(&shipment.shipment_id).unwrap_or_default();
        }
        Ok(shipments)
    }

    /// 可参与优化的船货（Draft / Scheduled / PortSelected）
    pub fn list_plannable(&self) -> RepositoryResult<Vec<Shipment>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|s| s.status.is_plannable())
            .collect())
    }

    /// 写入分拆并推进状态
    ///
    /// # 错误
    /// - NotFound: 船货不存在
    /// - InvalidStateTransition: 状态后退或跳级
    /// - ValidationError: 分拆吨位之和不等于船货吨位
    pub fn assign_splits(
        &self,
        shipment_id: &str,
        splits: &[ShipmentSplit],
        next_status: ShipmentStatus,
    ) -> RepositoryResult<Shipment> {
        let mut shipment = self.find_by_id(shipment_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Shipment".to_string(),
            id: shipment_id.to_string(),
        })?;

        if !shipment.status.can_transition_to(next_status) {
            return Err(RepositoryError::InvalidStateTransition {
                from: shipment.status.to_string(),
                to: next_status.to_string(),
            });
        }
        shipment
            .check_splits(splits)
            .map_err(RepositoryError::ValidationError)?;

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE shipment SET status = ?1, updated_at = ?2 WHERE shipment_id = ?3",
            params![
                next_status.to_db_str(),
                fmt_datetime(Local::now().naive_local()),
                shipment_id
            ],
        )?;
        Self::replace_splits(&tx, shipment_id, splits)?;
        tx.commit()?;

        shipment.status = next_status;
        shipment.splits = splits.to_vec();
        Ok(shipment)
    }

    /// 一次写入多条船货的分拆并统一推进到 next_status
    ///
    /// 全部船货先校验（存在、状态可推进、分拆之和）再在同一事务内写入；
    /// 任一条不通过则整批不写。Draft 船货在事务内先经过 Scheduled。
    ///
    /// # 错误
    /// - NotFound / InvalidStateTransition / ValidationError: 同 assign_splits，
    ///   ValidationError 的消息带船货ID
    pub fn assign_splits_batch(
        &self,
        assignments: &[(String, Vec<ShipmentSplit>)],
        next_status: ShipmentStatus,
    ) -> RepositoryResult<Vec<Shipment>> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut staged = Vec::with_capacity(assignments.len());
        for (shipment_id, splits) in assignments {
            let shipment = Self::find_with_conn(&tx, shipment_id)?.ok_or_else(|| RepositoryError::NotFound {
                entity: "Shipment".to_string(),
                id: shipment_id.clone(),
            })?;

            let from = if shipment.status == ShipmentStatus::Draft && next_status != ShipmentStatus::Draft {
                ShipmentStatus::Scheduled
            } else {
                shipment.status
            };
            if !from.can_transition_to(next_status) {
                return Err(RepositoryError::InvalidStateTransition {
                    from: shipment.status.to_string(),
                    to: next_status.to_string(),
                });
            }
            shipment
                .check_splits(splits)
                .map_err(|e| RepositoryError::ValidationError(format!("船货 {}: {}", shipment_id, e)))?;
            staged.push((shipment, splits));
        }

        let now = fmt_datetime(Local::now().naive_local());
        let mut written = Vec::with_capacity(staged.len());
        for (mut shipment, splits) in staged {
            tx.execute(
                "UPDATE shipment SET status = ?1, updated_at = ?2 WHERE shipment_id = ?3",
                params![next_status.to_db_str(), now, shipment.shipment_id],
            )?;
            Self::replace_splits(&tx, &shipment.shipment_id, splits)?;
            shipment.status = next_status;
            shipment.splits = splits.clone();
            written.push(shipment);
        }
        tx.commit()?;
        Ok(written)
    }

    /// 仅推进状态（不改分拆）
    pub fn update_status(&self, shipment_id: &str, next_status: ShipmentStatus) -> RepositoryResult<()> {
        let current = self.find_by_id(shipment_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Shipment".to_string(),
            id: shipment_id.to_string(),
        })?;
        if !current.status.can_transition_to(next_status) {
            return Err(RepositoryError::InvalidStateTransition {
                from: current.status.to_string(),
                to: next_status.to_string(),
            });
        }
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE shipment SET status = ?1, updated_at = ?2 WHERE shipment_id = ?3",
            params![
                next_status.to_db_str(),
                fmt_datetime(Local::now().naive_local()),
                shipment_id
            ],
        )?;
        Ok(())
    }
}

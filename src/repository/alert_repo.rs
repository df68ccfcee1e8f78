// ==========================================
// 进口散货分配系统 - 告警仓储
// ==========================================
// 职责: alert 表的读写
// 红线: 同一 (地点, 物料, 类型) 最多一条未关闭告警（部分唯一索引兜底）
// ==========================================

use crate::domain::alert::{Alert, AlertCondition};
use crate::domain::types::{AlertLevel, AlertType, Material};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_datetime, get_datetime, get_enum, get_opt_datetime};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const ALERT_COLUMNS: &str = r#"
    alert_id, location_code, material, alert_type, level, message,
    metric_value, opened_at, last_seen_at, resolved_at
"#;

fn material_key(material: Option<Material>) -> &'static str {
    material.map(|m| m.to_db_str()).unwrap_or("")
}

/// 告警写入结果
#[derive(Debug, Clone, PartialEq)]
pub enum AlertWrite {
    Opened(Alert),
    Refreshed(Alert),
}

impl AlertWrite {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertWrite::Opened(a) | AlertWrite::Refreshed(a) => a,
        }
    }
}

// ==========================================
// AlertRepository - 告警仓储
// ==========================================
pub struct AlertRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AlertRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_alert(row: &rusqlite::Row<'_>) -> SqliteResult<Alert> {
        let material_raw: String = row.get(2)?;
        let material = if material_raw.is_empty() {
            None
        } else {
            Some(Material::from_str(&material_raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    Type::Text,
                    format!("无效物料: {}", material_raw).into(),
                )
            })?)
        };
        Ok(Alert {
            alert_id: row.get(0)?,
            location_code: row.get(1)?,
            material,
            alert_type: get_enum(row, 3, AlertType::from_str)?,
            level: get_enum(row, 4, AlertLevel::from_str)?,
            message: row.get(5)?,
            metric_value: row.get(6)?,
            opened_at: get_datetime(row, 7)?,
            last_seen_at: get_datetime(row, 8)?,
            resolved_at: get_opt_datetime(row, 9)?,
        })
    }

    fn find_open_in(
        conn: &Connection,
        location_code: &str,
        material: Option<Material>,
        alert_type: AlertType,
    ) -> RepositoryResult<Option<Alert>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM alert
            WHERE location_code = ?1 AND material = ?2 AND alert_type = ?3
              AND resolved_at IS NULL
            "#,
            ALERT_COLUMNS
        );
        let alert = conn
            .query_row(
                &sql,
                params![location_code, material_key(material), alert_type.to_db_str()],
                Self::map_alert,
            )
            .optional()?;
        Ok(alert)
    }

    pub fn find_open(
        &self,
        location_code: &str,
        material: Option<Material>,
        alert_type: AlertType,
    ) -> RepositoryResult<Option<Alert>> {
        let conn = self.get_conn()?;
        Self::find_open_in(&conn, location_code, material, alert_type)
    }

    /// 全部未关闭告警（按地点、物料、类型排序）
    pub fn list_open(&self) -> RepositoryResult<Vec<Alert>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM alert
            WHERE resolved_at IS NULL
            ORDER BY location_code, material, alert_type
            "#,
            ALERT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let alerts = stmt
            .query_map([], Self::map_alert)?
            .collect::<SqliteResult<Vec<Alert>>>()?;
        Ok(alerts)
    }

    /// 打开新告警，或刷新已有未关闭告警的时间戳/级别/消息
    pub fn open_or_refresh(&self, condition: &AlertCondition, now: NaiveDateTime) -> RepositoryResult<AlertWrite> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let existing = Self::find_open_in(&tx, &condition.location_code, condition.material, condition.alert_type)?;
        let write = match existing {
            Some(mut alert) => {
                tx.execute(
                    r#"
                    UPDATE alert
                    SET level = ?1, message = ?2, metric_value = ?3, last_seen_at = ?4
                    WHERE alert_id = ?5
                    "#,
                    params![
                        condition.level.to_db_str(),
                        condition.message,
                        condition.metric_value,
                        fmt_datetime(now),
                        alert.alert_id,
                    ],
                )?;
                alert.level = condition.level;
                alert.message = condition.message.clone();
                alert.metric_value = condition.metric_value;
                alert.last_seen_at = now;
                AlertWrite::Refreshed(alert)
            }
            None => {
                let alert = Alert {
                    alert_id: Uuid::new_v4().to_string(),
                    location_code: condition.location_code.clone(),
                    material: condition.material,
                    alert_type: condition.alert_type,
                    level: condition.level,
                    message: condition.message.clone(),
                    metric_value: condition.metric_value,
                    opened_at: now,
                    last_seen_at: now,
                    resolved_at: None,
                };
                tx.execute(
                    r#"
                    INSERT INTO alert (
                        alert_id, location_code, material, alert_type, level, message,
                        metric_value, opened_at, last_seen_at, resolved_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)
                    "#,
                    params![
                        alert.alert_id,
                        alert.location_code,
                        material_key(alert.material),
                        alert.alert_type.to_db_str(),
                        alert.level.to_db_str(),
                        alert.message,
                        alert.metric_value,
                        fmt_datetime(now),
                        fmt_datetime(now),
                    ],
                )?;
                AlertWrite::Opened(alert)
            }
        };

        tx.commit()?;
        Ok(write)
    }

    /// 关闭告警
    pub fn resolve(&self, alert_id: &str, now: NaiveDateTime) -> RepositoryResult<Alert> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE alert SET resolved_at = ?1, level = ?2 WHERE alert_id = ?3 AND resolved_at IS NULL",
            params![fmt_datetime(now), AlertLevel::Normal.to_db_str(), alert_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "OpenAlert".to_string(),
                id: alert_id.to_string(),
            });
        }
        let sql = format!("SELECT {} FROM alert WHERE alert_id = ?1", ALERT_COLUMNS);
        Ok(conn.query_row(&sql, params![alert_id], Self::map_alert)?)
    }

    /// 某 (地点, 物料, 类型) 的全部告警历史（含已关闭）
    pub fn history(
        &self,
        location_code: &str,
        material: Option<Material>,
        alert_type: AlertType,
    ) -> RepositoryResult<Vec<Alert>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM alert
            WHERE location_code = ?1 AND material = ?2 AND alert_type = ?3
            ORDER BY opened_at, alert_id
            "#,
            ALERT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let alerts = stmt
            .query_map(
                params![location_code, material_key(material), alert_type.to_db_str()],
                Self::map_alert,
            )?
            .collect::<SqliteResult<Vec<Alert>>>()?;
        Ok(alerts)
    }
}

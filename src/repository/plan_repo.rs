// ==========================================
// 进口散货分配系统 - 分配方案仓储
// ==========================================
// 职责: allocation_plan 表的插入与查询
// 红线: 只插入不更新；同一输入重算得到新的 run_id
// ==========================================

use crate::domain::plan::{AllocationPlan, PlanRecord};
use crate::domain::types::PlanKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_date, fmt_datetime, get_datetime};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ==========================================
// PlanRepository - 分配方案仓储
// ==========================================
pub struct PlanRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PlanRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_record(row: &rusqlite::Row<'_>) -> SqliteResult<(String, chrono::NaiveDateTime, String)> {
        Ok((row.get(0)?, get_datetime(row, 1)?, row.get(2)?))
    }

    fn decode(raw: (String, chrono::NaiveDateTime, String)) -> RepositoryResult<PlanRecord> {
        let (run_id, stored_at, plan_json) = raw;
        let plan: AllocationPlan = serde_json::from_str(&plan_json)?;
        Ok(PlanRecord {
            run_id,
            stored_at,
            plan,
        })
    }

    /// 插入方案
    ///
    /// # 返回
    /// - Ok(PlanRecord): 带新 run_id 的落库记录
    pub fn insert(&self, plan: &AllocationPlan) -> RepositoryResult<PlanRecord> {
        let run_id = Uuid::new_v4().to_string();
        let stored_at = Local::now().naive_local();
        let plan_json = serde_json::to_string(plan)?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO allocation_plan (
                run_id, plan_id, kind, as_of_date, plan_json, stored_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                run_id,
                plan.plan_id,
                plan.kind.to_db_str(),
                fmt_date(plan.as_of_date),
                plan_json,
                fmt_datetime(stored_at),
            ],
        )?;

        Ok(PlanRecord {
            run_id,
            stored_at,
            plan: plan.clone(),
        })
    }

    pub fn find_by_run_id(&self, run_id: &str) -> RepositoryResult<Option<PlanRecord>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                "SELECT run_id, stored_at, plan_json FROM allocation_plan WHERE run_id = ?1",
                params![run_id],
                Self::map_record,
            )
            .optional()?;
        raw.map(Self::decode).transpose()
    }

    /// 按 plan_id 查最近一次落库
    pub fn find_latest_by_plan_id(&self, plan_id: &str) -> RepositoryResult<Option<PlanRecord>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                r#"
                SELECT run_id, stored_at, plan_json
                FROM allocation_plan
                WHERE plan_id = ?1
                ORDER BY stored_at DESC, run_id DESC
                LIMIT 1
                "#,
                params![plan_id],
                Self::map_record,
            )
            .optional()?;
        raw.map(Self::decode).transpose()
    }

    /// 最近的方案（新在前），可按类型过滤
    pub fn list_recent(&self, kind: Option<PlanKind>, limit: usize) -> RepositoryResult<Vec<PlanRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, stored_at, plan_json
            FROM allocation_plan
            WHERE (?1 IS NULL OR kind = ?1)
            ORDER BY stored_at DESC, run_id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![kind.map(|k| k.to_db_str()), limit as i64],
                Self::map_record,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        rows.into_iter().map(Self::decode).collect()
    }
}

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use logscope_types::{InstanceId, InstanceInfo, PriorityMask, ScopeInfo};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use crate::FilterError;

/// Catalog tables written by the log collector
const CATALOG_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS instances (
        cookie_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        location TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS scopes (
        scope_id INTEGER NOT NULL,
        cookie_id INTEGER NOT NULL,
        scope_name TEXT NOT NULL,
        scope_prio INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cookie_id INTEGER NOT NULL,
        scope_id INTEGER NOT NULL,
        msg_prio INTEGER NOT NULL,
        time_created INTEGER NOT NULL,
        message TEXT NOT NULL
    );
"#;

/// Durable per-(scope, target) masks
const FILTER_RULES_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS filter_rules (
        scope_id INTEGER NOT NULL,
        target_id INTEGER NOT NULL,
        log_mask INTEGER NOT NULL,
        PRIMARY KEY (scope_id, target_id)
    );
"#;

/// Rows visible for a target after applying its filter rules
const FILTERED_LOGS_FROM: &str = r#"
    FROM logs
    JOIN filter_rules
      ON logs.scope_id = filter_rules.scope_id
     AND logs.cookie_id = filter_rules.target_id
    WHERE logs.cookie_id = ?1
      AND (logs.msg_prio & filter_rules.log_mask) != 0
"#;

/// A stored log message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRow {
    pub id: i64,
    pub instance_id: InstanceId,
    pub scope_id: u32,
    pub priority: u32,
    pub time_created: DateTime<Utc>,
    pub message: String,
}

impl LogRow {
    pub fn mask(&self) -> PriorityMask {
        PriorityMask::from_bits_truncate(self.priority)
    }
}

/// SQLite log store with the two-table filter scheme
pub struct FilterStore {
    conn: Connection,

    /// Mask written by a full reset and for unconfigured scopes
    default_mask: PriorityMask,
}

impl FilterStore {
    /// Open a log store file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FilterError> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Wrap an already open connection, e.g. an in-memory database
    pub fn from_connection(conn: Connection) -> Result<Self, FilterError> {
        conn.execute_batch(FILTER_RULES_SCHEMA)?;
        Ok(Self {
            conn,
            default_mask: PriorityMask::NOT_SET | PriorityMask::VALID,
        })
    }

    /// Override the reset mask
    pub fn with_default_mask(mut self, mask: PriorityMask) -> Self {
        self.default_mask = mask;
        self
    }

    pub fn default_mask(&self) -> PriorityMask {
        self.default_mask
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create the catalog tables if the file does not have them yet
    pub fn create_catalog(&self) -> Result<(), FilterError> {
        self.conn.execute_batch(CATALOG_SCHEMA)?;
        Ok(())
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// Instances recorded in the store
    pub fn instances(&self) -> Result<Vec<InstanceInfo>, FilterError> {
        let mut stmt = self
            .conn
            .prepare("SELECT cookie_id, name, location FROM instances ORDER BY cookie_id")?;

        let rows = stmt.query_map([], |row| {
            Ok(InstanceInfo {
                instance_id: row.get::<_, i64>(0)? as InstanceId,
                name: row.get(1)?,
                location: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Scopes recorded for one instance
    pub fn scopes(&self, instance_id: InstanceId) -> Result<Vec<ScopeInfo>, FilterError> {
        let mut stmt = self.conn.prepare(
            "SELECT scope_name, scope_id, scope_prio FROM scopes
              WHERE cookie_id = ?1
              ORDER BY scope_id",
        )?;

        let rows = stmt.query_map(params![instance_id as i64], |row| {
            Ok(ScopeInfo {
                name: row.get(0)?,
                scope_id: row.get::<_, i64>(1)? as u32,
                priority: row.get::<_, i64>(2)? as u32,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ========================================================================
    // Filter Rules
    // ========================================================================

    /// Add a rule with the default mask for every catalog scope lacking one
    pub fn seed_filter_rules(&self) -> Result<usize, FilterError> {
        let seeded = self.conn.execute(
            "INSERT OR IGNORE INTO filter_rules (scope_id, target_id, log_mask)
             SELECT scope_id, cookie_id, ?1 FROM scopes",
            params![self.default_mask.bits()],
        )?;
        debug!(seeded, "seeded filter rules");
        Ok(seeded)
    }

    /// Apply a batch of `(scope_id, mask)` changes for one target.
    ///
    /// The batch is staged in `filter_masks` and copied into `filter_rules`
    /// in a single transaction. An empty batch resets the target instead.
    pub fn apply_filters(
        &mut self,
        target: InstanceId,
        masks: &[(u32, PriorityMask)],
    ) -> Result<usize, FilterError> {
        if masks.is_empty() {
            return self.reset_filters(target);
        }

        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DROP TABLE IF EXISTS temp.filter_masks;
             CREATE TEMP TABLE filter_masks (
                 scope_id INTEGER PRIMARY KEY,
                 log_mask INTEGER NOT NULL
             );",
        )?;

        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO filter_masks (scope_id, log_mask) VALUES (?1, ?2)",
            )?;
            for (scope_id, mask) in masks {
                insert.execute(params![scope_id, mask.bits()])?;
            }
        }

        let updated = tx.execute(
            "UPDATE filter_rules
                SET log_mask = (SELECT log_mask FROM filter_masks
                                 WHERE filter_masks.scope_id = filter_rules.scope_id)
              WHERE target_id = ?1
                AND scope_id IN (SELECT scope_id FROM filter_masks)",
            params![target as i64],
        )?;

        tx.execute_batch("DROP TABLE temp.filter_masks;")?;
        tx.commit()?;

        debug!(target, staged = masks.len(), updated, "applied filter batch");
        Ok(updated)
    }

    /// Reset every rule of a target to the default mask
    pub fn reset_filters(&mut self, target: InstanceId) -> Result<usize, FilterError> {
        let updated = self.conn.execute(
            "UPDATE filter_rules SET log_mask = ?1 WHERE target_id = ?2",
            params![self.default_mask.bits(), target as i64],
        )?;
        debug!(target, updated, "reset filter rules");
        Ok(updated)
    }

    /// Stored masks of every rule of a target, keyed by scope id
    pub fn filter_rules(
        &self,
        target: InstanceId,
    ) -> Result<HashMap<u32, PriorityMask>, FilterError> {
        let mut stmt = self
            .conn
            .prepare("SELECT scope_id, log_mask FROM filter_rules WHERE target_id = ?1")?;

        let rows = stmt.query_map(params![target as i64], |row| {
            let scope_id = row.get::<_, i64>(0)? as u32;
            let mask = row.get::<_, i64>(1)? as u32;
            Ok((scope_id, PriorityMask::from_bits_truncate(mask)))
        })?;

        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }

    /// Tree mask matching a stored rule.
    ///
    /// A rule holding a default mask that carries `NOT_SET` reads back as
    /// `NOT_SET`, the same value [`leaf_filters`](crate::leaf_filters) turns
    /// into the default mask when writing.
    pub fn tree_mask(&self, rule: PriorityMask) -> PriorityMask {
        if rule == self.default_mask && self.default_mask.contains(PriorityMask::NOT_SET) {
            PriorityMask::NOT_SET
        } else {
            rule.normalized()
        }
    }

    /// Current mask of one rule
    pub fn filter_mask(
        &self,
        target: InstanceId,
        scope_id: u32,
    ) -> Result<Option<u32>, FilterError> {
        let mask = self
            .conn
            .query_row(
                "SELECT log_mask FROM filter_rules WHERE target_id = ?1 AND scope_id = ?2",
                params![target as i64, scope_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(mask.map(|m| m as u32))
    }

    // ========================================================================
    // Log Queries
    // ========================================================================

    /// Log rows of a target passing its filter rules, oldest first
    pub fn filtered_logs(
        &self,
        target: InstanceId,
        limit: usize,
    ) -> Result<Vec<LogRow>, FilterError> {
        let sql = format!(
            "SELECT logs.id, logs.cookie_id, logs.scope_id, logs.msg_prio,
                    logs.time_created, logs.message
             {}
             ORDER BY logs.time_created, logs.id
             LIMIT ?2",
            FILTERED_LOGS_FROM
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt.query_map(params![target as i64, limit as i64], |row| {
            let millis: i64 = row.get(4)?;
            Ok(LogRow {
                id: row.get(0)?,
                instance_id: row.get::<_, i64>(1)? as InstanceId,
                scope_id: row.get::<_, i64>(2)? as u32,
                priority: row.get::<_, i64>(3)? as u32,
                time_created: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
                message: row.get(5)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Number of log rows of a target passing its filter rules
    pub fn count_filtered_logs(&self, target: InstanceId) -> Result<usize, FilterError> {
        let sql = format!("SELECT COUNT(*) {}", FILTERED_LOGS_FROM);
        let count: i64 = self
            .conn
            .query_row(&sql, params![target as i64], |row| row.get(0))?;
        Ok(count as usize)
    }
}

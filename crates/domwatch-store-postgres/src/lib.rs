// # PostgreSQL Snapshot Store
//
// SnapshotStore backed by two tables:
//
// - `domain_info`: one live row per domain, maintained by the registrar
//   tooling and updated field by field by domwatch
// - `domain_info_history`: append-only rows, one per observed change
//
// ## Schema
//
// ```sql
// CREATE TABLE domain_info (
//     name        TEXT PRIMARY KEY,
//     registrar   TEXT NOT NULL DEFAULT '',
//     state       TEXT NOT NULL DEFAULT '',
//     tier        TEXT NOT NULL DEFAULT '',
//     transfer_to TEXT NOT NULL DEFAULT '',
//     last_check  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//     spf         TEXT NOT NULL DEFAULT '',
//     dmarc       TEXT NOT NULL DEFAULT '',
//     nameservers TEXT NOT NULL DEFAULT '',
//     status      BOOLEAN NOT NULL DEFAULT TRUE,
//     whois       TEXT NOT NULL DEFAULT ''
// );
// ```
//
// `domain_info_history` has the same columns plus `id BIGSERIAL PRIMARY KEY`
// and no uniqueness on `name`. The latest history row is the one with the
// greatest `last_check`, ties broken by `id`.
//
// Text columns are read through `COALESCE` so rows written by older tooling
// with NULLs still load.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domwatch_core::traits::SnapshotStore;
use domwatch_core::{DomainSnapshot, Error, Result, SnapshotField};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

/// How long to wait for a pooled connection
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const SELECT_COLUMNS: &str = "name, \
    COALESCE(registrar, '') AS registrar, \
    COALESCE(state, '') AS state, \
    COALESCE(tier, '') AS tier, \
    COALESCE(transfer_to, '') AS transfer_to, \
    COALESCE(last_check, NOW()) AS last_check, \
    COALESCE(spf, '') AS spf, \
    COALESCE(dmarc, '') AS dmarc, \
    COALESCE(nameservers, '') AS nameservers, \
    COALESCE(status, FALSE) AS status, \
    COALESCE(whois, '') AS whois";

const CREATE_LIVE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS domain_info (
        name        TEXT PRIMARY KEY,
        registrar   TEXT NOT NULL DEFAULT '',
        state       TEXT NOT NULL DEFAULT '',
        tier        TEXT NOT NULL DEFAULT '',
        transfer_to TEXT NOT NULL DEFAULT '',
        last_check  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        spf         TEXT NOT NULL DEFAULT '',
        dmarc       TEXT NOT NULL DEFAULT '',
        nameservers TEXT NOT NULL DEFAULT '',
        status      BOOLEAN NOT NULL DEFAULT TRUE,
        whois       TEXT NOT NULL DEFAULT ''
    )
"#;

const CREATE_HISTORY_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS domain_info_history (
        id          BIGSERIAL PRIMARY KEY,
        name        TEXT NOT NULL,
        registrar   TEXT NOT NULL DEFAULT '',
        state       TEXT NOT NULL DEFAULT '',
        tier        TEXT NOT NULL DEFAULT '',
        transfer_to TEXT NOT NULL DEFAULT '',
        last_check  TIMESTAMPTZ NOT NULL,
        spf         TEXT NOT NULL DEFAULT '',
        dmarc       TEXT NOT NULL DEFAULT '',
        nameservers TEXT NOT NULL DEFAULT '',
        status      BOOLEAN NOT NULL DEFAULT TRUE,
        whois       TEXT NOT NULL DEFAULT ''
    )
"#;

const CREATE_HISTORY_INDEX: &str = "CREATE INDEX IF NOT EXISTS domain_info_history_name_idx \
    ON domain_info_history (name, last_check DESC, id DESC)";

/// PostgreSQL-backed snapshot store
#[derive(Debug, Clone)]
pub struct PostgresSnapshotStore {
    pool: PgPool,
}

impl PostgresSnapshotStore {
    /// Connect and verify the database answers
    ///
    /// # Errors
    ///
    /// Returns a store error when the server is unreachable or rejects the
    /// credentials. The URL is never included in the error.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| Error::store(format!("Failed to connect to PostgreSQL: {}", e)))?;

        let store = Self::from_pool(pool);
        store.ping().await?;
        tracing::info!("Connected to PostgreSQL");
        Ok(store)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run `SELECT 1`
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::store(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    /// Create the tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in [CREATE_LIVE_TABLE, CREATE_HISTORY_TABLE, CREATE_HISTORY_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::store(format!("Failed to create schema: {}", e)))?;
        }
        tracing::debug!("Schema verified");
        Ok(())
    }

    /// Insert or replace a live row
    pub async fn upsert_domain(&self, snapshot: &DomainSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO domain_info (name, registrar, state, tier, transfer_to, last_check, spf, dmarc, nameservers, status, whois)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (name) DO UPDATE SET
                registrar = EXCLUDED.registrar,
                state = EXCLUDED.state,
                tier = EXCLUDED.tier,
                transfer_to = EXCLUDED.transfer_to,
                last_check = EXCLUDED.last_check,
                spf = EXCLUDED.spf,
                dmarc = EXCLUDED.dmarc,
                nameservers = EXCLUDED.nameservers,
                status = EXCLUDED.status,
                whois = EXCLUDED.whois
            "#,
        )
        .bind(&snapshot.name)
        .bind(&snapshot.registrar)
        .bind(&snapshot.state)
        .bind(&snapshot.tier)
        .bind(&snapshot.transfer_to)
        .bind(snapshot.last_check)
        .bind(&snapshot.spf)
        .bind(&snapshot.dmarc)
        .bind(&snapshot.nameservers)
        .bind(snapshot.active)
        .bind(&snapshot.whois)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::store(format!("Failed to upsert {}: {}", snapshot.name, e)))?;
        Ok(())
    }
}

fn row_to_snapshot(row: &PgRow) -> std::result::Result<DomainSnapshot, sqlx::Error> {
    Ok(DomainSnapshot {
        name: row.try_get("name")?,
        registrar: row.try_get("registrar")?,
        state: row.try_get("state")?,
        tier: row.try_get("tier")?,
        transfer_to: row.try_get("transfer_to")?,
        last_check: row.try_get::<DateTime<Utc>, _>("last_check")?,
        spf: row.try_get("spf")?,
        dmarc: row.try_get("dmarc")?,
        nameservers: row.try_get("nameservers")?,
        active: row.try_get("status")?,
        whois: row.try_get("whois")?,
    })
}

fn decode(row: &PgRow) -> Result<DomainSnapshot> {
    row_to_snapshot(row).map_err(|e| Error::store(format!("Failed to decode row: {}", e)))
}

/// UPDATE statement for one live-table field
///
/// The column name comes from a fixed list, never from input.
fn update_statement(field: SnapshotField) -> String {
    format!(
        "UPDATE domain_info SET {} = $1, last_check = NOW() WHERE name = $2",
        field.column()
    )
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn list_active(&self) -> Result<Vec<DomainSnapshot>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM domain_info WHERE status = TRUE ORDER BY name",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::store(format!("Failed to list active domains: {}", e)))?;

        rows.iter().map(decode).collect()
    }

    async fn get_current(&self, domain: &str) -> Result<Option<DomainSnapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM domain_info WHERE name = $1",
            SELECT_COLUMNS
        ))
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::store(format!("Failed to load {}: {}", domain, e)))?;

        row.as_ref().map(decode).transpose()
    }

    async fn get_latest_history(&self, domain: &str) -> Result<Option<DomainSnapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM domain_info_history WHERE name = $1 \
             ORDER BY last_check DESC, id DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::store(format!("Failed to load history of {}: {}", domain, e)))?;

        row.as_ref().map(decode).transpose()
    }

    async fn update_field(&self, domain: &str, field: SnapshotField, value: &str) -> Result<()> {
        sqlx::query(&update_statement(field))
            .bind(value)
            .bind(domain)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::store(format!(
                    "Failed to update {} for {}: {}",
                    field.column(),
                    domain,
                    e
                ))
            })?;
        Ok(())
    }

    async fn append_history(&self, snapshot: &DomainSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO domain_info_history (name, registrar, state, tier, transfer_to, last_check, spf, dmarc, nameservers, status, whois)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&snapshot.name)
        .bind(&snapshot.registrar)
        .bind(&snapshot.state)
        .bind(&snapshot.tier)
        .bind(&snapshot.transfer_to)
        .bind(snapshot.last_check)
        .bind(&snapshot.spf)
        .bind(&snapshot.dmarc)
        .bind(&snapshot.nameservers)
        .bind(snapshot.active)
        .bind(&snapshot.whois)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::store(format!(
                "Failed to append history for {}: {}",
                snapshot.name, e
            ))
        })?;
        Ok(())
    }
}

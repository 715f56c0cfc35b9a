//! # Mirror Writes
//!
//! Column-safe statements for rows arriving from the remote. Every column
//! name comes from the static [`schema`](crate::schema); payload keys the
//! schema does not list are ignored.
//!
//! ```text
//! remote row {"id":…, "name":…, "bogus":…}
//!      │
//!      ▼
//! INSERT INTO products (id, name, revision) VALUES (?, ?, ?)
//! ON CONFLICT(id) DO UPDATE SET name = excluded.name, revision = excluded.revision
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::SqliteConnection;

use crate::error::{DbError, DbResult};
use crate::schema::TableSpec;

/// Sync-relevant state of one local row.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRowState {
    pub revision: i64,
    /// Parsed stamp column; `None` when it is missing or unparseable.
    pub stamp: Option<DateTime<Utc>>,
}

pub async fn row_state(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
    row_id: &str,
) -> DbResult<Option<LocalRowState>> {
    let sql = format!(
        "SELECT revision, {} FROM {} WHERE {} = ?",
        spec.stamp, spec.name, spec.pk
    );
    let row: Option<(i64, Option<String>)> = sqlx::query_as(&sql)
        .bind(row_id)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(|(revision, stamp)| LocalRowState {
        revision,
        stamp: stamp.as_deref().and_then(parse_stamp),
    }))
}

/// Parses a stored timestamp (RFC 3339, as written by sqlx).
pub fn parse_stamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Inserts or overwrites a row with the remote state and revision.
///
/// Append-only tables keep their content and only take the revision.
pub async fn upsert(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
    data: &Map<String, Value>,
    revision: i64,
) -> DbResult<()> {
    let columns: Vec<&'static str> = spec
        .columns
        .iter()
        .copied()
        .filter(|c| data.contains_key(*c))
        .collect();

    if !columns.contains(&spec.pk) {
        return Err(DbError::decode(spec.pk, "remote row has no primary key"));
    }

    let placeholders = vec!["?"; columns.len() + 1].join(", ");
    let assignments = if spec.append_only {
        "revision = excluded.revision".to_string()
    } else {
        columns
            .iter()
            .filter(|c| **c != spec.pk)
            .map(|c| format!("{c} = excluded.{c}"))
            .chain(std::iter::once("revision = excluded.revision".to_string()))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let sql = format!(
        "INSERT INTO {table} ({cols}, revision) VALUES ({placeholders}) \
         ON CONFLICT({pk}) DO UPDATE SET {assignments}",
        table = spec.name,
        cols = columns.join(", "),
        pk = spec.pk,
    );

    let mut query = sqlx::query(&sql);
    for column in &columns {
        query = match data.get(*column).unwrap_or(&Value::Null) {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query.bind(revision).execute(conn).await?;

    Ok(())
}

/// Removes a row. Append-only tables are never deleted.
pub async fn delete(conn: &mut SqliteConnection, spec: &TableSpec, row_id: &str) -> DbResult<u64> {
    if spec.append_only {
        return Ok(0);
    }

    let sql = format!("DELETE FROM {} WHERE {} = ?", spec.name, spec.pk);
    let result = sqlx::query(&sql).bind(row_id).execute(conn).await?;
    Ok(result.rows_affected())
}

/// Stamps the server revision onto a row without touching its content.
pub async fn set_revision(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
    row_id: &str,
    revision: i64,
) -> DbResult<()> {
    let sql = format!(
        "UPDATE {} SET revision = ? WHERE {} = ? AND revision < ?",
        spec.name, spec.pk
    );
    sqlx::query(&sql)
        .bind(revision)
        .bind(row_id)
        .bind(revision)
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::schema;
    use crate::store::LocalStore;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_ignores_unknown_columns_and_sets_revision() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let spec = schema::table("categories").unwrap();
        let data = object(json!({
            "id": "c1",
            "name": "Wash",
            "created_at": "2026-01-01T00:00:00+00:00",
            "updated_at": "2026-01-01T00:00:00+00:00",
            "drop_table": "x"
        }));

        let mut tx = store.begin_remote().await.unwrap();
        upsert(tx.conn(), spec, &data, 7).await.unwrap();
        let state = row_state(tx.conn(), spec, "c1").await.unwrap().unwrap();
        tx.commit().await.unwrap();

        assert_eq!(state.revision, 7);
        assert_eq!(state.stamp, parse_stamp("2026-01-01T00:00:00+00:00"));
    }

    #[tokio::test]
    async fn test_append_only_rows_are_not_overwritten_or_deleted() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let spec = schema::table("inventory_logs").unwrap();
        let row = json!({
            "id": "l1",
            "product_id": "p1",
            "product_name": "Wax",
            "change_type": "stock_adjustment",
            "quantity_before": 5,
            "quantity_after": 4,
            "threshold_before": 10,
            "threshold_after": 10,
            "reason": "Sale",
            "created_at": "2026-01-01T00:00:00+00:00"
        });

        let mut tx = store.begin_remote().await.unwrap();
        upsert(tx.conn(), spec, &object(row.clone()), 1).await.unwrap();

        let mut changed = object(row);
        changed.insert("quantity_after".into(), json!(0));
        upsert(tx.conn(), spec, &changed, 2).await.unwrap();
        assert_eq!(delete(tx.conn(), spec, "l1").await.unwrap(), 0);
        tx.commit().await.unwrap();

        let logs = store.inventory_logs().list(&Default::default()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].quantity_after, 4);
    }

    #[test]
    fn test_parse_stamp() {
        assert!(parse_stamp("2026-10-14T08:30:00.123456+00:00").is_some());
        assert!(parse_stamp("yesterday").is_none());
    }
}

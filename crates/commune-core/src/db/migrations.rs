//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Schema steps, applied in order; each version runs at most once.
const MIGRATIONS: &[(i32, &[&str])] = &[
    (
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            // created_at is the normalized epoch-ms ordering key
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                body TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at)",
            // participants are matched through json_each(body)
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                updated_at INTEGER NOT NULL,
                body TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_conversations_updated
                ON conversations(updated_at DESC)",
        ],
    ),
    (
        2,
        &[
            "CREATE TABLE IF NOT EXISTS profiles (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
            // device-local records: outbox, offline flag
            "CREATE TABLE IF NOT EXISTS settings (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        ],
    ),
];

fn latest_version() -> i32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

/// Bring the schema up to the latest version.
pub async fn run(conn: &Connection) -> Result<()> {
    let current = schema_version(conn).await?;
    for (version, statements) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        apply(conn, *version, statements).await?;
    }
    Ok(())
}

async fn schema_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            (),
        )
        .await?;
    if rows.next().await?.is_none() {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    Ok(match rows.next().await? {
        Some(row) => row.get(0)?,
        None => 0,
    })
}

async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN", ()).await?;
    match apply_statements(conn, version, statements).await {
        Ok(()) => {
            conn.execute("COMMIT", ()).await?;
            tracing::info!(
                "Applied schema version {version} of {}",
                latest_version()
            );
            Ok(())
        }
        Err(e) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(e)
        }
    }
}

async fn apply_statements(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    for statement in statements {
        conn.execute(statement, ()).await?;
    }
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        libsql::params![version],
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                [name],
            )
            .await
            .unwrap();
        rows.next().await.unwrap().is_some()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        assert_eq!(schema_version(&conn).await.unwrap(), latest_version());
        for table in ["messages", "conversations", "profiles", "settings"] {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_partial_schema_is_completed() {
        let conn = setup().await;
        let (version, statements) = MIGRATIONS[0];
        apply(&conn, version, statements).await.unwrap();
        assert!(!table_exists(&conn, "settings").await);

        run(&conn).await.unwrap();
        assert!(table_exists(&conn, "settings").await);
        assert_eq!(schema_version(&conn).await.unwrap(), latest_version());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        assert_eq!(schema_version(&conn).await.unwrap(), latest_version());
    }
}

use std::path::Path;

use sqlx::postgres::PgPool;

/// Apply every `.sql` file under the migrations directory, in filename
/// order. Statements are idempotent (`IF NOT EXISTS`), so re-running on an
/// existing database is safe.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let dir = ["migrations", "server/migrations"]
        .into_iter()
        .map(Path::new)
        .find(|path| path.is_dir())
        .ok_or_else(|| anyhow::anyhow!("migrations directory not found"))?;

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| ext == "sql")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let name = path.file_name().unwrap_or_default().to_string_lossy().into_owned();
        tracing::info!(migration = %name, "applying migration");

        let sql = std::fs::read_to_string(&path)?;
        sqlx::raw_sql(&sql)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("migration {name} failed: {e}"))?;
    }

    Ok(())
}

pub mod migrations;
pub mod queries;

use anyhow::Context;
use rusqlite::Connection;

use crate::models::sample_lots;

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Fills an empty `parking_lots` table with the bundled lots. Returns how
/// many rows were inserted.
pub fn seed_sample_lots(conn: &Connection) -> anyhow::Result<usize> {
    if queries::count_lots(conn)? > 0 {
        return Ok(0);
    }

    let lots = sample_lots();
    for lot in &lots {
        queries::upsert_lot(conn, lot)?;
    }
    tracing::info!(count = lots.len(), "seeded sample parking lots");
    Ok(lots.len())
}

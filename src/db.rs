use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("athletics.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS districts(
            nces_id TEXT PRIMARY KEY,
            state_lea_id TEXT,
            name TEXT,
            state TEXT,
            state_name TEXT,
            address TEXT,
            city TEXT,
            zip TEXT,
            zip4 TEXT,
            phone TEXT,
            website TEXT,
            lea_type TEXT,
            lea_type_text TEXT,
            charter_lea TEXT,
            operational_status TEXT,
            operational_status_text TEXT,
            lowest_grade TEXT,
            highest_grade TEXT,
            operational_schools INTEGER NOT NULL DEFAULT 0
                CHECK(operational_schools >= 0),
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_districts_state ON districts(state)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            token_hash TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_runs(
            id TEXT PRIMARY KEY,
            user_id TEXT,
            file_name TEXT NOT NULL,
            file_type TEXT NOT NULL,
            total INTEGER NOT NULL,
            inserted INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            skipped INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_runs_created ON import_runs(created_at)",
        [],
    )?;

    // Workspaces created before the dropped-row telemetry landed lack the
    // skipped column. Add and default it.
    ensure_import_runs_skipped(&conn)?;

    Ok(conn)
}

fn ensure_import_runs_skipped(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "import_runs", "skipped")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE import_runs ADD COLUMN skipped INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Play-state revision, lets late writers detect that they hold an older copy
ALTER TABLE games ADD COLUMN revision INTEGER NOT NULL DEFAULT 0;
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Media may now live outside the database; file_ref holds a path or URL
ALTER TABLE questions ADD COLUMN file_ref TEXT;

-- Progressive hints, JSON array of strings
ALTER TABLE questions ADD COLUMN hints TEXT NOT NULL DEFAULT '[]';
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

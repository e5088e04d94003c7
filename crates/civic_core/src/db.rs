use crate::error::PersistError;
use crate::schema::{Entity, Membership, Organization, Person, Record};
use crate::sink::{Ack, Sink};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

pub fn open(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    init(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

// Seat columns hold the post_id text as scraped. Lookups by seat filter on
// (jurisdiction_id, post_id) directly; nothing joins back to posts.
fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS people (
          jurisdiction_id TEXT NOT NULL,
          name TEXT NOT NULL,
          post_id TEXT NOT NULL,
          image TEXT,
          raw_json TEXT NOT NULL,
          inserted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
          PRIMARY KEY (jurisdiction_id, name, post_id)
        );
        CREATE INDEX IF NOT EXISTS idx_people_seat ON people(jurisdiction_id, post_id);

        CREATE TABLE IF NOT EXISTS organizations (
          jurisdiction_id TEXT NOT NULL,
          name TEXT NOT NULL,
          classification TEXT,
          parent TEXT,
          raw_json TEXT NOT NULL,
          inserted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
          PRIMARY KEY (jurisdiction_id, name)
        );

        CREATE TABLE IF NOT EXISTS posts (
          jurisdiction_id TEXT NOT NULL,
          organization TEXT NOT NULL,
          post_id TEXT NOT NULL,
          role TEXT NOT NULL,
          max_memberships INTEGER,
          PRIMARY KEY (jurisdiction_id, organization, post_id)
        );

        CREATE TABLE IF NOT EXISTS memberships (
          jurisdiction_id TEXT NOT NULL,
          person TEXT NOT NULL,
          organization TEXT NOT NULL,
          post_id TEXT NOT NULL DEFAULT '',
          role TEXT NOT NULL,
          start_date TEXT,
          end_date TEXT,
          raw_json TEXT NOT NULL,
          inserted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
          PRIMARY KEY (jurisdiction_id, person, organization, post_id)
        );
        CREATE INDEX IF NOT EXISTS idx_memberships_seat ON memberships(jurisdiction_id, post_id);
        "#,
    )?;
    Ok(())
}

pub fn upsert_person(conn: &Connection, jurisdiction_id: &str, person: &Person, raw_json: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO people (jurisdiction_id, name, post_id, image, raw_json)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(jurisdiction_id, name, post_id) DO UPDATE SET
          image=excluded.image,
          raw_json=excluded.raw_json
        "#,
        params![jurisdiction_id, person.name, person.post_id, person.image, raw_json],
    )?;
    Ok(())
}

pub fn upsert_organization(
    conn: &mut Connection,
    jurisdiction_id: &str,
    org: &Organization,
    raw_json: &str,
) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        r#"
        INSERT INTO organizations (jurisdiction_id, name, classification, parent, raw_json)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(jurisdiction_id, name) DO UPDATE SET
          classification=excluded.classification,
          parent=excluded.parent,
          raw_json=excluded.raw_json
        "#,
        params![jurisdiction_id, org.name, org.classification, org.parent, raw_json],
    )?;
    tx.execute(
        "DELETE FROM posts WHERE jurisdiction_id = ?1 AND organization = ?2",
        params![jurisdiction_id, org.name],
    )?;
    for post in &org.posts {
        tx.execute(
            r#"
            INSERT INTO posts (jurisdiction_id, organization, post_id, role, max_memberships)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![jurisdiction_id, org.name, post.post_id, post.role, post.max_memberships],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn upsert_membership(
    conn: &Connection,
    jurisdiction_id: &str,
    membership: &Membership,
    raw_json: &str,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO memberships (
          jurisdiction_id, person, organization, post_id,
          role, start_date, end_date, raw_json
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(jurisdiction_id, person, organization, post_id) DO UPDATE SET
          role=excluded.role,
          start_date=excluded.start_date,
          end_date=excluded.end_date,
          raw_json=excluded.raw_json
        "#,
        params![
            jurisdiction_id,
            membership.person,
            membership.organization,
            membership.post_id.as_deref().unwrap_or(""),
            membership.role,
            membership.start_date,
            membership.end_date,
            raw_json
        ],
    )?;
    Ok(())
}

fn stored_raw_json(conn: &Connection, record: &Record) -> Result<Option<String>> {
    let jurisdiction_id = &record.jurisdiction_id;
    let raw = match &record.entity {
        Entity::Person(p) => conn
            .query_row(
                "SELECT raw_json FROM people WHERE jurisdiction_id = ?1 AND name = ?2 AND post_id = ?3",
                params![jurisdiction_id, p.name, p.post_id],
                |row| row.get(0),
            )
            .optional()?,
        Entity::Organization(o) => conn
            .query_row(
                "SELECT raw_json FROM organizations WHERE jurisdiction_id = ?1 AND name = ?2",
                params![jurisdiction_id, o.name],
                |row| row.get(0),
            )
            .optional()?,
        Entity::Membership(m) => conn
            .query_row(
                r#"
                SELECT raw_json FROM memberships
                WHERE jurisdiction_id = ?1 AND person = ?2 AND organization = ?3 AND post_id = ?4
                "#,
                params![
                    jurisdiction_id,
                    m.person,
                    m.organization,
                    m.post_id.as_deref().unwrap_or("")
                ],
                |row| row.get(0),
            )
            .optional()?,
    };
    Ok(raw)
}

/// People seated at `post_id`, straight off the composite natural key.
pub fn people_at_seat(conn: &Connection, jurisdiction_id: &str, post_id: &str) -> Result<Vec<Person>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT raw_json FROM people
        WHERE jurisdiction_id = ?1 AND post_id = ?2
        ORDER BY name
        "#,
    )?;
    let rows = stmt.query_map(params![jurisdiction_id, post_id], |row| row.get::<_, String>(0))?;
    let mut people = Vec::new();
    for raw in rows {
        people.push(serde_json::from_str(&raw?)?);
    }
    Ok(people)
}

pub fn memberships_at_seat(
    conn: &Connection,
    jurisdiction_id: &str,
    post_id: &str,
) -> Result<Vec<Membership>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT raw_json FROM memberships
        WHERE jurisdiction_id = ?1 AND post_id = ?2
        ORDER BY organization, person
        "#,
    )?;
    let rows = stmt.query_map(params![jurisdiction_id, post_id], |row| row.get::<_, String>(0))?;
    let mut memberships = Vec::new();
    for raw in rows {
        memberships.push(serde_json::from_str(&raw?)?);
    }
    Ok(memberships)
}

/// SQLite-backed persistence sink.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_inner(self) -> Connection {
        self.conn
    }

    /// A re-scrape that differs only in source retrieval times is
    /// `Unchanged` and leaves the stored row as it was.
    fn store(&mut self, record: &Record) -> Result<Ack> {
        let raw_json = serde_json::to_string(&record.entity)?;
        if let Some(stored) = stored_raw_json(&self.conn, record)? {
            let stored: Value = serde_json::from_str(&stored)?;
            let incoming: Value = serde_json::from_str(&raw_json)?;
            if content_of(stored) == content_of(incoming) {
                return Ok(Ack::Unchanged);
            }
        }
        let jurisdiction_id = &record.jurisdiction_id;
        match &record.entity {
            Entity::Person(p) => upsert_person(&self.conn, jurisdiction_id, p, &raw_json)?,
            Entity::Organization(o) => {
                upsert_organization(&mut self.conn, jurisdiction_id, o, &raw_json)?
            }
            Entity::Membership(m) => upsert_membership(&self.conn, jurisdiction_id, m, &raw_json)?,
        }
        Ok(Ack::Stored)
    }
}

fn content_of(mut entity: Value) -> Value {
    if let Some(sources) = entity.get_mut("sources").and_then(Value::as_array_mut) {
        for source in sources.iter_mut().filter_map(Value::as_object_mut) {
            source.remove("retrieved_at");
        }
    }
    entity
}

impl Sink for SqliteSink {
    fn persist(&mut self, record: &Record) -> Result<Ack, PersistError> {
        self.store(record).map_err(PersistError::from)
    }
}

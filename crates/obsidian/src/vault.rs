use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;

pub struct VaultPaths {
    pub root: PathBuf,
    pub index_dir: PathBuf,
    pub people_dir: PathBuf,
    pub organizations_dir: PathBuf,
}

impl VaultPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            index_dir: root.join("00_Index"),
            people_dir: root.join("People"),
            organizations_dir: root.join("Organizations"),
            root,
        }
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.index_dir)?;
        fs::create_dir_all(&self.people_dir)?;
        fs::create_dir_all(&self.organizations_dir)?;
        Ok(())
    }
}

/// Counts of notes written by [`build_vault`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VaultSummary {
    pub people: usize,
    pub organizations: usize,
    pub seats: usize,
}

/// Notes live under one directory per jurisdiction. A person's note stem
/// also carries their seat, matching the `people` key.
pub fn build_vault(conn: &Connection, vault_root: &Path) -> Result<VaultSummary> {
    let paths = VaultPaths::new(vault_root);
    paths.ensure()?;
    let generated_at = generated_at();
    let mut summary = VaultSummary::default();

    let people = load_people(conn)?;
    let directory = PeopleIndex::new(&people);

    // 1) Person notes, collected by seat as we go
    // (jurisdiction_id, post_id) -> people; read off the people rows, no join
    let mut seats: BTreeMap<(String, String), Vec<&PersonRow>> = BTreeMap::new();

    for p in &people {
        write_person_note(&paths, p)?;
        seats
            .entry((p.jurisdiction_id.clone(), p.post_id.clone()))
            .or_default()
            .push(p);
        summary.people += 1;
    }

    // 2) Seat MOC
    let mut seat_lines = index_header("MOC - Seats", &generated_at);
    let mut current_jurisdiction: Option<&str> = None;
    for ((jurisdiction_id, post_id), seated) in &seats {
        if current_jurisdiction != Some(jurisdiction_id.as_str()) {
            seat_lines.push(format!("## {jurisdiction_id}"));
            seat_lines.push(String::new());
            current_jurisdiction = Some(jurisdiction_id.as_str());
        }
        let links: Vec<String> = seated.iter().map(|p| person_link(p)).collect();
        seat_lines.push(format!("- {post_id}: {}", links.join(", ")));
    }
    if seats.is_empty() {
        seat_lines.push("_No seated people found._".to_string());
    }
    summary.seats = seats.len();
    fs::write(paths.index_dir.join("MOC - Seats.md"), seat_lines.join("\n"))?;

    // 3) Organization notes
    let mut stmt = conn.prepare(
        r#"
        SELECT jurisdiction_id, name, classification, parent
        FROM organizations
        ORDER BY jurisdiction_id, name
        "#,
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(OrganizationRow {
            jurisdiction_id: row.get(0)?,
            name: row.get(1)?,
            classification: row.get(2)?,
            parent: row.get(3)?,
        })
    })?;

    let mut org_lines = index_header("MOC - Organizations", &generated_at);
    for r in rows {
        let o = r?;
        let posts = load_posts(conn, &o)?;
        let members = load_members(conn, &o)?;
        write_organization_note(&paths, &o, &posts, &members, &directory)?;
        org_lines.push(format!(
            "- {}{}",
            organization_link(&o.jurisdiction_id, &o.name),
            o.classification
                .as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default()
        ));
        summary.organizations += 1;
    }
    if summary.organizations == 0 {
        org_lines.push("_No organizations found._".to_string());
    }
    fs::write(
        paths.index_dir.join("MOC - Organizations.md"),
        org_lines.join("\n"),
    )?;

    tracing::info!(
        root = %paths.root.display(),
        people = summary.people,
        organizations = summary.organizations,
        seats = summary.seats,
        "vault built"
    );
    Ok(summary)
}

#[derive(Debug)]
struct PersonRow {
    jurisdiction_id: String,
    name: String,
    post_id: String,
    image: Option<String>,
    raw_json: String,
}

#[derive(Debug)]
struct OrganizationRow {
    jurisdiction_id: String,
    name: String,
    classification: Option<String>,
    parent: Option<String>,
}

#[derive(Debug)]
struct PostRow {
    post_id: String,
    role: String,
    max_memberships: Option<u32>,
}

#[derive(Debug)]
struct MemberRow {
    person: String,
    post_id: String,
    role: String,
}

/// Memberships name a person but not their seat; this maps the name back
/// to the person notes it could mean.
struct PeopleIndex<'p> {
    by_name: HashMap<(&'p str, &'p str), Vec<&'p PersonRow>>,
}

impl<'p> PeopleIndex<'p> {
    fn new(people: &'p [PersonRow]) -> Self {
        let mut by_name: HashMap<(&str, &str), Vec<&PersonRow>> = HashMap::new();
        for p in people {
            by_name
                .entry((p.jurisdiction_id.as_str(), p.name.as_str()))
                .or_default()
                .push(p);
        }
        Self { by_name }
    }

    /// Link to the person's note, or the bare name when it is ambiguous or
    /// unknown. A seat match breaks ties between namesakes.
    fn link(&self, jurisdiction_id: &str, name: &str, post_id: &str) -> String {
        let candidates = self
            .by_name
            .get(&(jurisdiction_id, name))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let person = match candidates {
            [only] => Some(*only),
            _ => candidates.iter().copied().find(|p| p.post_id == post_id),
        };
        match person {
            Some(p) => person_link(p),
            None => name.to_string(),
        }
    }
}

fn load_people(conn: &Connection) -> Result<Vec<PersonRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT jurisdiction_id, name, post_id, image, raw_json
        FROM people
        ORDER BY jurisdiction_id, post_id, name
        "#,
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(PersonRow {
            jurisdiction_id: row.get(0)?,
            name: row.get(1)?,
            post_id: row.get(2)?,
            image: row.get(3)?,
            raw_json: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn load_posts(conn: &Connection, org: &OrganizationRow) -> Result<Vec<PostRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT post_id, role, max_memberships
        FROM posts
        WHERE jurisdiction_id = ?1 AND organization = ?2
        ORDER BY post_id
        "#,
    )?;
    let rows = stmt.query_map(params![org.jurisdiction_id, org.name], |row| {
        Ok(PostRow {
            post_id: row.get(0)?,
            role: row.get(1)?,
            max_memberships: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn load_members(conn: &Connection, org: &OrganizationRow) -> Result<Vec<MemberRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT person, post_id, role
        FROM memberships
        WHERE jurisdiction_id = ?1 AND organization = ?2
        ORDER BY post_id, person
        "#,
    )?;
    let rows = stmt.query_map(params![org.jurisdiction_id, org.name], |row| {
        Ok(MemberRow {
            person: row.get(0)?,
            post_id: row.get(1)?,
            role: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn write_person_note(paths: &VaultPaths, p: &PersonRow) -> Result<()> {
    let dir = paths.people_dir.join(jurisdiction_dir(&p.jurisdiction_id));
    fs::create_dir_all(&dir)?;
    let note_path = dir.join(format!("{}.md", person_stem(&p.name, &p.post_id)));
    let raw: Value = serde_json::from_str(&p.raw_json).with_context(|| {
        format!(
            "stored person {} ({}) in {} has unreadable raw_json",
            p.name, p.post_id, p.jurisdiction_id
        )
    })?;

    let mut md = String::new();
    md.push_str("---\n");
    md.push_str(&format!("name: {}\n", yaml_scalar(&p.name)));
    md.push_str(&format!("post_id: {}\n", yaml_scalar(&p.post_id)));
    md.push_str(&format!("jurisdiction_id: {}\n", yaml_scalar(&p.jurisdiction_id)));
    if let Some(image) = &p.image {
        md.push_str(&format!("image: {}\n", yaml_scalar(image)));
    }
    md.push_str("---\n\n");

    md.push_str(&format!("# {}\n\n", p.name));
    md.push_str(&format!("- Seat: `{}`\n", p.post_id));

    let committees = string_pairs(&raw["memberships"], "organization", "role");
    if !committees.is_empty() {
        md.push_str("\n## Memberships\n");
        for (org, role) in committees {
            md.push_str(&format!(
                "- {}: {}\n",
                organization_link(&p.jurisdiction_id, &org),
                role
            ));
        }
    }

    let links = string_pairs(&raw["links"], "note", "url");
    if !links.is_empty() {
        md.push_str("\n## Links\n");
        for (note, url) in links {
            md.push_str(&format!("- [{note}]({url})\n"));
        }
    }

    push_sources(&mut md, &raw);
    fs::write(note_path, md)?;
    Ok(())
}

fn write_organization_note(
    paths: &VaultPaths,
    o: &OrganizationRow,
    posts: &[PostRow],
    members: &[MemberRow],
    directory: &PeopleIndex<'_>,
) -> Result<()> {
    let dir = paths
        .organizations_dir
        .join(jurisdiction_dir(&o.jurisdiction_id));
    fs::create_dir_all(&dir)?;
    let note_path = dir.join(format!("{}.md", note_stem(&o.name)));

    let mut md = String::new();
    md.push_str("---\n");
    md.push_str(&format!("name: {}\n", yaml_scalar(&o.name)));
    md.push_str(&format!("jurisdiction_id: {}\n", yaml_scalar(&o.jurisdiction_id)));
    if let Some(classification) = &o.classification {
        md.push_str(&format!("classification: {}\n", yaml_scalar(classification)));
    }
    if let Some(parent) = &o.parent {
        md.push_str(&format!("parent: {}\n", yaml_scalar(parent)));
    }
    md.push_str("---\n\n");

    md.push_str(&format!("# {}\n\n", o.name));
    if let Some(parent) = &o.parent {
        md.push_str(&format!(
            "Part of {}.\n\n",
            organization_link(&o.jurisdiction_id, parent)
        ));
    }

    md.push_str("## Posts\n");
    if posts.is_empty() {
        md.push_str("_No posts recorded._\n");
    }
    for post in posts {
        match post.max_memberships {
            Some(cap) => md.push_str(&format!("- {} ({}, max {cap})\n", post.post_id, post.role)),
            None => md.push_str(&format!("- {} ({})\n", post.post_id, post.role)),
        }
    }

    md.push_str("\n## Members\n");
    if members.is_empty() {
        md.push_str("_No members recorded._\n");
    }
    for m in members {
        let person = directory.link(&o.jurisdiction_id, &m.person, &m.post_id);
        if m.post_id.is_empty() {
            md.push_str(&format!("- {person}: {}\n", m.role));
        } else {
            md.push_str(&format!("- {person}: {} at `{}`\n", m.role, m.post_id));
        }
    }

    fs::write(note_path, md)?;
    Ok(())
}

fn push_sources(md: &mut String, raw: &Value) {
    md.push_str("\n## Sources\n");
    let sources: Vec<&str> = raw["sources"]
        .as_array()
        .map(|items| items.iter().filter_map(|s| s["value"].as_str()).collect())
        .unwrap_or_default();
    if sources.is_empty() {
        md.push_str("_No sources recorded._\n");
    }
    for source in sources {
        md.push_str(&format!("- {source}\n"));
    }
}

fn string_pairs(value: &Value, left: &str, right: &str) -> Vec<(String, String)> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some((
                        item[left].as_str()?.to_string(),
                        item[right].as_str()?.to_string(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn person_link(p: &PersonRow) -> String {
    format!(
        "[[People/{}/{}|{}]]",
        jurisdiction_dir(&p.jurisdiction_id),
        person_stem(&p.name, &p.post_id),
        p.name
    )
}

fn organization_link(jurisdiction_id: &str, name: &str) -> String {
    format!(
        "[[Organizations/{}/{}|{}]]",
        jurisdiction_dir(jurisdiction_id),
        note_stem(name),
        name
    )
}

fn index_header(title: &str, generated_at: &str) -> Vec<String> {
    vec![
        format!("# {title}"),
        String::new(),
        "This index is generated. Do not edit manually.".to_string(),
        format!("Generated: `{generated_at}`"),
        String::new(),
    ]
}

fn generated_at() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]Z");
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_default()
}

/// File-name-safe stem for a display name.
pub fn note_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '^' | '[' | ']' => '-',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// `ocd-jurisdiction/country:us/state:ky/county:larue/government`
/// becomes `country-us-state-ky-county-larue-government`.
pub fn jurisdiction_dir(jurisdiction_id: &str) -> String {
    note_stem(
        jurisdiction_id
            .strip_prefix("ocd-jurisdiction/")
            .unwrap_or(jurisdiction_id),
    )
}

pub fn person_stem(name: &str, post_id: &str) -> String {
    note_stem(&format!("{name} ({post_id})"))
}

fn yaml_scalar(s: &str) -> String {
    // Quote anything YAML could misread; JSON strings are valid YAML scalars.
    serde_json::to_string(s).unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::builder::{OrganizationDraft, PersonDraft};
    use civic_core::db::{self, SqliteSink};
    use civic_core::schema::Record;
    use civic_core::sink::Sink;

    const LARUE: &str = "ocd-jurisdiction/country:us/state:ky/county:larue/government";
    const HARDIN: &str = "ocd-jurisdiction/country:us/state:ky/county:hardin/government";
    const LARUE_DIR: &str = "country-us-state-ky-county-larue-government";
    const HARDIN_DIR: &str = "country-us-state-ky-county-hardin-government";

    fn seed(sink: &mut SqliteSink, jurisdiction_id: &str, district: &str, homepage: &str) {
        let mut court = OrganizationDraft::new("Fiscal Court").unwrap();
        court
            .set_classification("legislature")
            .attach_source("https://example.gov/fiscal-court");
        court.add_post_with_cap(district, "Magistrate", 1).unwrap();
        court
            .add_post_member("John Smith", "Magistrate", district)
            .unwrap();

        let mut smith = PersonDraft::new("John Smith", district).unwrap();
        smith
            .attach_source("https://example.gov/fiscal-court/smith")
            .attach_link("homepage", homepage)
            .attach_committee_membership("Finance", "Chair");

        for entity in court.emit().into_iter().chain(smith.emit()) {
            sink.persist(&Record::new(jurisdiction_id, entity)).unwrap();
        }
    }

    fn seeded() -> SqliteSink {
        let mut sink = SqliteSink::new(db::open_in_memory().unwrap());
        seed(&mut sink, LARUE, "District 1", "https://example.gov/smith");
        sink
    }

    #[test]
    fn writes_people_organizations_and_seats() {
        let sink = seeded();
        let dir = tempfile::tempdir().unwrap();

        let summary = build_vault(sink.connection(), dir.path()).unwrap();
        assert_eq!(
            summary,
            VaultSummary {
                people: 1,
                organizations: 1,
                seats: 1,
            }
        );

        let person = fs::read_to_string(
            dir.path()
                .join("People")
                .join(LARUE_DIR)
                .join("John Smith (District 1).md"),
        )
        .unwrap();
        assert!(person.contains("post_id: \"District 1\""));
        assert!(person.contains("[homepage](https://example.gov/smith)"));
        assert!(person.contains("- https://example.gov/fiscal-court/smith"));
        assert!(person.contains(&format!("[[Organizations/{LARUE_DIR}/Finance|Finance]]: Chair")));

        let org = fs::read_to_string(
            dir.path()
                .join("Organizations")
                .join(LARUE_DIR)
                .join("Fiscal Court.md"),
        )
        .unwrap();
        assert!(org.contains("- District 1 (Magistrate, max 1)"));
        assert!(org.contains(&format!(
            "[[People/{LARUE_DIR}/John Smith (District 1)|John Smith]]: Magistrate at `District 1`"
        )));

        let seats = fs::read_to_string(dir.path().join("00_Index/MOC - Seats.md")).unwrap();
        assert!(seats.contains("This index is generated. Do not edit manually."));
        assert!(seats.contains(&format!("## {LARUE}")));
        assert!(seats.contains(&format!(
            "- District 1: [[People/{LARUE_DIR}/John Smith (District 1)|John Smith]]"
        )));
    }

    #[test]
    fn namesakes_in_two_jurisdictions_keep_separate_notes() {
        let mut sink = seeded();
        seed(&mut sink, HARDIN, "District 4", "https://hardin.example.gov/smith");
        let dir = tempfile::tempdir().unwrap();

        let summary = build_vault(sink.connection(), dir.path()).unwrap();
        assert_eq!(summary.people, 2);
        assert_eq!(summary.organizations, 2);

        let larue = fs::read_to_string(
            dir.path()
                .join("People")
                .join(LARUE_DIR)
                .join("John Smith (District 1).md"),
        )
        .unwrap();
        let hardin = fs::read_to_string(
            dir.path()
                .join("People")
                .join(HARDIN_DIR)
                .join("John Smith (District 4).md"),
        )
        .unwrap();
        assert!(larue.contains("https://example.gov/smith"));
        assert!(hardin.contains("https://hardin.example.gov/smith"));
        assert!(dir
            .path()
            .join("Organizations")
            .join(HARDIN_DIR)
            .join("Fiscal Court.md")
            .exists());

        let seats = fs::read_to_string(dir.path().join("00_Index/MOC - Seats.md")).unwrap();
        assert!(seats.contains(&format!("[[People/{LARUE_DIR}/John Smith (District 1)|")));
        assert!(seats.contains(&format!("[[People/{HARDIN_DIR}/John Smith (District 4)|")));
    }

    #[test]
    fn namesakes_in_one_jurisdiction_split_by_seat() {
        let mut sink = seeded();
        let mut other = PersonDraft::new("John Smith", "District 2").unwrap();
        other.attach_source("https://example.gov/fiscal-court/smith-2");
        for entity in other.emit() {
            sink.persist(&Record::new(LARUE, entity)).unwrap();
        }
        let dir = tempfile::tempdir().unwrap();

        build_vault(sink.connection(), dir.path()).unwrap();
        let people = dir.path().join("People").join(LARUE_DIR);
        assert!(people.join("John Smith (District 1).md").exists());
        assert!(people.join("John Smith (District 2).md").exists());

        // The seated membership names District 1, which picks the right namesake.
        let org = fs::read_to_string(
            dir.path()
                .join("Organizations")
                .join(LARUE_DIR)
                .join("Fiscal Court.md"),
        )
        .unwrap();
        assert!(org.contains(&format!("[[People/{LARUE_DIR}/John Smith (District 1)|John Smith]]")));
    }

    #[test]
    fn unreadable_person_row_is_an_error() {
        let sink = seeded();
        sink.connection()
            .execute("UPDATE people SET raw_json = '{not json'", [])
            .unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = build_vault(sink.connection(), dir.path()).unwrap_err();
        assert!(err.to_string().contains("unreadable raw_json"));
    }

    #[test]
    fn empty_store_writes_placeholder_indexes() {
        let conn = db::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let summary = build_vault(&conn, dir.path()).unwrap();
        assert_eq!(summary, VaultSummary::default());

        let orgs =
            fs::read_to_string(dir.path().join("00_Index/MOC - Organizations.md")).unwrap();
        assert!(orgs.contains("_No organizations found._"));
    }

    #[test]
    fn stems_strip_path_characters() {
        assert_eq!(note_stem("Ward 1/North"), "Ward 1-North");
        assert_eq!(note_stem("Planning: Zoning"), "Planning- Zoning");
        assert_eq!(jurisdiction_dir(LARUE), LARUE_DIR);
        assert_eq!(person_stem("John Smith", "Ward 1"), "John Smith (Ward 1)");
    }
}

use civic_core::db::{self, SqliteSink};
use civic_core::fetch::{FileFetcher, MapFetcher};
use civic_core::jurisdiction::Jurisdiction;
use civic_core::schema::{Entity, EntityKind, Person, SourceRef};
use civic_core::{
    DispatchOptions, MembershipDraft, OrganizationDraft, PersonDraft, Produced, Producer,
    ScrapeContext, Scraper,
};

const LARUE: &str = "ocd-jurisdiction/country:us/state:ky/county:larue/government";

/// Scraper split into one sub-routine per entity kind, combined from the
/// top-level routine.
struct Council;

impl Council {
    fn organizations(&self) -> Producer<'_> {
        Box::new(std::iter::once_with(|| {
            let mut court = OrganizationDraft::new("Fiscal Court")?;
            court
                .set_classification("legislature")
                .attach_source("https://example.gov/fiscal-court");
            court.add_post_with_cap("Ward 1", "Magistrate", 1)?;
            court.add_post_with_cap("Ward 2", "Magistrate", 1)?;

            let mut finance = OrganizationDraft::new("Finance")?;
            finance
                .set_classification("committee")
                .set_parent("Fiscal Court")
                .attach_source("https://example.gov/finance")
                .add_member("John Smith", "Chair");

            Ok::<_, civic_core::ValidationError>(Produced::nested([court, finance]))
        })
        .map(Produced::from))
    }

    fn people(&self) -> Producer<'_> {
        let roster = [("John Smith", "Ward 1"), ("Jane Doe", "Ward 2")];
        Box::new(roster.into_iter().map(|(name, post_id)| {
            Produced::lazy(move || {
                PersonDraft::new(name, post_id).map(|mut draft| {
                    draft
                        .attach_source("https://example.gov/fiscal-court/members")
                        .attach_committee_membership("Finance", "Chair");
                    draft
                })
            })
        }))
    }

    fn seats(&self) -> Producer<'_> {
        Box::new(
            [("John Smith", "Ward 1"), ("Jane Doe", "Ward 2")]
                .into_iter()
                .map(|(name, post_id)| {
                    Produced::from(
                        MembershipDraft::new(name, "Fiscal Court", "Magistrate")
                            .and_then(|m| m.with_post_id(post_id)),
                    )
                }),
        )
    }
}

impl Scraper for Council {
    fn scrape<'a>(&'a self, _ctx: ScrapeContext<'a>) -> Producer<'a> {
        // Seats before organizations: their post check is deferred.
        Box::new(
            [
                Produced::Nested(self.seats()),
                Produced::Nested(self.organizations()),
                Produced::Nested(self.people()),
            ]
            .into_iter(),
        )
    }
}

/// Yields a single, possibly broken, person record as-is.
struct Raw(Person);

impl Scraper for Raw {
    fn scrape<'a>(&'a self, _ctx: ScrapeContext<'a>) -> Producer<'a> {
        Box::new(std::iter::once(Produced::from(self.0.clone())))
    }
}

fn raw_person(name: &str) -> Person {
    Person {
        name: name.to_string(),
        post_id: "Ward 1".to_string(),
        image: None,
        other_names: Vec::new(),
        links: Vec::new(),
        contact_details: Vec::new(),
        identifiers: Vec::new(),
        sources: vec![SourceRef::url("https://example.gov/council")],
        memberships: Vec::new(),
    }
}

struct Single;

impl Scraper for Single {
    fn scrape<'a>(&'a self, _ctx: ScrapeContext<'a>) -> Producer<'a> {
        Box::new(std::iter::once(Produced::from(
            PersonDraft::new("John Smith", "Ward 1").map(|mut draft| {
                draft
                    .attach_source("https://example.gov/council")
                    .attach_committee_membership("Transportation", "Chair");
                draft
            }),
        )))
    }
}

#[test]
fn single_person_with_committee() {
    let mut larue = Jurisdiction::new(LARUE, "LaRue County").unwrap();
    larue.register("people", Single).unwrap();

    let mut sink = SqliteSink::new(db::open_in_memory().unwrap());
    let report = larue
        .run("people", &MapFetcher::new(), &mut sink, &DispatchOptions::default())
        .unwrap();

    assert_eq!(report.count(EntityKind::Person), 1);
    assert_eq!(report.count(EntityKind::Membership), 1);
    assert!(report.failures.is_empty());
}

#[test]
fn empty_name_lands_in_failure_list() {
    let mut larue = Jurisdiction::new(LARUE, "LaRue County").unwrap();
    larue.register("people", Raw(raw_person(""))).unwrap();

    let mut sink = SqliteSink::new(db::open_in_memory().unwrap());
    let report = larue
        .run("people", &MapFetcher::new(), &mut sink, &DispatchOptions::default())
        .unwrap();

    assert_eq!(report.count(EntityKind::Person), 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error.tag(), "ValidationError");
    assert!(matches!(
        &report.failures[0].record,
        Some(Entity::Person(p)) if p.name.is_empty()
    ));
}

#[test]
fn composed_subroutines_persist_and_reconcile() {
    let mut larue = Jurisdiction::new(LARUE, "LaRue County").unwrap();
    larue.register("council", Council).unwrap();

    let mut sink = SqliteSink::new(db::open_in_memory().unwrap());
    let report = larue
        .run("council", &MapFetcher::new(), &mut sink, &DispatchOptions::default())
        .unwrap();

    assert_eq!(report.count(EntityKind::Organization), 2);
    assert_eq!(report.count(EntityKind::Person), 2);
    // Two seats, Finance chair from the org side, Jane's Finance chair from her side.
    assert_eq!(report.count(EntityKind::Membership), 4);
    assert_eq!(report.collapsed, 1);
    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);

    let conn = sink.connection();
    let at_ward_1 = db::people_at_seat(conn, LARUE, "Ward 1").unwrap();
    assert_eq!(at_ward_1.len(), 1);
    assert_eq!(at_ward_1[0].name, "John Smith");
    let seats = db::memberships_at_seat(conn, LARUE, "Ward 2").unwrap();
    assert_eq!(seats.len(), 1);
    assert_eq!(seats[0].person, "Jane Doe");
}

#[test]
fn second_pass_is_idempotent() {
    let mut larue = Jurisdiction::new(LARUE, "LaRue County").unwrap();
    larue.register("council", Council).unwrap();
    let mut sink = SqliteSink::new(db::open_in_memory().unwrap());
    let options = DispatchOptions::default();

    let first = larue.run("council", &MapFetcher::new(), &mut sink, &options).unwrap();
    let rows_before: i64 = sink
        .connection()
        .query_row("SELECT COUNT(*) FROM memberships", [], |row| row.get(0))
        .unwrap();
    let second = larue.run("council", &MapFetcher::new(), &mut sink, &options).unwrap();
    let rows_after: i64 = sink
        .connection()
        .query_row("SELECT COUNT(*) FROM memberships", [], |row| row.get(0))
        .unwrap();

    // Sources carry a fresh retrieval time each pass; that alone is not a change.
    assert_eq!(first.unchanged, 0);
    let persisted: usize = second.persisted.values().sum();
    assert_eq!(persisted, 8);
    assert_eq!(second.unchanged, persisted);
    assert_eq!(rows_before, 4);
    assert_eq!(rows_after, rows_before);
}

#[test]
fn fixture_roster_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("people.yaml"),
        r#"
people:
  - name: John Smith
    post_id: Ward 1
    sources: ["https://example.gov/council"]
    committees:
      - { organization: Transportation, role: Chair }
"#,
    )
    .unwrap();

    let mut larue = Jurisdiction::new(LARUE, "LaRue County").unwrap();
    larue
        .register("people", civic_core::fixture::FixtureScraper::new("people.yaml"))
        .unwrap();

    let mut sink = SqliteSink::new(db::open_in_memory().unwrap());
    let fetcher = FileFetcher::new(dir.path());
    let reports = larue
        .run_all(&fetcher, &mut sink, &DispatchOptions::default())
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].count(EntityKind::Person), 1);
    assert_eq!(reports[0].count(EntityKind::Membership), 1);
    assert!(reports[0].is_clean());
}

//! Scraper registration per jurisdiction.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::thread;

use crate::collect::{Dispatch, ScrapeContext, Scraper};
use crate::dispatch::{DispatchOptions, PassReport};
use crate::error::ScrapeError;
use crate::fetch::Fetch;
use crate::schema::EntityKind;
use crate::sink::Sink;
use crate::validate::require_text;

const JURISDICTION_PREFIX: &str = "ocd-jurisdiction/";
const RESERVED_KIND: &str = "do_scrape";

pub struct Jurisdiction {
    id: String,
    name: String,
    scrapers: BTreeMap<String, Box<dyn Scraper>>,
}

impl Jurisdiction {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self, ScrapeError> {
        let id = id.into();
        let name = name.into();
        if !id.starts_with(JURISDICTION_PREFIX) || id.len() == JURISDICTION_PREFIX.len() {
            return Err(ScrapeError::configuration(format!(
                "jurisdiction id must start with '{JURISDICTION_PREFIX}': {id:?}"
            )));
        }
        // Reuses the entity text rules; the entity kind in the message is irrelevant here.
        require_text(EntityKind::Organization, "name", &name).map_err(|e| {
            ScrapeError::configuration(format!("jurisdiction name {}", e.reason))
        })?;
        Ok(Self {
            id,
            name,
            scrapers: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scraper_kinds(&self) -> impl Iterator<Item = &str> {
        self.scrapers.keys().map(String::as_str)
    }

    pub fn register(
        &mut self,
        kind: &str,
        scraper: impl Scraper + 'static,
    ) -> Result<&mut Self, ScrapeError> {
        self.register_boxed(kind, Box::new(scraper))
    }

    pub fn register_boxed(
        &mut self,
        kind: &str,
        scraper: Box<dyn Scraper>,
    ) -> Result<&mut Self, ScrapeError> {
        if kind == RESERVED_KIND {
            return Err(ScrapeError::configuration(format!(
                "'{RESERVED_KIND}' is reserved for dispatch and cannot be a scraper kind"
            )));
        }
        if !is_slug(kind) {
            return Err(ScrapeError::configuration(format!(
                "scraper kind must be a lowercase slug: {kind:?}"
            )));
        }
        if self.scrapers.contains_key(kind) {
            return Err(ScrapeError::configuration(format!(
                "scraper kind '{kind}' already registered for {}",
                self.id
            )));
        }
        tracing::debug!(jurisdiction_id = %self.id, kind, "registered scraper");
        self.scrapers.insert(kind.to_string(), scraper);
        Ok(self)
    }

    /// Runs one pass of the scraper registered under `kind`.
    pub fn run<S: Sink>(
        &self,
        kind: &str,
        fetcher: &dyn Fetch,
        sink: &mut S,
        options: &DispatchOptions,
    ) -> Result<PassReport, ScrapeError> {
        let scraper = self.scrapers.get(kind).ok_or_else(|| {
            ScrapeError::configuration(format!(
                "no scraper '{kind}' registered for {}",
                self.id
            ))
        })?;
        tracing::info!(jurisdiction_id = %self.id, kind, "running scraper");
        let ctx = ScrapeContext::new(&self.id, fetcher);
        let mut report = scraper.do_scrape(ctx, sink, options);
        report.scraper = Some(kind.to_string());
        Ok(report)
    }

    /// Runs every registered scraper, in kind order.
    pub fn run_all<S: Sink>(
        &self,
        fetcher: &dyn Fetch,
        sink: &mut S,
        options: &DispatchOptions,
    ) -> Result<Vec<PassReport>, ScrapeError> {
        self.scrapers
            .keys()
            .map(|kind| self.run(kind, fetcher, sink, options))
            .collect()
    }
}

/// One thread per jurisdiction. Passes share nothing but the sink, whose
/// lock serializes writes.
pub fn run_concurrently<S: Sink + Send>(
    jurisdictions: &[Jurisdiction],
    fetcher: &dyn Fetch,
    sink: &Mutex<S>,
    options: &DispatchOptions,
) -> Vec<Result<Vec<PassReport>, ScrapeError>> {
    thread::scope(|scope| {
        let handles: Vec<_> = jurisdictions
            .iter()
            .map(|jurisdiction| {
                scope.spawn(move || {
                    let mut shared = sink;
                    jurisdiction.run_all(fetcher, &mut shared, options)
                })
            })
            .collect();

        handles
            .into_iter()
            .zip(jurisdictions)
            .map(|(handle, jurisdiction)| {
                handle.join().unwrap_or_else(|_| {
                    Err(ScrapeError::configuration(format!(
                        "pass for {} panicked",
                        jurisdiction.id()
                    )))
                })
            })
            .collect()
    })
}

fn is_slug(kind: &str) -> bool {
    let mut chars = kind.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PersonDraft;
    use crate::collect::{Produced, Producer};
    use crate::fetch::MapFetcher;
    use crate::sink::MemorySink;

    const LARUE: &str = "ocd-jurisdiction/country:us/state:ky/county:larue/government";
    const HARDIN: &str = "ocd-jurisdiction/country:us/state:ky/county:hardin/government";

    struct Roster {
        people: Vec<(&'static str, &'static str)>,
    }

    impl Roster {
        fn new(people: Vec<(&'static str, &'static str)>) -> Self {
            Self { people }
        }
    }

    impl Scraper for Roster {
        fn scrape<'a>(&'a self, ctx: ScrapeContext<'a>) -> Producer<'a> {
            Box::new(self.people.iter().map(move |(name, post)| {
                Produced::from(PersonDraft::new(*name, *post).map(|mut draft| {
                    draft.attach_source(&format!("https://example.gov/{}", ctx.jurisdiction_id.len()));
                    draft
                }))
            }))
        }
    }

    #[test]
    fn rejects_bad_ids_and_kinds() {
        assert!(Jurisdiction::new("larue", "LaRue County").is_err());
        assert!(Jurisdiction::new(JURISDICTION_PREFIX, "LaRue County").is_err());
        assert!(Jurisdiction::new(LARUE, " ").is_err());

        let mut larue = Jurisdiction::new(LARUE, "LaRue County").unwrap();
        let err = larue
            .register("People", Roster::new(Vec::new()))
            .err()
            .unwrap();
        assert_eq!(err.tag(), "ConfigurationError");
        let err = larue
            .register(RESERVED_KIND, Roster::new(Vec::new()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn duplicate_registration_fails_before_any_pass() {
        let mut larue = Jurisdiction::new(LARUE, "LaRue County").unwrap();
        larue.register("people", Roster::new(Vec::new())).unwrap();
        let err = larue
            .register("people", Roster::new(vec![("John Smith", "Ward 1")]))
            .err()
            .unwrap();
        assert_eq!(err.tag(), "ConfigurationError");
        assert_eq!(larue.scraper_kinds().collect::<Vec<_>>(), ["people"]);
    }

    #[test]
    fn unknown_kind_is_configuration_error() {
        let larue = Jurisdiction::new(LARUE, "LaRue County").unwrap();
        let mut sink = MemorySink::new();
        let err = larue
            .run("people", &MapFetcher::new(), &mut sink, &DispatchOptions::default())
            .unwrap_err();
        assert_eq!(err.tag(), "ConfigurationError");
    }

    #[test]
    fn run_reports_per_kind() {
        let mut larue = Jurisdiction::new(LARUE, "LaRue County").unwrap();
        larue
            .register("people", Roster::new(vec![("John Smith", "Ward 1"), ("", "Ward 2")]))
            .unwrap();

        let mut sink = MemorySink::new();
        let report = larue
            .run("people", &MapFetcher::new(), &mut sink, &DispatchOptions::default())
            .unwrap();
        assert_eq!(report.scraper.as_deref(), Some("people"));
        assert_eq!(report.count(EntityKind::Person), 1);
        assert_eq!(report.failures_tagged("ValidationError").count(), 1);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn concurrent_passes_share_only_the_sink() {
        let mut larue = Jurisdiction::new(LARUE, "LaRue County").unwrap();
        larue
            .register("people", Roster::new(vec![("John Smith", "Ward 1")]))
            .unwrap();
        let mut hardin = Jurisdiction::new(HARDIN, "Hardin County").unwrap();
        hardin
            .register("people", Roster::new(vec![("John Smith", "Ward 1"), ("Jane Doe", "Ward 2")]))
            .unwrap();

        let sink = Mutex::new(MemorySink::new());
        let results = run_concurrently(
            &[larue, hardin],
            &MapFetcher::new(),
            &sink,
            &DispatchOptions::default(),
        );

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap()[0].jurisdiction_id, LARUE);
        assert_eq!(results[1].as_ref().unwrap()[0].count(EntityKind::Person), 2);
        // Same name and seat in two jurisdictions are distinct natural keys.
        assert_eq!(sink.lock().unwrap().len(), 3);
    }
}

//! Yield-collection engine.
//!
//! A scraper's production routine returns a [`Producer`]: a lazy iterator
//! whose items are either entities, nested producers, or failures raised
//! while producing. [`Flatten`] walks that tree depth-first with an explicit
//! stack, handing out one entity at a time so the dispatcher can persist while
//! the scraper is still producing.
//!
//! The reserved entry point [`Dispatch::do_scrape`] is sealed: every
//! [`Scraper`] gets it through a blanket impl and nothing else can provide
//! one. Trying to override it does not compile:
//!
//! ```compile_fail
//! use civic_core::collect::{Dispatch, Producer, ScrapeContext, Scraper};
//! use civic_core::dispatch::{DispatchOptions, PassReport};
//! use civic_core::sink::Sink;
//!
//! struct Council;
//!
//! impl Scraper for Council {
//!     fn scrape<'a>(&'a self, _ctx: ScrapeContext<'a>) -> Producer<'a> {
//!         Box::new(std::iter::empty())
//!     }
//! }
//!
//! impl Dispatch for Council {
//!     fn do_scrape(
//!         &self,
//!         _ctx: ScrapeContext<'_>,
//!         _sink: &mut dyn Sink,
//!         _options: &DispatchOptions,
//!     ) -> PassReport {
//!         unimplemented!()
//!     }
//! }
//! ```

use std::fmt;

use crate::builder::{MembershipDraft, OrganizationDraft, PersonDraft};
use crate::dispatch::{DispatchOptions, Dispatcher, PassReport};
use crate::error::{FetchError, ScrapeError, ValidationError};
use crate::fetch::Fetch;
use crate::schema::{Entity, Membership, Organization, Person};
use crate::sink::Sink;

pub type Producer<'a> = Box<dyn Iterator<Item = Produced<'a>> + 'a>;

/// One value yielded by a production routine.
pub enum Produced<'a> {
    Entity(Entity),
    Nested(Producer<'a>),
    Failed(ScrapeError),
}

impl<'a> Produced<'a> {
    pub fn nested<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Produced<'a>> + 'a,
        I::IntoIter: 'a,
    {
        Produced::Nested(Box::new(items.into_iter().map(Into::into)))
    }

    /// Defers `f` until the engine reaches this item.
    pub fn lazy<F, P>(f: F) -> Self
    where
        F: FnOnce() -> P + 'a,
        P: Into<Produced<'a>>,
    {
        Produced::Nested(Box::new(std::iter::once_with(move || f().into())))
    }

    /// Pull-driven generator: `f` is called for each item until it returns `None`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut() -> Option<Produced<'a>> + 'a,
    {
        Produced::Nested(Box::new(std::iter::from_fn(f)))
    }
}

impl fmt::Debug for Produced<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Produced::Entity(entity) => f.debug_tuple("Entity").field(entity).finish(),
            Produced::Nested(_) => f.write_str("Nested(..)"),
            Produced::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

impl From<Entity> for Produced<'_> {
    fn from(value: Entity) -> Self {
        Produced::Entity(value)
    }
}

impl From<Person> for Produced<'_> {
    fn from(value: Person) -> Self {
        Produced::Entity(value.into())
    }
}

impl From<Organization> for Produced<'_> {
    fn from(value: Organization) -> Self {
        Produced::Entity(value.into())
    }
}

impl From<Membership> for Produced<'_> {
    fn from(value: Membership) -> Self {
        Produced::Entity(value.into())
    }
}

impl From<PersonDraft> for Produced<'_> {
    fn from(value: PersonDraft) -> Self {
        Produced::nested(value.emit())
    }
}

impl From<OrganizationDraft> for Produced<'_> {
    fn from(value: OrganizationDraft) -> Self {
        Produced::nested(value.emit())
    }
}

impl From<MembershipDraft> for Produced<'_> {
    fn from(value: MembershipDraft) -> Self {
        Produced::Entity(value.emit())
    }
}

impl From<ScrapeError> for Produced<'_> {
    fn from(value: ScrapeError) -> Self {
        Produced::Failed(value)
    }
}

impl From<ValidationError> for Produced<'_> {
    fn from(value: ValidationError) -> Self {
        Produced::Failed(value.into())
    }
}

impl From<FetchError> for Produced<'_> {
    fn from(value: FetchError) -> Self {
        Produced::Failed(value.into())
    }
}

impl<'a, T, E> From<Result<T, E>> for Produced<'a>
where
    T: Into<Produced<'a>>,
    E: Into<ScrapeError>,
{
    fn from(value: Result<T, E>) -> Self {
        match value {
            Ok(item) => item.into(),
            Err(err) => Produced::Failed(err.into()),
        }
    }
}

/// Depth-first flattening of a producer tree.
pub struct Flatten<'a> {
    stack: Vec<Producer<'a>>,
    max_depth: usize,
}

impl<'a> Flatten<'a> {
    pub fn new(root: Producer<'a>) -> Self {
        Self {
            stack: vec![root],
            max_depth: 1,
        }
    }

    /// Deepest nesting reached so far; the root producer is depth 1.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

impl Iterator for Flatten<'_> {
    type Item = Result<Entity, ScrapeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                None => {
                    self.stack.pop();
                }
                Some(Produced::Nested(producer)) => {
                    self.stack.push(producer);
                    self.max_depth = self.max_depth.max(self.stack.len());
                    tracing::debug!(depth = self.stack.len(), "entered nested producer");
                }
                Some(Produced::Entity(entity)) => return Some(Ok(entity)),
                Some(Produced::Failed(err)) => return Some(Err(err)),
            }
        }
    }
}

/// What a production routine gets to work with during one pass.
#[derive(Clone, Copy)]
pub struct ScrapeContext<'a> {
    pub jurisdiction_id: &'a str,
    pub fetcher: &'a dyn Fetch,
}

impl<'a> ScrapeContext<'a> {
    pub fn new(jurisdiction_id: &'a str, fetcher: &'a dyn Fetch) -> Self {
        Self {
            jurisdiction_id,
            fetcher,
        }
    }
}

/// The extension point for scraper authors.
pub trait Scraper: Send + Sync {
    /// Production routine, invoked once per pass.
    fn scrape<'a>(&'a self, ctx: ScrapeContext<'a>) -> Producer<'a>;
}

mod sealed {
    pub trait Sealed {}
    impl<T: super::Scraper + ?Sized> Sealed for T {}
}

/// Reserved dispatch entry point. Provided for every [`Scraper`] and not
/// implementable elsewhere.
pub trait Dispatch: sealed::Sealed {
    fn do_scrape(
        &self,
        ctx: ScrapeContext<'_>,
        sink: &mut dyn Sink,
        options: &DispatchOptions,
    ) -> PassReport;
}

impl<T: Scraper + ?Sized> Dispatch for T {
    fn do_scrape(
        &self,
        ctx: ScrapeContext<'_>,
        sink: &mut dyn Sink,
        options: &DispatchOptions,
    ) -> PassReport {
        let mut items = Flatten::new(self.scrape(ctx));
        let mut dispatcher = Dispatcher::new(ctx.jurisdiction_id, sink, options.clone());
        for item in items.by_ref() {
            if dispatcher.dispatch(item).is_break() {
                break;
            }
        }
        dispatcher.finish(items.max_depth())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Membership;
    use std::cell::Cell;

    fn marker(name: &str) -> Entity {
        Entity::Membership(Membership {
            person: name.to_string(),
            organization: "Council".to_string(),
            post_id: None,
            role: "Member".to_string(),
            start_date: None,
            end_date: None,
        })
    }

    fn names(items: Flatten<'_>) -> Vec<String> {
        items
            .map(|item| match item {
                Ok(Entity::Membership(m)) => m.person,
                Ok(other) => panic!("unexpected {other:?}"),
                Err(err) => format!("error:{}", err.tag()),
            })
            .collect()
    }

    #[test]
    fn flattens_depth_first_in_emission_order() {
        let root: Producer<'_> = Box::new(
            vec![
                Produced::from(marker("A")),
                Produced::nested(vec![marker("B"), marker("C")]),
                Produced::from(marker("D")),
            ]
            .into_iter(),
        );
        assert_eq!(names(Flatten::new(root)), ["A", "B", "C", "D"]);
    }

    #[test]
    fn deep_nesting_keeps_order() {
        let inner = Produced::nested(vec![
            Produced::from(marker("C")),
            Produced::nested(vec![marker("D")]),
        ]);
        let root: Producer<'_> = Box::new(
            vec![
                Produced::nested(vec![Produced::from(marker("A")), Produced::nested(vec![marker("B")])]),
                inner,
                Produced::nested(Vec::<Entity>::new()),
                Produced::from(marker("E")),
            ]
            .into_iter(),
        );
        let mut flatten = Flatten::new(root);
        let out: Vec<_> = flatten.by_ref().map(|r| r.unwrap().label()).collect();
        assert_eq!(out.len(), 5);
        assert!(out[0].contains("'A'"));
        assert!(out[4].contains("'E'"));
        assert_eq!(flatten.max_depth(), 3);
    }

    #[test]
    fn lazy_producers_run_only_when_reached() {
        let calls = Cell::new(0);
        let root: Producer<'_> = Box::new(
            vec![
                Produced::from(marker("A")),
                Produced::lazy(|| {
                    calls.set(calls.get() + 1);
                    marker("B")
                }),
            ]
            .into_iter(),
        );
        let mut flatten = Flatten::new(root);
        assert!(flatten.next().is_some());
        assert_eq!(calls.get(), 0);
        assert!(flatten.next().is_some());
        assert_eq!(calls.get(), 1);
        assert!(flatten.next().is_none());
    }

    #[test]
    fn generator_style_producer() {
        let mut remaining = vec!["C", "B", "A"];
        let root: Producer<'_> = Box::new(std::iter::once(Produced::from_fn(move || {
            remaining.pop().map(|name| Produced::from(marker(name)))
        })));
        assert_eq!(names(Flatten::new(root)), ["A", "B", "C"]);
    }

    #[test]
    fn failures_pass_through_in_place() {
        let root: Producer<'_> = Box::new(
            vec![
                Produced::from(marker("A")),
                Produced::from(FetchError::new("https://example.gov", "timed out")),
                Produced::from(PersonDraft::new("", "Ward 1")),
                Produced::from(marker("B")),
            ]
            .into_iter(),
        );
        assert_eq!(
            names(Flatten::new(root)),
            ["A", "error:FetchError", "error:ValidationError", "B"]
        );
    }

    #[test]
    fn person_draft_expands_in_place() {
        let mut draft = PersonDraft::new("John Smith", "Ward 1").unwrap();
        draft.attach_committee_membership("Transportation", "Chair");
        let root: Producer<'_> = Box::new(
            vec![Produced::from(draft), Produced::from(marker("Z"))].into_iter(),
        );
        let kinds: Vec<_> = Flatten::new(root).map(|r| r.unwrap().kind()).collect();
        assert_eq!(
            kinds,
            [
                crate::schema::EntityKind::Person,
                crate::schema::EntityKind::Membership,
                crate::schema::EntityKind::Membership,
            ]
        );
    }
}

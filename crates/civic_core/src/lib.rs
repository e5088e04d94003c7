//! Collection engine for civic scrapes.
//!
//! A scraper emits people, organizations and memberships from one pass over
//! a jurisdiction's source. The engine flattens whatever nesting the scraper
//! uses ([`collect`]), validates each entity and hands it to a persistence
//! sink ([`dispatch`], [`sink`], [`db`]), and reports per-record failures
//! instead of aborting.
//!
//! Seats are identified by their display text (`post_id`) together with the
//! jurisdiction id. Memberships and people carry copies of that text; there is
//! no foreign key back to the organization's post.

pub mod builder;
pub mod collect;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod fixture;
pub mod jurisdiction;
pub mod schema;
pub mod sink;
pub mod validate;

pub use builder::{MembershipDraft, OrganizationDraft, PersonDraft};
pub use collect::{Dispatch, Produced, Producer, ScrapeContext, Scraper};
pub use dispatch::{DispatchOptions, Failure, PassReport};
pub use error::{FetchError, PersistError, ScrapeError, ValidationError};
pub use schema::{Entity, EntityKind, Membership, Organization, Person, Post, Record};

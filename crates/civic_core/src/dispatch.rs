//! Validation and persistence of a flattened entity stream.
//!
//! Memberships reference their organization and seat by plain text. A seated
//! membership is checked against the organization's posts as soon as that
//! organization has been seen in the pass; otherwise the check waits for
//! [`Dispatcher::finish`]. Records already handed to the sink are never
//! rolled back.

use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::error::{ScrapeError, ValidationError};
use crate::schema::{Entity, EntityKind, Membership, Organization, Record};
use crate::sink::{Ack, Sink};
use crate::validate::validate_entity;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
    /// Stop pulling from the scraper after the first validation failure.
    pub abandon_on_validation_error: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub record: Option<Entity>,
    pub error: ScrapeError,
}

/// Outcome of one scrape pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub jurisdiction_id: String,
    pub scraper: Option<String>,
    pub persisted: BTreeMap<EntityKind, usize>,
    pub unchanged: usize,
    pub collapsed: usize,
    pub failures: Vec<Failure>,
    pub abandoned: bool,
    pub max_depth: usize,
}

impl PassReport {
    pub fn count(&self, kind: EntityKind) -> usize {
        self.persisted.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.abandoned
    }

    pub fn failures_tagged<'r>(&'r self, tag: &'r str) -> impl Iterator<Item = &'r Failure> + 'r {
        self.failures.iter().filter(move |f| f.error.tag() == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MembershipKey {
    person: String,
    organization: String,
    post_id: Option<String>,
}

impl MembershipKey {
    fn of(membership: &Membership) -> Self {
        Self {
            person: membership.person.clone(),
            organization: membership.organization.clone(),
            post_id: membership.post_id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct ObservedPost {
    max_memberships: Option<u32>,
}

pub struct Dispatcher<'s, S: Sink + ?Sized> {
    jurisdiction_id: String,
    sink: &'s mut S,
    options: DispatchOptions,
    /// Post sets of organizations validated so far, keyed by name.
    observed: HashMap<String, BTreeMap<String, ObservedPost>>,
    /// First role seen for each membership triple.
    memberships: HashMap<MembershipKey, String>,
    /// Seated memberships whose organization had not been seen yet.
    deferred: Vec<Membership>,
    /// Persisted seated memberships per (organization, post_id).
    occupancy: BTreeMap<(String, String), u32>,
    report: PassReport,
}

impl<'s, S: Sink + ?Sized> Dispatcher<'s, S> {
    pub fn new(jurisdiction_id: &str, sink: &'s mut S, options: DispatchOptions) -> Self {
        tracing::info!(jurisdiction_id, "starting pass");
        Self {
            jurisdiction_id: jurisdiction_id.to_string(),
            sink,
            options,
            observed: HashMap::new(),
            memberships: HashMap::new(),
            deferred: Vec::new(),
            occupancy: BTreeMap::new(),
            report: PassReport {
                jurisdiction_id: jurisdiction_id.to_string(),
                ..PassReport::default()
            },
        }
    }

    /// Handles one flattened item. `Break` means the pass is abandoned.
    pub fn dispatch(&mut self, item: Result<Entity, ScrapeError>) -> ControlFlow<()> {
        let entity = match item {
            Ok(entity) => entity,
            Err(error) => return self.fail(None, error),
        };

        if let Err(error) = validate_entity(&entity) {
            return self.fail(Some(entity), error.into());
        }

        let membership = match &entity {
            Entity::Organization(org) => {
                self.observe(org);
                None
            }
            Entity::Membership(membership) => {
                let key = MembershipKey::of(membership);
                if let Some(role) = self.memberships.get(&key) {
                    if *role != membership.role {
                        tracing::warn!(
                            person = %membership.person,
                            organization = %membership.organization,
                            kept = %role,
                            dropped = %membership.role,
                            "membership described twice with different roles"
                        );
                    }
                    self.report.collapsed += 1;
                    return ControlFlow::Continue(());
                }
                match self.check_seat(membership) {
                    Ok(deferred) => Some((
                        key,
                        membership.role.clone(),
                        deferred.then(|| membership.clone()),
                    )),
                    Err(error) => return self.fail(Some(entity), error.into()),
                }
            }
            Entity::Person(_) => None,
        };

        // Keys and deferred checks register only once the sink accepts.
        if self.persist(entity) {
            if let Some((key, role, deferred)) = membership {
                self.memberships.insert(key, role);
                self.deferred.extend(deferred);
            }
        }
        ControlFlow::Continue(())
    }

    fn observe(&mut self, org: &Organization) {
        let posts = org
            .posts
            .iter()
            .map(|post| {
                (
                    post.post_id.clone(),
                    ObservedPost {
                        max_memberships: post.max_memberships,
                    },
                )
            })
            .collect();
        self.observed.insert(org.name.clone(), posts);
    }

    /// `Ok(true)` when the organization has not been seen yet and the
    /// check must wait for `finish`.
    fn check_seat(&self, membership: &Membership) -> Result<bool, ValidationError> {
        let Some(post_id) = &membership.post_id else {
            return Ok(false);
        };
        match self.observed.get(&membership.organization) {
            Some(posts) if posts.contains_key(post_id) => Ok(false),
            Some(_) => Err(ValidationError::new(
                EntityKind::Membership,
                "post_id",
                format!(
                    "'{}' has no post '{}'",
                    membership.organization, post_id
                ),
            )),
            None => Ok(true),
        }
    }

    /// Returns whether the sink accepted the record.
    fn persist(&mut self, entity: Entity) -> bool {
        let record = Record::new(self.jurisdiction_id.clone(), entity);
        match self.sink.persist(&record) {
            Ok(ack) => {
                tracing::debug!(record = %record.entity.label(), ?ack, "persisted");
                let kind = record.entity.kind();
                *self.report.persisted.entry(kind).or_insert(0) += 1;
                if ack == Ack::Unchanged {
                    self.report.unchanged += 1;
                }
                if let Entity::Membership(Membership {
                    organization,
                    post_id: Some(post_id),
                    ..
                }) = &record.entity
                {
                    *self
                        .occupancy
                        .entry((organization.clone(), post_id.clone()))
                        .or_insert(0) += 1;
                }
                true
            }
            Err(error) => {
                // Persist failures never stop the stream.
                let _ = self.fail(Some(record.entity), error.into());
                false
            }
        }
    }

    fn fail(&mut self, record: Option<Entity>, error: ScrapeError) -> ControlFlow<()> {
        match &record {
            Some(entity) => tracing::warn!(record = %entity.label(), %error, "discarded"),
            None => tracing::warn!(%error, "producer failure"),
        }
        let abandon =
            self.options.abandon_on_validation_error && matches!(error, ScrapeError::Validation(_));
        self.report.failures.push(Failure { record, error });
        if abandon {
            self.report.abandoned = true;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    /// Runs deferred reconciliation and returns the report.
    pub fn finish(mut self, max_depth: usize) -> PassReport {
        for membership in std::mem::take(&mut self.deferred) {
            let post_id = membership.post_id.clone().unwrap_or_default();
            let message = match self.observed.get(&membership.organization) {
                Some(posts) if posts.contains_key(&post_id) => continue,
                Some(_) => format!(
                    "membership of '{}' names post '{}' which '{}' does not have",
                    membership.person, post_id, membership.organization
                ),
                None => format!(
                    "membership of '{}' at '{}' references organization '{}' never seen in this pass",
                    membership.person, post_id, membership.organization
                ),
            };
            self.report.failures.push(Failure {
                record: Some(Entity::Membership(membership)),
                error: ScrapeError::consistency(message),
            });
        }

        for ((organization, post_id), count) in &self.occupancy {
            let cap = self
                .observed
                .get(organization)
                .and_then(|posts| posts.get(post_id))
                .and_then(|post| post.max_memberships);
            if let Some(cap) = cap.filter(|cap| count > cap) {
                self.report.failures.push(Failure {
                    record: None,
                    error: ScrapeError::consistency(format!(
                        "post '{post_id}' of '{organization}' allows {cap} membership(s), {count} persisted"
                    )),
                });
            }
        }

        self.report.max_depth = max_depth;
        tracing::info!(
            jurisdiction_id = %self.report.jurisdiction_id,
            persisted = ?self.report.persisted,
            collapsed = self.report.collapsed,
            failures = self.report.failures.len(),
            abandoned = self.report.abandoned,
            "pass finished"
        );
        self.report
    }
}

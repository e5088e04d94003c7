//! A scraper driven by a YAML roster document.
//!
//! ```yaml
//! organizations:
//!   - name: Fiscal Court
//!     classification: legislature
//!     sources: ["https://example.gov/fiscal-court"]
//!     posts:
//!       - { post_id: District 1, role: Magistrate, max_memberships: 1 }
//!     members:
//!       - { person: John Smith, role: Magistrate, post_id: District 1 }
//! people:
//!   - name: John Smith
//!     post_id: District 1
//!     sources: ["https://example.gov/fiscal-court/smith"]
//!     committees:
//!       - { organization: Finance, role: Chair }
//! ```

use serde::Deserialize;

use crate::builder::{OrganizationDraft, PersonDraft};
use crate::collect::{Produced, Producer, ScrapeContext, Scraper};
use crate::error::{FetchError, ScrapeError, ValidationError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RosterFile {
    organizations: Vec<OrganizationEntry>,
    people: Vec<PersonEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct LinkEntry {
    label: String,
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ContactEntry {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct IdentifierEntry {
    scheme: String,
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CommitteeEntry {
    organization: String,
    role: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PersonEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    post_id: String,
    image: Option<String>,
    #[serde(default)]
    other_names: Vec<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    links: Vec<LinkEntry>,
    #[serde(default)]
    contact_details: Vec<ContactEntry>,
    #[serde(default)]
    identifiers: Vec<IdentifierEntry>,
    #[serde(default)]
    committees: Vec<CommitteeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct PostEntry {
    post_id: String,
    role: String,
    max_memberships: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct MemberEntry {
    person: String,
    role: String,
    post_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OrganizationEntry {
    #[serde(default)]
    name: String,
    classification: Option<String>,
    parent: Option<String>,
    #[serde(default)]
    other_names: Vec<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    links: Vec<LinkEntry>,
    #[serde(default)]
    contact_details: Vec<ContactEntry>,
    #[serde(default)]
    identifiers: Vec<IdentifierEntry>,
    #[serde(default)]
    posts: Vec<PostEntry>,
    #[serde(default)]
    members: Vec<MemberEntry>,
}

impl PersonEntry {
    fn build(self) -> Result<PersonDraft, ValidationError> {
        let mut draft = PersonDraft::new(self.name, self.post_id)?;
        if let Some(image) = &self.image {
            draft.set_image(image);
        }
        for name in &self.other_names {
            draft.add_other_name(name);
        }
        for source in &self.sources {
            draft.attach_source(source);
        }
        for link in &self.links {
            draft.attach_link(&link.label, &link.url);
        }
        for contact in &self.contact_details {
            draft.attach_contact_detail(&contact.kind, &contact.value);
        }
        for id in &self.identifiers {
            draft.attach_identifier(&id.scheme, &id.value);
        }
        for committee in &self.committees {
            draft.attach_committee_membership(&committee.organization, &committee.role);
        }
        Ok(draft)
    }
}

impl OrganizationEntry {
    fn build(self) -> Result<OrganizationDraft, ValidationError> {
        let mut draft = OrganizationDraft::new(self.name)?;
        if let Some(classification) = &self.classification {
            draft.set_classification(classification);
        }
        if let Some(parent) = &self.parent {
            draft.set_parent(parent);
        }
        for name in &self.other_names {
            draft.add_other_name(name);
        }
        for source in &self.sources {
            draft.attach_source(source);
        }
        for link in &self.links {
            draft.attach_link(&link.label, &link.url);
        }
        for contact in &self.contact_details {
            draft.attach_contact_detail(&contact.kind, &contact.value);
        }
        for id in &self.identifiers {
            draft.attach_identifier(&id.scheme, &id.value);
        }
        for post in &self.posts {
            match post.max_memberships {
                Some(cap) => draft.add_post_with_cap(&post.post_id, &post.role, cap)?,
                None => draft.add_post(&post.post_id, &post.role)?,
            };
        }
        for member in &self.members {
            match &member.post_id {
                Some(post_id) => {
                    draft.add_post_member(&member.person, &member.role, post_id)?;
                }
                None => {
                    draft.add_member(&member.person, &member.role);
                }
            }
        }
        Ok(draft)
    }
}

/// Scrapes a YAML roster fetched from `uri` through the pass's fetcher.
#[derive(Debug, Clone)]
pub struct FixtureScraper {
    uri: String,
}

impl FixtureScraper {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn load(&self, ctx: ScrapeContext<'_>) -> Result<RosterFile, ScrapeError> {
        let bytes = ctx.fetcher.fetch(&self.uri)?;
        serde_yaml::from_slice(&bytes)
            .map_err(|e| FetchError::new(&self.uri, format!("invalid roster document: {e}")).into())
    }
}

impl Scraper for FixtureScraper {
    fn scrape<'a>(&'a self, ctx: ScrapeContext<'a>) -> Producer<'a> {
        Box::new(std::iter::once_with(move || {
            let roster = match self.load(ctx) {
                Ok(roster) => roster,
                Err(err) => return Produced::Failed(err),
            };
            tracing::debug!(
                uri = %self.uri,
                organizations = roster.organizations.len(),
                people = roster.people.len(),
                "loaded roster"
            );
            let organizations = roster
                .organizations
                .into_iter()
                .map(|entry| Produced::from(entry.build()));
            let people = roster
                .people
                .into_iter()
                .map(|entry| Produced::from(entry.build()));
            Produced::nested([Produced::nested(organizations), Produced::nested(people)])
        }))
    }
}

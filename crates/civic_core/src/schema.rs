use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceRef {
    pub kind: String,         // e.g. "url", "file"
    pub value: String,        // e.g. "https://..."
    pub retrieved_at: String, // ISO-8601 timestamp (UTC recommended)
}

impl SourceRef {
    pub fn url(value: impl Into<String>) -> Self {
        Self {
            kind: "url".to_string(),
            value: value.into(),
            retrieved_at: timestamp_now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Link {
    pub note: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContactDetail {
    #[serde(rename = "type")]
    pub kind: String, // "email", "voice", "address", ...
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Identifier {
    pub scheme: String,
    pub identifier: String,
}

/// Inline membership reference recorded on a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MembershipRef {
    pub organization: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Person {
    pub name: String,
    /// Seat label, stored verbatim. Not a slug and not a foreign key.
    pub post_id: String,
    pub image: Option<String>,
    #[serde(default)]
    pub other_names: Vec<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub contact_details: Vec<ContactDetail>,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub memberships: Vec<MembershipRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Post {
    pub post_id: String,
    pub role: String,
    pub max_memberships: Option<u32>,
}

/// Member reference recorded on an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MemberRef {
    pub person: String,
    pub role: String,
    pub post_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Organization {
    pub name: String,
    pub classification: Option<String>, // "legislature", "committee", ...
    pub parent: Option<String>,
    #[serde(default)]
    pub other_names: Vec<String>,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub contact_details: Vec<ContactDetail>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub members: Vec<MemberRef>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

impl Organization {
    pub fn post(&self, post_id: &str) -> Option<&Post> {
        self.posts.iter().find(|post| post.post_id == post_id)
    }
}

/// A person holding a role in an organization, optionally at a seat.
///
/// `post_id` is copied verbatim from the organization's post when the
/// membership is built. Nothing re-resolves it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Membership {
    pub person: String,
    pub organization: String,
    pub post_id: Option<String>,
    pub role: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Membership,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EntityKind::Person => "person",
            EntityKind::Organization => "organization",
            EntityKind::Membership => "membership",
        };
        write!(f, "{value}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Person(Person),
    Organization(Organization),
    Membership(Membership),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Person(_) => EntityKind::Person,
            Entity::Organization(_) => EntityKind::Organization,
            Entity::Membership(_) => EntityKind::Membership,
        }
    }

    /// Short human label for logs and reports.
    pub fn label(&self) -> String {
        match self {
            Entity::Person(p) => format!("person '{}' ({})", p.name, p.post_id),
            Entity::Organization(o) => format!("organization '{}'", o.name),
            Entity::Membership(m) => match &m.post_id {
                Some(post_id) => format!(
                    "membership '{}' in '{}' at '{}'",
                    m.person, m.organization, post_id
                ),
                None => format!("membership '{}' in '{}'", m.person, m.organization),
            },
        }
    }
}

impl From<Person> for Entity {
    fn from(value: Person) -> Self {
        Entity::Person(value)
    }
}

impl From<Organization> for Entity {
    fn from(value: Organization) -> Self {
        Entity::Organization(value)
    }
}

impl From<Membership> for Entity {
    fn from(value: Membership) -> Self {
        Entity::Membership(value)
    }
}

/// Composite natural key for seat lookups: `(jurisdiction_id, post_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SeatKey {
    pub jurisdiction_id: String,
    pub post_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NaturalKey {
    Person {
        jurisdiction_id: String,
        name: String,
        post_id: String,
    },
    Organization {
        jurisdiction_id: String,
        name: String,
    },
    Membership {
        jurisdiction_id: String,
        person: String,
        organization: String,
        post_id: Option<String>,
    },
}

/// A validated entity stamped with the jurisdiction it was scraped for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub jurisdiction_id: String,
    pub entity: Entity,
}

impl Record {
    pub fn new(jurisdiction_id: impl Into<String>, entity: Entity) -> Self {
        Self {
            jurisdiction_id: jurisdiction_id.into(),
            entity,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        let jurisdiction_id = self.jurisdiction_id.clone();
        match &self.entity {
            Entity::Person(p) => NaturalKey::Person {
                jurisdiction_id,
                name: p.name.clone(),
                post_id: p.post_id.clone(),
            },
            Entity::Organization(o) => NaturalKey::Organization {
                jurisdiction_id,
                name: o.name.clone(),
            },
            Entity::Membership(m) => NaturalKey::Membership {
                jurisdiction_id,
                person: m.person.clone(),
                organization: m.organization.clone(),
                post_id: m.post_id.clone(),
            },
        }
    }

    pub fn seat(&self) -> Option<SeatKey> {
        let post_id = match &self.entity {
            Entity::Person(p) => Some(p.post_id.clone()),
            Entity::Membership(m) => m.post_id.clone(),
            Entity::Organization(_) => None,
        }?;
        Some(SeatKey {
            jurisdiction_id: self.jurisdiction_id.clone(),
            post_id,
        })
    }
}

pub(crate) fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

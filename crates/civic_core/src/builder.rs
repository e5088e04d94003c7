//! Draft builders for the three entity kinds.
//!
//! A draft is mutable until `emit()` consumes it. Emission yields the entity
//! record followed by any membership records created through the sugar
//! paths (`attach_committee_membership`, `add_member`, `add_post_member`).

use crate::error::ValidationError;
use crate::schema::{
    ContactDetail, Entity, EntityKind, Identifier, Link, MemberRef, Membership, MembershipRef,
    Organization, Person, Post, SourceRef, timestamp_now,
};
use crate::validate::require_text;

fn push_source(sources: &mut Vec<SourceRef>, uri: &str, retrieved_at: String) {
    if sources.iter().any(|source| source.value == uri) {
        return;
    }
    sources.push(SourceRef {
        kind: "url".to_string(),
        value: uri.to_string(),
        retrieved_at,
    });
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|existing| existing == name) {
        names.push(name.to_string());
    }
}

#[derive(Debug, Clone)]
pub struct PersonDraft {
    person: Person,
}

impl PersonDraft {
    pub fn new(name: impl Into<String>, post_id: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        let post_id = post_id.into();
        require_text(EntityKind::Person, "name", &name)?;
        require_text(EntityKind::Person, "post_id", &post_id)?;
        Ok(Self {
            person: Person {
                name,
                post_id,
                image: None,
                other_names: Vec::new(),
                links: Vec::new(),
                contact_details: Vec::new(),
                identifiers: Vec::new(),
                sources: Vec::new(),
                memberships: Vec::new(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.person.name
    }

    pub fn post_id(&self) -> &str {
        &self.person.post_id
    }

    pub fn attach_source(&mut self, uri: &str) -> &mut Self {
        push_source(&mut self.person.sources, uri, timestamp_now());
        self
    }

    pub fn attach_source_at(&mut self, uri: &str, retrieved_at: impl Into<String>) -> &mut Self {
        push_source(&mut self.person.sources, uri, retrieved_at.into());
        self
    }

    pub fn attach_link(&mut self, label: &str, uri: &str) -> &mut Self {
        self.person.links.push(Link {
            note: label.to_string(),
            url: uri.to_string(),
        });
        self
    }

    pub fn attach_identifier(&mut self, scheme: &str, value: &str) -> &mut Self {
        self.person.identifiers.push(Identifier {
            scheme: scheme.to_string(),
            identifier: value.to_string(),
        });
        self
    }

    pub fn attach_contact_detail(&mut self, kind: &str, value: &str) -> &mut Self {
        self.person.contact_details.push(ContactDetail {
            kind: kind.to_string(),
            value: value.to_string(),
            note: None,
        });
        self
    }

    pub fn add_other_name(&mut self, name: &str) -> &mut Self {
        push_unique(&mut self.person.other_names, name);
        self
    }

    pub fn set_image(&mut self, uri: &str) -> &mut Self {
        self.person.image = Some(uri.to_string());
        self
    }

    /// Records an unseated membership of this person in `org_name`.
    pub fn attach_committee_membership(&mut self, org_name: &str, role: &str) -> &mut Self {
        self.person.memberships.push(MembershipRef {
            organization: org_name.to_string(),
            role: role.to_string(),
        });
        self
    }

    /// The person record followed by one membership per inline reference.
    pub fn emit(self) -> Vec<Entity> {
        let memberships: Vec<Entity> = self
            .person
            .memberships
            .iter()
            .map(|m| {
                MembershipDraft::unchecked(&self.person.name, &m.organization, &m.role, None)
                    .emit()
            })
            .collect();

        let mut out = Vec::with_capacity(memberships.len() + 1);
        out.push(Entity::Person(self.person));
        out.extend(memberships);
        out
    }
}

#[derive(Debug, Clone)]
pub struct OrganizationDraft {
    org: Organization,
}

impl OrganizationDraft {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        require_text(EntityKind::Organization, "name", &name)?;
        Ok(Self {
            org: Organization {
                name,
                classification: None,
                parent: None,
                other_names: Vec::new(),
                identifiers: Vec::new(),
                contact_details: Vec::new(),
                links: Vec::new(),
                posts: Vec::new(),
                members: Vec::new(),
                sources: Vec::new(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.org.name
    }

    pub fn post(&self, post_id: &str) -> Option<&Post> {
        self.org.post(post_id)
    }

    pub fn set_classification(&mut self, classification: &str) -> &mut Self {
        self.org.classification = Some(classification.to_string());
        self
    }

    pub fn set_parent(&mut self, parent: &str) -> &mut Self {
        self.org.parent = Some(parent.to_string());
        self
    }

    pub fn attach_source(&mut self, uri: &str) -> &mut Self {
        push_source(&mut self.org.sources, uri, timestamp_now());
        self
    }

    pub fn attach_source_at(&mut self, uri: &str, retrieved_at: impl Into<String>) -> &mut Self {
        push_source(&mut self.org.sources, uri, retrieved_at.into());
        self
    }

    pub fn attach_link(&mut self, label: &str, uri: &str) -> &mut Self {
        self.org.links.push(Link {
            note: label.to_string(),
            url: uri.to_string(),
        });
        self
    }

    pub fn attach_identifier(&mut self, scheme: &str, value: &str) -> &mut Self {
        self.org.identifiers.push(Identifier {
            scheme: scheme.to_string(),
            identifier: value.to_string(),
        });
        self
    }

    pub fn attach_contact_detail(&mut self, kind: &str, value: &str) -> &mut Self {
        self.org.contact_details.push(ContactDetail {
            kind: kind.to_string(),
            value: value.to_string(),
            note: None,
        });
        self
    }

    pub fn add_other_name(&mut self, name: &str) -> &mut Self {
        push_unique(&mut self.org.other_names, name);
        self
    }

    pub fn add_post(&mut self, post_id: &str, role: &str) -> Result<&mut Self, ValidationError> {
        self.insert_post(post_id, role, None)
    }

    pub fn add_post_with_cap(
        &mut self,
        post_id: &str,
        role: &str,
        max_memberships: u32,
    ) -> Result<&mut Self, ValidationError> {
        self.insert_post(post_id, role, Some(max_memberships))
    }

    fn insert_post(
        &mut self,
        post_id: &str,
        role: &str,
        max_memberships: Option<u32>,
    ) -> Result<&mut Self, ValidationError> {
        require_text(EntityKind::Organization, "posts.post_id", post_id)?;
        if self.org.post(post_id).is_some() {
            return Err(ValidationError::new(
                EntityKind::Organization,
                "posts.post_id",
                format!("duplicate post '{post_id}' in '{}'", self.org.name),
            ));
        }
        self.org.posts.push(Post {
            post_id: post_id.to_string(),
            role: role.to_string(),
            max_memberships,
        });
        Ok(self)
    }

    /// Renames a post on this organization only. Seat labels already copied
    /// into members or memberships keep their old text.
    pub fn rename_post(&mut self, old: &str, new: &str) -> Result<&mut Self, ValidationError> {
        require_text(EntityKind::Organization, "posts.post_id", new)?;
        if old != new && self.org.post(new).is_some() {
            return Err(ValidationError::new(
                EntityKind::Organization,
                "posts.post_id",
                format!("duplicate post '{new}' in '{}'", self.org.name),
            ));
        }
        let post = self
            .org
            .posts
            .iter_mut()
            .find(|post| post.post_id == old)
            .ok_or_else(|| unknown_post(&self.org.name, old))?;
        post.post_id = new.to_string();
        Ok(self)
    }

    /// Records an unseated member of this organization.
    pub fn add_member(&mut self, person_name: &str, role: &str) -> &mut Self {
        self.org.members.push(MemberRef {
            person: person_name.to_string(),
            role: role.to_string(),
            post_id: None,
        });
        self
    }

    /// Records a member seated at `post_id`, which must already be a post of
    /// this organization. The post's text is copied now.
    pub fn add_post_member(
        &mut self,
        person_name: &str,
        role: &str,
        post_id: &str,
    ) -> Result<&mut Self, ValidationError> {
        let post_id = self
            .org
            .post(post_id)
            .map(|post| post.post_id.clone())
            .ok_or_else(|| unknown_post(&self.org.name, post_id))?;
        self.org.members.push(MemberRef {
            person: person_name.to_string(),
            role: role.to_string(),
            post_id: Some(post_id),
        });
        Ok(self)
    }

    /// The organization record followed by one membership per member.
    pub fn emit(self) -> Vec<Entity> {
        let memberships: Vec<Entity> = self
            .org
            .members
            .iter()
            .map(|m| {
                MembershipDraft::unchecked(
                    &m.person,
                    &self.org.name,
                    &m.role,
                    m.post_id.as_deref(),
                )
                .emit()
            })
            .collect();

        let mut out = Vec::with_capacity(memberships.len() + 1);
        out.push(Entity::Organization(self.org));
        out.extend(memberships);
        out
    }
}

fn unknown_post(org: &str, post_id: &str) -> ValidationError {
    ValidationError::new(
        EntityKind::Membership,
        "post_id",
        format!("'{org}' has no post '{post_id}'"),
    )
}

#[derive(Debug, Clone)]
pub struct MembershipDraft {
    membership: Membership,
}

impl MembershipDraft {
    pub fn new(
        person: impl Into<String>,
        organization: impl Into<String>,
        role: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let draft = Self {
            membership: Membership {
                person: person.into(),
                organization: organization.into(),
                post_id: None,
                role: role.into(),
                start_date: None,
                end_date: None,
            },
        };
        require_text(EntityKind::Membership, "person", &draft.membership.person)?;
        require_text(EntityKind::Membership, "organization", &draft.membership.organization)?;
        require_text(EntityKind::Membership, "role", &draft.membership.role)?;
        Ok(draft)
    }

    /// Membership at a post of `org`, copying the post's current text.
    pub fn for_post(
        person: impl Into<String>,
        org: &OrganizationDraft,
        post_id: &str,
        role: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let post = org
            .post(post_id)
            .ok_or_else(|| unknown_post(org.name(), post_id))?;
        let copied = post.post_id.clone();
        let mut draft = Self::new(person, org.name(), role)?;
        draft.membership.post_id = Some(copied);
        Ok(draft)
    }

    /// Seat label supplied directly. Checked against the organization once
    /// the dispatcher has seen it.
    pub fn with_post_id(mut self, post_id: impl Into<String>) -> Result<Self, ValidationError> {
        let post_id = post_id.into();
        require_text(EntityKind::Membership, "post_id", &post_id)?;
        self.membership.post_id = Some(post_id);
        Ok(self)
    }

    pub fn with_start_date(mut self, label: impl Into<String>) -> Self {
        self.membership.start_date = Some(label.into());
        self
    }

    pub fn with_end_date(mut self, label: impl Into<String>) -> Self {
        self.membership.end_date = Some(label.into());
        self
    }

    // Sugar paths go through here; the dispatcher validates what they build.
    fn unchecked(person: &str, organization: &str, role: &str, post_id: Option<&str>) -> Self {
        Self {
            membership: Membership {
                person: person.to_string(),
                organization: organization.to_string(),
                post_id: post_id.map(str::to_string),
                role: role.to_string(),
                start_date: None,
                end_date: None,
            },
        }
    }

    pub fn emit(self) -> Entity {
        Entity::Membership(self.membership)
    }
}

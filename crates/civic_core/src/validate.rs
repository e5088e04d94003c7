//! Required-field rules shared by the builders and the dispatcher.
//!
//! Text is checked, never normalized: a value that would need trimming is
//! rejected so that whatever is stored stays byte-identical to what the
//! scraper supplied.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::schema::{Entity, EntityKind, Membership, Organization, Person};

pub fn require_text(entity: EntityKind, field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(entity, field, "must not be empty"));
    }
    if value.trim() != value {
        return Err(ValidationError::new(
            entity,
            field,
            format!("has leading or trailing whitespace: {value:?}"),
        ));
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::new(
            entity,
            field,
            format!("contains control characters: {value:?}"),
        ));
    }
    Ok(())
}

pub fn require_uri(entity: EntityKind, field: &str, value: &str) -> Result<(), ValidationError> {
    require_text(entity, field, value)?;
    if value.chars().any(char::is_whitespace) {
        return Err(ValidationError::new(
            entity,
            field,
            format!("URI contains whitespace: {value:?}"),
        ));
    }
    Ok(())
}

pub fn validate_entity(entity: &Entity) -> Result<(), ValidationError> {
    match entity {
        Entity::Person(person) => validate_person(person),
        Entity::Organization(org) => validate_organization(org),
        Entity::Membership(membership) => validate_membership(membership),
    }
}

pub fn validate_person(person: &Person) -> Result<(), ValidationError> {
    const KIND: EntityKind = EntityKind::Person;
    require_text(KIND, "name", &person.name)?;
    require_text(KIND, "post_id", &person.post_id)?;
    require_sources(KIND, person.sources.iter().map(|s| s.value.as_str()))?;
    for membership in &person.memberships {
        require_text(KIND, "memberships.organization", &membership.organization)?;
        require_text(KIND, "memberships.role", &membership.role)?;
    }
    Ok(())
}

pub fn validate_organization(org: &Organization) -> Result<(), ValidationError> {
    const KIND: EntityKind = EntityKind::Organization;
    require_text(KIND, "name", &org.name)?;
    require_sources(KIND, org.sources.iter().map(|s| s.value.as_str()))?;

    let mut seen = HashSet::new();
    for post in &org.posts {
        require_text(KIND, "posts.post_id", &post.post_id)?;
        if !seen.insert(post.post_id.as_str()) {
            return Err(ValidationError::new(
                KIND,
                "posts.post_id",
                format!("duplicate post '{}'", post.post_id),
            ));
        }
    }
    for member in &org.members {
        require_text(KIND, "members.person", &member.person)?;
        require_text(KIND, "members.role", &member.role)?;
    }
    Ok(())
}

pub fn validate_membership(membership: &Membership) -> Result<(), ValidationError> {
    const KIND: EntityKind = EntityKind::Membership;
    require_text(KIND, "person", &membership.person)?;
    require_text(KIND, "organization", &membership.organization)?;
    require_text(KIND, "role", &membership.role)?;
    if let Some(post_id) = &membership.post_id {
        require_text(KIND, "post_id", post_id)?;
    }
    Ok(())
}

fn require_sources<'a>(
    entity: EntityKind,
    sources: impl Iterator<Item = &'a str>,
) -> Result<(), ValidationError> {
    let mut count = 0;
    for source in sources {
        require_uri(entity, "sources", source)?;
        count += 1;
    }
    if count == 0 {
        return Err(ValidationError::new(
            entity,
            "sources",
            "at least one source is required",
        ));
    }
    Ok(())
}

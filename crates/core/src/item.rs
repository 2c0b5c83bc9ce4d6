//! Item: the versioned, mutable business record edits and bulk jobs act on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::ItemId;
use crate::version::INITIAL_VERSION;

const NAME_MIN: usize = 3;
const NAME_MAX: usize = 100;
const DESCRIPTION_MIN: usize = 10;
const DESCRIPTION_MAX: usize = 500;
const CATEGORY_MAX: usize = 50;
const PRICE_MAX_CENTS: u64 = 99_999_999;
const TAGS_MAX: usize = 10;
const TAG_MAX_LEN: usize = 30;

/// Item record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    description: String,
    category: String,
    price_cents: u64,
    tags: Vec<String>,
    is_active: bool,
    deleted_at: Option<DateTime<Utc>>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Fields required to create an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_cents: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update submitted through the single-item edit path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price_cents: Option<u64>,
    pub tags: Option<Vec<String>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.price_cents.is_none()
            && self.tags.is_none()
    }
}

/// A field delta to write to one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ItemMutation {
    Activate,
    Deactivate,
    /// Soft delete: the item becomes inactive and gets a `deleted_at` stamp.
    SoftDelete,
    SetCategory { category: String },
    Patch(ItemPatch),
}

impl Item {
    /// Create a new, active item at [`INITIAL_VERSION`].
    pub fn create(id: ItemId, draft: NewItem, at: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id,
            name: validate_name(&draft.name)?,
            description: validate_description(&draft.description)?,
            category: normalize_category(&draft.category)?,
            price_cents: validate_price(draft.price_cents)?,
            tags: validate_tags(draft.tags)?,
            is_active: true,
            deleted_at: None,
            version: INITIAL_VERSION,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn price_cents(&self) -> u64 {
        self.price_cents
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Return the item as it looks after `mutation`, with the version bumped by one.
    ///
    /// Pure: `self` is untouched, so a failed validation never leaves a
    /// half-applied record behind.
    pub fn mutated(&self, mutation: &ItemMutation, at: DateTime<Utc>) -> DomainResult<Self> {
        let mut next = self.clone();
        match mutation {
            ItemMutation::Activate => next.is_active = true,
            ItemMutation::Deactivate => next.is_active = false,
            ItemMutation::SoftDelete => {
                next.is_active = false;
                next.deleted_at = Some(at);
            }
            ItemMutation::SetCategory { category } => {
                next.category = normalize_category(category)?;
            }
            ItemMutation::Patch(patch) => {
                if patch.is_empty() {
                    return Err(DomainError::validation(
                        "update must change at least one field",
                    ));
                }
                if let Some(name) = &patch.name {
                    next.name = validate_name(name)?;
                }
                if let Some(description) = &patch.description {
                    next.description = validate_description(description)?;
                }
                if let Some(category) = &patch.category {
                    next.category = normalize_category(category)?;
                }
                if let Some(price) = patch.price_cents {
                    next.price_cents = validate_price(price)?;
                }
                if let Some(tags) = &patch.tags {
                    next.tags = validate_tags(tags.clone())?;
                }
            }
        }
        next.version = self.version + 1;
        next.updated_at = at;
        Ok(next)
    }
}

/// Normalize a category to Title Case ("home  APPLIANCES" -> "Home Appliances").
pub fn normalize_category(raw: &str) -> DomainResult<String> {
    let normalized = raw
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    let len = normalized.chars().count();
    if len == 0 || len > CATEGORY_MAX {
        return Err(DomainError::validation(format!(
            "category must be 1-{CATEGORY_MAX} characters"
        )));
    }
    Ok(normalized)
}

fn validate_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(DomainError::validation(format!(
            "name must be {NAME_MIN}-{NAME_MAX} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || c == '-' || c == '_')
    {
        return Err(DomainError::validation(
            "name can only contain letters, numbers, spaces, hyphens, and underscores",
        ));
    }
    Ok(name.to_string())
}

fn validate_description(raw: &str) -> DomainResult<String> {
    let description = raw.trim();
    let len = description.chars().count();
    if !(DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&len) {
        return Err(DomainError::validation(format!(
            "description must be {DESCRIPTION_MIN}-{DESCRIPTION_MAX} characters"
        )));
    }
    Ok(description.to_string())
}

fn validate_price(price_cents: u64) -> DomainResult<u64> {
    if price_cents == 0 || price_cents > PRICE_MAX_CENTS {
        return Err(DomainError::validation(format!(
            "price_cents must be between 1 and {PRICE_MAX_CENTS}"
        )));
    }
    Ok(price_cents)
}

fn validate_tags(tags: Vec<String>) -> DomainResult<Vec<String>> {
    if tags.len() > TAGS_MAX {
        return Err(DomainError::validation(format!(
            "at most {TAGS_MAX} tags are allowed"
        )));
    }
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        let len = tag.chars().count();
        if len == 0 || len > TAG_MAX_LEN {
            return Err(DomainError::validation(format!(
                "tags must be 1-{TAG_MAX_LEN} characters"
            )));
        }
        if !seen.insert(tag.clone()) {
            return Err(DomainError::validation(format!("duplicate tag: {tag}")));
        }
        out.push(tag);
    }
    Ok(out)
}

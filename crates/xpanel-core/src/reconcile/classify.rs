//! Template-versus-database ownership decisions for single entries.

use std::collections::HashSet;

use crate::document::{self, ConfigDocument, ConfigEntry, DocumentError};
use crate::types::ResourceKind;

/// Which side owns an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Passed through verbatim in the stored template.
    Template(TemplateReason),
    /// Materialized as a database record.
    Managed,
}

/// Why an entry stays in the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateReason {
    /// No tag, so it cannot be correlated with a record.
    Untagged,
    /// The stored template already owned this tag.
    TemplateOwned,
    /// A key required to build a record is missing.
    Incomplete { missing: &'static str },
}

/// Tags owned by the stored template before a submission is applied.
#[derive(Debug, Clone, Default)]
pub struct TemplateTags {
    tags: HashSet<String>,
}

impl TemplateTags {
    pub fn collect(template: &ConfigDocument, kind: ResourceKind) -> Self {
        let tags = template
            .entries(kind)
            .iter()
            .filter_map(ConfigEntry::from_value)
            .map(|entry| entry.tag())
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();
        Self { tags }
    }

    /// Tags owned by the stored template text, or by `default` while nothing
    /// has been stored.
    pub fn from_stored(
        stored: Option<&str>,
        default: &ConfigDocument,
        kind: ResourceKind,
    ) -> Result<Self, DocumentError> {
        match stored {
            Some(text) => Ok(Self::collect(&document::decode(text)?, kind)),
            None => Ok(Self::collect(default, kind)),
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for TemplateTags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Decide who owns `entry`.
///
/// Rules apply in order: an empty tag stays in the template; a tag the stored
/// template already owned stays there (template ownership is sticky); an
/// entry missing a required key stays there; anything else is managed.
pub fn classify(
    tag: &str,
    template_tags: &TemplateTags,
    entry: &ConfigEntry<'_>,
    kind: ResourceKind,
) -> Disposition {
    if tag.is_empty() {
        return Disposition::Template(TemplateReason::Untagged);
    }
    if template_tags.contains(tag) {
        return Disposition::Template(TemplateReason::TemplateOwned);
    }
    if let Some(missing) = kind.required_keys().iter().find(|key| !entry.has(key)) {
        return Disposition::Template(TemplateReason::Incomplete { missing });
    }
    Disposition::Managed
}

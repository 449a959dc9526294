//! Translation of source relationship types into target link types.
//!
//! The table is explicit: every source key the migration understands is
//! listed with the target category it becomes and which end is the outward
//! (source-side) end. Keys not in the table become `Relates`.

use std::fmt;

use crate::platform::TargetLinkType;

/// Target link categories, named as the target names its built-in types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkCategory {
    Depend,
    Duplicate,
    Subtask,
    Relates,
}

impl LinkCategory {
    pub fn target_name(self) -> &'static str {
        match self {
            LinkCategory::Depend => "Depend",
            LinkCategory::Duplicate => "Duplicate",
            LinkCategory::Subtask => "Subtask",
            LinkCategory::Relates => "Relates",
        }
    }
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target_name())
    }
}

/// Which end of a link is the outward end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The issue the link was listed on is the outward end.
    Outward,
    /// The other issue is the outward end.
    Inward,
}

impl Direction {
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Direction::Outward => Direction::Inward,
            Direction::Inward => Direction::Outward,
        }
    }
}

/// One row of the link-type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRule {
    pub key: &'static str,
    pub category: LinkCategory,
    pub direction: Direction,
}

const fn rule(key: &'static str, category: LinkCategory, direction: Direction) -> LinkRule {
    LinkRule {
        key,
        category,
        direction,
    }
}

/// Source type key → target category, for links listed in the outward direction.
///
/// Target outward readings: Depend "depends on", Duplicate "duplicates",
/// Subtask "parent for".
pub const LINK_RULES: &[LinkRule] = &[
    rule("relates", LinkCategory::Relates, Direction::Outward),
    rule("depends", LinkCategory::Depend, Direction::Outward),
    rule("depends on", LinkCategory::Depend, Direction::Outward),
    rule("is dependent by", LinkCategory::Depend, Direction::Inward),
    rule("duplicates", LinkCategory::Duplicate, Direction::Outward),
    rule("is duplicated by", LinkCategory::Duplicate, Direction::Inward),
    rule("subtask", LinkCategory::Subtask, Direction::Inward),
    rule("is subtask for", LinkCategory::Subtask, Direction::Inward),
    rule("parent", LinkCategory::Subtask, Direction::Outward),
    rule("is parent task for", LinkCategory::Subtask, Direction::Outward),
    rule("epic", LinkCategory::Subtask, Direction::Outward),
    rule("is epic of", LinkCategory::Subtask, Direction::Outward),
    rule("has epic", LinkCategory::Subtask, Direction::Inward),
];

/// Rule applied to keys missing from [`LINK_RULES`].
pub const FALLBACK_RULE: LinkRule = rule("relates", LinkCategory::Relates, Direction::Outward);

fn normalize_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Look up a source type key (case, `_`, `-` and spacing are ignored).
pub fn lookup(key: &str) -> Option<LinkRule> {
    let key = normalize_key(key);
    LINK_RULES.iter().find(|r| r.key == key).copied()
}

/// The outward end of a source link, given its rule and listed direction.
pub fn outward_end(rule: &LinkRule, listed_inward: bool) -> Direction {
    if listed_inward {
        rule.direction.flip()
    } else {
        rule.direction
    }
}

/// Resolves categories against the link types the target actually defines.
#[derive(Debug, Clone)]
pub struct LinkTypeResolver {
    types: Vec<TargetLinkType>,
}

impl LinkTypeResolver {
    pub fn new(types: Vec<TargetLinkType>) -> Self {
        Self { types }
    }

    fn by_name(&self, name: &str) -> Option<&TargetLinkType> {
        self.types
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// The target type for `category`, or the target's `Relates` type.
    pub fn resolve(&self, category: LinkCategory) -> Option<&TargetLinkType> {
        self.by_name(category.target_name())
            .or_else(|| self.by_name(LinkCategory::Relates.target_name()))
    }
}

/// Order-independent identity of a target link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkSignature {
    low: String,
    high: String,
    link_type: String,
}

impl LinkSignature {
    pub fn new(a: &str, b: &str, link_type: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.to_string(),
            high: high.to_string(),
            link_type: link_type.to_lowercase(),
        }
    }
}

impl fmt::Display for LinkSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.low, self.high, self.link_type)
    }
}

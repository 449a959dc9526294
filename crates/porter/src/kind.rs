use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four kinds of entity the migration moves, in stage order.
///
/// Each kind is also a migration stage and owns one mapping ledger file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Accounts,
    Projects,
    WorkItems,
    Links,
}

impl EntityKind {
    /// All kinds in the order their stages run.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Accounts,
        EntityKind::Projects,
        EntityKind::WorkItems,
        EntityKind::Links,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Accounts => "accounts",
            EntityKind::Projects => "projects",
            EntityKind::WorkItems => "work-items",
            EntityKind::Links => "links",
        }
    }

    /// Top-level key holding the mapping inside the ledger file.
    #[must_use]
    pub fn ledger_key(self) -> &'static str {
        match self {
            EntityKind::Accounts => "users",
            EntityKind::Projects => "projects",
            EntityKind::WorkItems => "issues",
            EntityKind::Links => "links",
        }
    }

    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            EntityKind::Accounts => "user_mapping.json",
            EntityKind::Projects => "project_mapping.json",
            EntityKind::WorkItems => "issue_mapping.json",
            EntityKind::Links => "link_mapping.json",
        }
    }

    /// Stages whose ledgers must be non-empty before this stage may run.
    #[must_use]
    pub fn prerequisites(self) -> &'static [EntityKind] {
        match self {
            EntityKind::Accounts => &[],
            EntityKind::Projects => &[EntityKind::Accounts],
            EntityKind::WorkItems => &[EntityKind::Accounts, EntityKind::Projects],
            EntityKind::Links => &[
                EntityKind::Accounts,
                EntityKind::Projects,
                EntityKind::WorkItems,
            ],
        }
    }

    /// Records processed between two ledger checkpoints.
    #[must_use]
    pub fn checkpoint_interval(self) -> usize {
        match self {
            EntityKind::Accounts => 20,
            EntityKind::Projects => 10,
            EntityKind::WorkItems => 50,
            EntityKind::Links => 50,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage '{0}' (expected accounts, projects, work-items or links)")]
pub struct UnknownKind(pub String);

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accounts" | "users" => Ok(EntityKind::Accounts),
            "projects" | "queues" => Ok(EntityKind::Projects),
            "work-items" | "work_items" | "issues" => Ok(EntityKind::WorkItems),
            "links" => Ok(EntityKind::Links),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

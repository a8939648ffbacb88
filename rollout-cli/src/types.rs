//! Common types used across CLI modules

use uuid::Uuid;

/// A full UUID or a prefix expected to identify exactly one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrPrefix {
    Full(Uuid),
    Prefix(String),
}

impl IdOrPrefix {
    /// Parses a full UUID, otherwise keeps the lowercased input as a prefix
    pub fn parse(input: &str) -> Self {
        match Uuid::parse_str(input) {
            Ok(uuid) => IdOrPrefix::Full(uuid),
            Err(_) => IdOrPrefix::Prefix(input.trim().to_lowercase()),
        }
    }

    /// Picks the single id starting with this prefix out of `candidates`
    ///
    /// `kind` names the resource in error messages.
    pub fn resolve_among(
        &self,
        kind: &str,
        candidates: impl IntoIterator<Item = Uuid>,
    ) -> anyhow::Result<Uuid> {
        let prefix = match self {
            IdOrPrefix::Full(uuid) => return Ok(*uuid),
            IdOrPrefix::Prefix(prefix) => prefix,
        };
        if prefix.is_empty() {
            anyhow::bail!("Empty {} id", kind);
        }

        let matches: Vec<Uuid> = candidates
            .into_iter()
            .filter(|id| id.to_string().starts_with(prefix.as_str()))
            .collect();

        match matches.as_slice() {
            [] => anyhow::bail!("No {} found with ID starting with '{}'", kind, prefix),
            [id] => Ok(*id),
            _ => {
                let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
                anyhow::bail!(
                    "Ambiguous prefix '{}' matches multiple {}s: {}",
                    prefix,
                    kind,
                    ids.join(", ")
                )
            }
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

//! Canonical container identifiers.
//!
//! Every container metaship starts is named `metaship-<kind>-<name>-<port>`.
//! The name is the only state metaship keeps about a container: the engine's
//! process list is scanned by prefix and each name decoded back into its
//! parts.
//!
//! The kind segment is a closed, hyphen-free set and the port is always the
//! final segment, so a logical name may itself contain hyphens and still
//! decode unambiguously.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::NameError;

/// Prefix shared by every container metaship manages.
pub const CONTAINER_PREFIX: &str = "metaship";

/// Name of the shared database-admin console container.
pub const CLOUDBEAVER_CONTAINER: &str = "metaship-cloudbeaver";

static IDENTIFIER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^metaship-([a-z]+)-(.+)-([0-9]+)$").ok());

/// The role a managed container plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// A database engine (Postgres, MariaDB, MySQL, Clickhouse).
    Database,
    /// A Metabase instance.
    Metabase,
}

impl ContainerKind {
    /// The segment written into container names.
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::Database => "db",
            Self::Metabase => "metabase",
        }
    }

    /// Name prefix shared by all containers of this kind.
    #[must_use]
    pub fn name_prefix(self) -> String {
        format!("{CONTAINER_PREFIX}-{}-", self.segment())
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "db" => Some(Self::Database),
            "metabase" => Some(Self::Metabase),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// A decoded container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName {
    kind: ContainerKind,
    name: String,
    port: u16,
}

impl ContainerName {
    /// Build an identifier from its parts.
    ///
    /// # Errors
    ///
    /// Returns `NameError::InvalidSegment` when `name` is empty or contains
    /// whitespace.
    pub fn new(kind: ContainerKind, name: impl Into<String>, port: u16) -> Result<Self, NameError> {
        let logical = name.into();
        if logical.is_empty() || logical.chars().any(char::is_whitespace) {
            return Err(NameError::InvalidSegment {
                segment: "name",
                value: logical,
            });
        }

        Ok(Self {
            kind,
            name: logical,
            port,
        })
    }

    /// The container's role.
    #[must_use]
    pub const fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// The logical name, e.g. `postgres` or `v1.54.1`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host port the container publishes.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Render the full container name.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{CONTAINER_PREFIX}-{}-{}-{}",
            self.kind.segment(),
            self.name,
            self.port
        )
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ContainerName {
    type Err = NameError;

    fn from_str(identifier: &str) -> Result<Self, Self::Err> {
        decode(identifier)
    }
}

/// Encode a container name from its parts.
///
/// # Errors
///
/// Returns `NameError::InvalidSegment` when `name` is empty or contains
/// whitespace.
pub fn encode(kind: ContainerKind, name: &str, port: u16) -> Result<String, NameError> {
    ContainerName::new(kind, name, port).map(|container| container.encode())
}

/// Decode a container name produced by [`encode`].
///
/// A leading `/`, as reported by the engine's list endpoint, is ignored.
///
/// # Errors
///
/// Returns `NameError::MalformedIdentifier` when the prefix, kind, name or
/// port segment is missing, the kind is unknown, or the port is not a valid
/// TCP port.
pub fn decode(identifier: &str) -> Result<ContainerName, NameError> {
    let malformed = || NameError::MalformedIdentifier {
        identifier: identifier.to_owned(),
    };
    let trimmed = identifier.trim_start_matches('/');

    let captures = IDENTIFIER_PATTERN
        .as_ref()
        .and_then(|pattern| pattern.captures(trimmed))
        .ok_or_else(malformed)?;

    let kind = captures
        .get(1)
        .and_then(|segment| ContainerKind::from_segment(segment.as_str()))
        .ok_or_else(malformed)?;
    let name = captures
        .get(2)
        .map(|segment| segment.as_str())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(malformed)?;
    let port = captures
        .get(3)
        .and_then(|segment| segment.as_str().parse::<u16>().ok())
        .ok_or_else(malformed)?;

    ContainerName::new(kind, name, port).map_err(|_| malformed())
}

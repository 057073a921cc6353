// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Versioned key selectors for the persistent store.
//!
//! The signing protocol and the session schema have changed over time, so
//! every key the controller writes is derived from a [`SchemaVersion`].
//! Older layouts stay readable for migration; unknown versions fail closed.

use std::fmt;

/// Key holding the schema version marker.
pub const VERSION_KEY: &str = "version";

/// Store schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaVersion {
    /// Legacy layout: one controller slot shared by every origin.
    V1,
    /// Origin-scoped layout.
    V2,
}

impl SchemaVersion {
    /// Version written by this build.
    pub const CURRENT: SchemaVersion = SchemaVersion::V2;

    /// Numeric form stored under [`VERSION_KEY`].
    pub fn as_u32(self) -> u32 {
        match self {
            SchemaVersion::V1 => 1,
            SchemaVersion::V2 => 2,
        }
    }

    /// Parse the stored marker. Returns `None` for versions this build
    /// does not understand.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.trim() {
            "1" => Some(SchemaVersion::V1),
            "2" => Some(SchemaVersion::V2),
            _ => None,
        }
    }

    /// Key formatting functions for this version.
    pub fn selectors(self) -> Selectors {
        Selectors { version: self }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Key formatting for one schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selectors {
    version: SchemaVersion,
}

impl Selectors {
    /// Schema version these selectors belong to.
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Key of the controller record for `origin`.
    ///
    /// `V1` ignores the origin: there was a single slot.
    pub fn controller(&self, origin: &str) -> String {
        match self.version {
            SchemaVersion::V1 => "controller".to_string(),
            SchemaVersion::V2 => format!("@v2/controller/{origin}"),
        }
    }

    /// Key of the admin grant of `origin` over the account `address`.
    pub fn admin(&self, address: &str, origin: &str) -> String {
        match self.version {
            SchemaVersion::V1 => format!("admin:{address}:{origin}"),
            SchemaVersion::V2 => format!("@v2/admin/{address}/{origin}"),
        }
    }

    /// Split an admin key of this version back into `(address, origin)`.
    pub fn parse_admin(&self, key: &str) -> Option<(String, String)> {
        match self.version {
            SchemaVersion::V1 => {
                let rest = key.strip_prefix("admin:")?;
                let (address, origin) = rest.split_once(':')?;
                Some((address.to_string(), origin.to_string()))
            }
            SchemaVersion::V2 => {
                let rest = key.strip_prefix("@v2/admin/")?;
                let (address, origin) = rest.split_once('/')?;
                Some((address.to_string(), origin.to_string()))
            }
        }
    }
}

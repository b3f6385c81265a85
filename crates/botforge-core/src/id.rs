//! Stable ID newtypes for sources, peers and simulated entities.
//!
//! All IDs are distinct newtype wrappers, providing type safety so that an
//! `EntityId` cannot be accidentally used where a `TeamId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a connected peer (a player client or the server itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// The authoritative server. Sources it owns are resolved locally.
    pub const SERVER: PeerId = PeerId(Uuid::nil());

    /// Allocates a fresh random peer identity.
    pub fn new() -> Self {
        PeerId(Uuid::new_v4())
    }

    /// Builds a deterministic peer identity, mostly useful in tests.
    pub const fn from_u128(value: u128) -> Self {
        PeerId(Uuid::from_u128(value))
    }
}

impl Default for PeerId {
    fn default() -> Self {
        PeerId::SERVER
    }
}

/// Identifier of a compilable program, scoped to the peer that owns it.
///
/// Equality is structural: two ids naming the same path on the same peer
/// refer to the same compilation record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId {
    /// Logical path of the source file on the owning peer.
    pub path: String,
    /// Peer that owns (and serves) the source text.
    pub owner: PeerId,
}

impl SourceId {
    pub fn new(path: impl Into<String>, owner: PeerId) -> Self {
        SourceId {
            path: path.into(),
            owner,
        }
    }

    /// A source owned by the server.
    pub fn local(path: impl Into<String>) -> Self {
        SourceId::new(path, PeerId::SERVER)
    }

    /// Another path on the same peer. Dependencies named by a source live
    /// next to it.
    pub fn sibling(&self, path: impl Into<String>) -> Self {
        SourceId::new(path, self.owner)
    }
}

/// Simulated entity identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Team (faction) identity. GUI elements and cargo transfers are
/// ownership-checked against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub u16);

/// Compiled-program version. Fresh values are handed out by the compilation
/// registry; `Version::NONE` means "never compiled".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Version(pub u64);

impl Version {
    pub const NONE: Version = Version(0);
}

// Display implementations -- just print the inner value.

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.owner == PeerId::SERVER {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}@{}", self.path, self.owner)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

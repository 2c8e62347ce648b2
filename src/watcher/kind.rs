//! Event kind bitset shared by the registrar, the tree watcher and callers.

use std::fmt;

use bitflags::bitflags;

use super::WatchError;

bitflags! {
    /// Set of filesystem event kinds.
    ///
    /// Used both as a mask (what a caller wants to see) and as the kind of a
    /// single event (what happened).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventKinds: u32 {
        /// An entry was created inside a watched directory.
        const CREATED = 1 << 0;
        /// An entry inside a watched directory was removed.
        const DELETED = 1 << 1;
        /// Contents or metadata of an entry changed.
        const MODIFIED = 1 << 2;
        /// An entry was renamed into, out of or within a watched directory.
        const MOVED = 1 << 3;
        /// The subject of the event is a directory.
        const IS_DIR = 1 << 4;
        /// The watched path itself was removed.
        const DELETE_SELF = 1 << 5;
        /// Anything the native facility reports that has no better bucket.
        const OTHER = 1 << 6;

        /// Bits every registration carries regardless of what the caller asked for.
        const REQUIRED = Self::IS_DIR.bits() | Self::CREATED.bits() | Self::DELETE_SELF.bits();
    }
}

const NAMES: &[(&str, EventKinds)] = &[
    ("created", EventKinds::CREATED),
    ("deleted", EventKinds::DELETED),
    ("modified", EventKinds::MODIFIED),
    ("moved", EventKinds::MOVED),
    ("is_dir", EventKinds::IS_DIR),
    ("delete_self", EventKinds::DELETE_SELF),
    ("other", EventKinds::OTHER),
];

impl EventKinds {
    /// True for a directory creation, the trigger for growing the tree.
    pub fn is_new_dir(self) -> bool {
        self.contains(Self::CREATED | Self::IS_DIR)
    }

    /// True when the watched path itself went away.
    pub fn is_delete_self(self) -> bool {
        self.contains(Self::DELETE_SELF)
    }

    /// Parse a single kind name such as `created` or `delete-self`.
    pub fn from_kind_name(name: &str) -> Result<Self, WatchError> {
        let normalized = name.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "all" => Ok(Self::all()),
            "none" => Ok(Self::empty()),
            _ => NAMES
                .iter()
                .find(|(n, _)| *n == normalized)
                .map(|(_, kind)| *kind)
                .ok_or_else(|| WatchError::UnknownKind {
                    name: name.to_string(),
                }),
        }
    }

    /// Parse a comma separated list of kind names.
    pub fn parse(list: &str) -> Result<Self, WatchError> {
        list.split(',')
            .filter(|part| !part.trim().is_empty())
            .try_fold(Self::empty(), |acc, part| Ok(acc | Self::from_kind_name(part)?))
    }

    /// Names of the individual kinds set, in declaration order.
    pub fn names(self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(_, kind)| self.contains(*kind))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl fmt::Display for EventKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.names().join("|"))
    }
}

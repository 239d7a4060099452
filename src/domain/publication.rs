//! Publications: coarse invalidation signals fanned out to every connection.
//!
//! A publication never carries the changed data. It only says that
//! something in a collection changed, so receivers re-run their queries.
//! Duplicates are therefore harmless and may be coalesced.

use serde::Serialize;

use super::CollectionKind;

/// Signal broadcast through the [`super::PublicationBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum Publication {
    /// Something in the given collection changed.
    Invalidate(CollectionKind),
    /// Heartbeat; exercises delivery so dead connections get reaped.
    Ping,
}

impl Publication {
    /// Returns `true` for heartbeat publications.
    #[must_use]
    pub const fn is_ping(&self) -> bool {
        matches!(self, Self::Ping)
    }

    /// Returns the invalidated collection, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<CollectionKind> {
        match self {
            Self::Invalidate(kind) => Some(*kind),
            Self::Ping => None,
        }
    }
}

impl From<CollectionKind> for Publication {
    fn from(kind: CollectionKind) -> Self {
        Self::Invalidate(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_has_no_kind() {
        assert!(Publication::Ping.is_ping());
        assert_eq!(Publication::Ping.kind(), None);
    }

    #[test]
    fn invalidation_carries_kind() {
        let publication = Publication::from(CollectionKind::Deal);
        assert!(!publication.is_ping());
        assert_eq!(publication.kind(), Some(CollectionKind::Deal));
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_string(&Publication::Invalidate(CollectionKind::User))
            .unwrap_or_default();
        assert_eq!(json, r#"{"type":"invalidate","kind":"users"}"#);
    }
}

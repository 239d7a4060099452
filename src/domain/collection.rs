//! Collection kinds: the five record families a query snapshot can hold.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A record collection.
///
/// Variants are declared in their fixed ordinal order
/// (`Org < User < Listing < Deal < Event`), which is also the order in which
/// diffs and coalesced invalidations are processed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum CollectionKind {
    /// Organizations (dealers, clubs, the marketplace operator, ...).
    #[serde(rename = "orgs")]
    Org,
    /// Individual users.
    #[serde(rename = "users")]
    User,
    /// Boats offered for rent or sale.
    #[serde(rename = "listings")]
    Listing,
    /// Transactions on a listing.
    #[serde(rename = "deals")]
    Deal,
    /// Messages, payments, reviews and notifications.
    #[serde(rename = "events")]
    Event,
}

impl CollectionKind {
    /// All kinds in ordinal order.
    pub const ALL: [Self; 5] = [Self::Org, Self::User, Self::Listing, Self::Deal, Self::Event];

    /// Returns the 1-based ordinal of this kind.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Org => 1,
            Self::User => 2,
            Self::Listing => 3,
            Self::Deal => 4,
            Self::Event => 5,
        }
    }

    /// Looks a kind up by its 1-based ordinal.
    #[must_use]
    pub const fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            1 => Some(Self::Org),
            2 => Some(Self::User),
            3 => Some(Self::Listing),
            4 => Some(Self::Deal),
            5 => Some(Self::Event),
            _ => None,
        }
    }

    /// Returns the wire name of the collection.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Org => "orgs",
            Self::User => "users",
            Self::Listing => "listings",
            Self::Deal => "deals",
            Self::Event => "events",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

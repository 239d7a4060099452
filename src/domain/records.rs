//! Marketplace record shapes: orgs, users, listings, deals and events.
//!
//! Every record type implements [`Record`], which ties it to its
//! [`CollectionKind`] and lets the store assign ids and write stamps
//! generically.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::CollectionKind;

/// Common behavior of every stored record.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection this record type belongs to.
    const KIND: CollectionKind;

    /// Returns the record id (0 for a record not yet stored).
    fn id(&self) -> i64;

    /// Sets the record id.
    fn assign_id(&mut self, id: i64);

    /// Stamps the time of the latest write.
    fn stamp(&mut self, at: DateTime<Utc>);

    /// Returns the owning user, if any.
    fn owner_user_id(&self) -> Option<i64> {
        None
    }

    /// Returns the owning org, if any.
    fn owner_org_id(&self) -> Option<i64> {
        None
    }
}

/// Organization role in the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrgKind {
    /// The marketplace operator itself.
    Marketplace,
    /// Boating club.
    Club,
    /// Crew and captain provider.
    Crew,
    /// Boat dealer.
    Dealer,
    /// Lender.
    Financer,
    /// Insurance carrier.
    Insurer,
    /// Boat builder.
    Manufacturer,
    /// Repair and maintenance shop.
    Servicer,
    /// Boat hauler.
    Transporter,
}

impl OrgKind {
    /// Every org kind, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Marketplace,
        Self::Club,
        Self::Crew,
        Self::Dealer,
        Self::Financer,
        Self::Insurer,
        Self::Manufacturer,
        Self::Servicer,
        Self::Transporter,
    ];
}

/// An organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Org {
    /// Record id (0 to create).
    #[serde(default)]
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Roles this org plays.
    #[serde(default)]
    pub kinds: Vec<OrgKind>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Time of the latest write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Org {
    const KIND: CollectionKind = CollectionKind::Org;

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    fn stamp(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    fn owner_org_id(&self) -> Option<i64> {
        Some(self.id)
    }
}

/// A marketplace user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    /// Record id (0 to create).
    #[serde(default)]
    pub id: i64,
    /// Org the user belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    /// Given name.
    #[serde(default)]
    pub given_name: String,
    /// Family name.
    #[serde(default)]
    pub family_name: String,
    /// Profile text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Spoken languages as BCP-47 tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    /// Favorite listing ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub favorites: Vec<i64>,
    /// Time of the latest write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for User {
    const KIND: CollectionKind = CollectionKind::User;

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    fn stamp(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    fn owner_user_id(&self) -> Option<i64> {
        Some(self.id)
    }

    fn owner_org_id(&self) -> Option<i64> {
        self.org_id
    }
}

/// A boat offered for rent or sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Listing {
    /// Record id (0 to create).
    #[serde(default)]
    pub id: i64,
    /// Owner user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Owner org.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    /// Listing headline; an empty title means the listing is pending.
    #[serde(default)]
    pub title: String,
    /// Builder.
    #[serde(default)]
    pub make: String,
    /// Model name.
    #[serde(default)]
    pub model: String,
    /// Model year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    /// Length overall in feet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_ft: Option<f32>,
    /// Rental price per hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<f64>,
    /// Asking price for a sale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<f64>,
    /// Time of the latest write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Listing {
    const KIND: CollectionKind = CollectionKind::Listing;

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    fn stamp(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    fn owner_user_id(&self) -> Option<i64> {
        self.user_id
    }

    fn owner_org_id(&self) -> Option<i64> {
        self.org_id
    }
}

/// Kind of transaction a deal represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DealKind {
    /// Bareboat rental.
    Rental,
    /// Captained cruise.
    Cruise,
    /// Shared ride.
    Ride,
    /// Outright sale.
    Sale,
    /// Financing.
    Finance,
    /// Insurance.
    Insure,
    /// Hauling.
    Transport,
    /// Maintenance.
    Service,
    /// Crew hire.
    Crew,
}

impl DealKind {
    /// Every deal kind, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Rental,
        Self::Cruise,
        Self::Ride,
        Self::Sale,
        Self::Finance,
        Self::Insure,
        Self::Transport,
        Self::Service,
        Self::Crew,
    ];
}

/// Lifecycle state of a deal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    /// Requested by the customer.
    #[default]
    Proposed,
    /// Accepted by the listing owner.
    Accepted,
    /// Cancelled by either party.
    Cancelled,
    /// Finished.
    Completed,
}

impl DealStatus {
    /// Every deal status, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Proposed,
        Self::Accepted,
        Self::Cancelled,
        Self::Completed,
    ];
}

/// A transaction on a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Deal {
    /// Record id (0 to create).
    #[serde(default)]
    pub id: i64,
    /// Listing the deal is for.
    pub listing_id: i64,
    /// Customer user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Customer org.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    /// Transaction kind.
    pub kind: DealKind,
    /// Lifecycle state.
    #[serde(default)]
    pub status: DealStatus,
    /// Start of the booked period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    /// End of the booked period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    /// Agreed price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Time of the latest write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Deal {
    const KIND: CollectionKind = CollectionKind::Deal;

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    fn stamp(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    fn owner_user_id(&self) -> Option<i64> {
        self.user_id
    }

    fn owner_org_id(&self) -> Option<i64> {
        self.org_id
    }
}

/// Discriminator of an [`EventBody`], used for query filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Private message.
    Message,
    /// Payment.
    Payment,
    /// Review.
    Review,
    /// System notification.
    Notification,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Message,
        Self::Payment,
        Self::Review,
        Self::Notification,
    ];
}

/// Payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventBody {
    /// A private message from one user to another.
    Message {
        /// Message text.
        text: String,
    },
    /// A payment, partial or full.
    Payment {
        /// ISO-4217 currency code.
        currency: String,
        /// Amount in `currency`.
        amount: f64,
        /// Whether the payment is a refundable deposit.
        #[serde(default)]
        is_deposit: bool,
    },
    /// A review of a listing or user.
    Review {
        /// Rating from 1 to 5.
        rating: u8,
        /// Review text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// A system-generated notification.
    Notification {
        /// Notification text.
        text: String,
        /// Suggested client action (e.g. `"check_in"`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },
}

impl EventBody {
    /// Returns the discriminator of this body.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Message { .. } => EventKind::Message,
            Self::Payment { .. } => EventKind::Payment,
            Self::Review { .. } => EventKind::Review,
            Self::Notification { .. } => EventKind::Notification,
        }
    }
}

/// A message, payment, review or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    /// Record id (0 to create).
    #[serde(default)]
    pub id: i64,
    /// Deal the event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<i64>,
    /// Listing the event is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<i64>,
    /// Owner (usually the recipient).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Owner org.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    /// Sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<i64>,
    /// Users that have not read the event yet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unread_by: Vec<i64>,
    /// Event payload.
    pub body: EventBody,
    /// Time of the latest write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Event {
    const KIND: CollectionKind = CollectionKind::Event;

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    fn stamp(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    fn owner_user_id(&self) -> Option<i64> {
        self.user_id
    }

    fn owner_org_id(&self) -> Option<i64> {
        self.org_id
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn event_body_is_tagged_by_kind() {
        let body = EventBody::Message {
            text: "is the boat free on Saturday?".to_string(),
        };
        assert_eq!(body.kind(), EventKind::Message);
        let json = serde_json::to_value(&body).unwrap_or_default();
        assert_eq!(json["kind"], "message");
        assert_eq!(json["text"], "is the boat free on Saturday?");
    }

    #[test]
    fn listing_defaults_on_missing_fields() {
        let Ok(listing) = serde_json::from_str::<Listing>(r#"{"title":"Sea Ray 240"}"#) else {
            panic!("minimal listing should deserialize");
        };
        assert_eq!(listing.id, 0);
        assert_eq!(listing.title, "Sea Ray 240");
        assert!(listing.user_id.is_none());
    }

    #[test]
    fn optional_fields_are_omitted() {
        let org = Org {
            id: 3,
            name: "Harbor Club".to_string(),
            kinds: vec![OrgKind::Club],
            description: None,
            updated_at: None,
        };
        let json = serde_json::to_string(&org).unwrap_or_default();
        assert!(!json.contains("description"));
        assert!(!json.contains("updated_at"));
        assert!(json.contains("\"club\""));
    }

    #[test]
    fn owners_follow_record_fields() {
        let mut user = User {
            id: 0,
            org_id: Some(4),
            given_name: "Ana".to_string(),
            family_name: "Silva".to_string(),
            description: None,
            languages: vec![],
            favorites: vec![],
            updated_at: None,
        };
        user.assign_id(9);
        assert_eq!(user.owner_user_id(), Some(9));
        assert_eq!(user.owner_org_id(), Some(4));
        assert_eq!(User::KIND, CollectionKind::User);
    }
}

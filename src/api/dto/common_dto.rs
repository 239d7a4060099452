//! Shared DTO types used across multiple endpoints.

use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::records::{Deal, Event, Listing, Org, User};

/// Response body for record upserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct IdResponse {
    /// Id of the stored record.
    pub id: i64,
}

/// Shape of a query response and of every stream patch frame.
///
/// Only the queried collection is present. In a patch, a `null` record
/// marks a deletion.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueryResultDto {
    /// Subscription id; omitted when the query did not subscribe.
    pub subscription_id: Option<u64>,
    /// Orgs by id; `null` in a patch marks a deleted org.
    pub orgs: Option<BTreeMap<String, Org>>,
    /// Users by id; `null` in a patch marks a deleted user.
    pub users: Option<BTreeMap<String, User>>,
    /// Listings by id; `null` in a patch marks a deleted listing.
    pub listings: Option<BTreeMap<String, Listing>>,
    /// Deals by id; `null` in a patch marks a deleted deal.
    pub deals: Option<BTreeMap<String, Deal>>,
    /// Events by id; `null` in a patch marks a deleted event.
    pub events: Option<BTreeMap<String, Event>>,
    /// Caller-level error, e.g. `AccessDenied`.
    pub error_code: Option<String>,
    /// Extra error context.
    pub error_details: Option<BTreeMap<String, String>>,
}

//! OpenAPI document for the REST and streaming endpoints.

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::dto::{IdResponse, QueryResultDto, SignInRequest, SignInResponse};
use crate::api::handlers::{
    listings, messages, parties, session, subscription, system, transactions,
};
use crate::domain::records::{
    Deal, DealKind, DealStatus, Event, EventBody, EventKind, Listing, Org, OrgKind, User,
};
use crate::domain::{CollectionKind, QueryRequest};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI description of the gateway.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "marina-gateway",
        description = "Boat marketplace API with live query subscriptions over Server-Sent Events."
    ),
    paths(
        system::health_handler,
        system::collections_handler,
        system::options_handler,
        session::sign_in,
        session::sign_out,
        parties::query_orgs,
        parties::set_org,
        parties::query_users,
        parties::set_user,
        listings::query_listings,
        listings::set_listing,
        listings::remove_listing,
        transactions::query_deals,
        transactions::set_deal,
        messages::query_events,
        messages::set_event,
        messages::read_event,
        subscription::unsubscribe,
        crate::stream::handler::stream_handler,
    ),
    components(schemas(
        CollectionKind,
        QueryRequest,
        QueryResultDto,
        IdResponse,
        SignInRequest,
        SignInResponse,
        ErrorResponse,
        ErrorBody,
        Org,
        OrgKind,
        User,
        Listing,
        Deal,
        DealKind,
        DealStatus,
        Event,
        EventKind,
        EventBody,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "System", description = "Health and catalog"),
        (name = "Sessions", description = "Sign-in and sign-out"),
        (name = "Parties", description = "Orgs and users"),
        (name = "Listings", description = "Boats for rent or sale"),
        (name = "Deals", description = "Transactions on listings"),
        (name = "Events", description = "Messages, payments, reviews and notifications"),
        (name = "Subscriptions", description = "Live query results"),
    )
)]
pub struct ApiDoc;

#[derive(Debug)]
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

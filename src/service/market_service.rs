//! Market service: marketplace reads and writes.
//!
//! Every write follows the same pattern: check access → write the store →
//! publish an invalidation for the written collection. Reads are exposed as
//! [`QueryHandler`]s so the notification hub can store and re-run them for
//! subscriptions; each one populates exactly its own collection, even when
//! it answers with an error, so every result of one query has the same
//! shape.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::records::{Deal, Event, Listing, Org, Record, User};
use crate::domain::{
    CollectionKind, Identity, Invocation, MarketStore, Publication, PublicationBus, QueryHandler,
    QueryResponse, Snapshot,
};
use crate::error::GatewayError;

/// Query handlers for the five collections.
#[derive(Debug, Clone)]
pub struct MarketQueries {
    orgs: QueryHandler,
    users: QueryHandler,
    listings: QueryHandler,
    deals: QueryHandler,
    events: QueryHandler,
}

impl MarketQueries {
    fn new(store: &Arc<MarketStore>) -> Self {
        Self {
            orgs: handler(store, "orgs", query_orgs),
            users: handler(store, "users", query_users),
            listings: handler(store, "listings", query_listings),
            deals: handler(store, "deals", query_deals),
            events: handler(store, "events", query_events),
        }
    }

    /// Returns the handler answering queries on `kind`.
    #[must_use]
    pub const fn get(&self, kind: CollectionKind) -> &QueryHandler {
        match kind {
            CollectionKind::Org => &self.orgs,
            CollectionKind::User => &self.users,
            CollectionKind::Listing => &self.listings,
            CollectionKind::Deal => &self.deals,
            CollectionKind::Event => &self.events,
        }
    }
}

fn handler<F, Fut>(store: &Arc<MarketStore>, name: &'static str, query: F) -> QueryHandler
where
    F: Fn(Arc<MarketStore>, Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QueryResponse> + Send + 'static,
{
    let store = Arc::clone(store);
    QueryHandler::new(name, move |invocation| query(Arc::clone(&store), invocation))
}

/// Marketplace business layer.
#[derive(Debug, Clone)]
pub struct MarketService {
    store: Arc<MarketStore>,
    bus: PublicationBus,
    queries: MarketQueries,
}

impl MarketService {
    /// Creates a service over `store` publishing invalidations on `bus`.
    #[must_use]
    pub fn new(store: Arc<MarketStore>, bus: PublicationBus) -> Self {
        let queries = MarketQueries::new(&store);
        Self {
            store,
            bus,
            queries,
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<MarketStore> {
        &self.store
    }

    /// Returns the query handler for `kind`.
    #[must_use]
    pub const fn query(&self, kind: CollectionKind) -> &QueryHandler {
        self.queries.get(kind)
    }

    /// Returns a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RecordNotFound`] if the user does not exist.
    pub async fn user(&self, id: i64) -> Result<User, GatewayError> {
        self.store.users.get(id).await
    }

    /// Creates a new user on sign-up. The id is always assigned by the store.
    ///
    /// New users belong to no org; they join one by creating it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if `user` names an org.
    pub async fn register_user(&self, mut user: User) -> Result<User, GatewayError> {
        if let Some(org_id) = user.org_id {
            return Err(GatewayError::InvalidRequest(format!(
                "a new user cannot name org {org_id}"
            )));
        }
        user.id = 0;
        let user = self.store.users.upsert(user).await?;
        self.invalidate(CollectionKind::User);
        info!(user_id = user.id, "user registered");
        Ok(user)
    }

    /// Creates or updates an org. Only members may update an org.
    ///
    /// The creator of a new org joins it when they belong to no org yet; the
    /// membership applies to sessions signed in afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AccessDenied`] for anonymous callers and
    /// non-members, or [`GatewayError::RecordNotFound`] for an unknown id.
    pub async fn set_org(&self, identity: Identity, org: Org) -> Result<i64, GatewayError> {
        let caller = require_user(identity)?;
        let creating = org.id == 0;
        if !creating && identity.org_id != Some(org.id) {
            return Err(GatewayError::AccessDenied(format!("not a member of org {}", org.id)));
        }
        let stored = self.store.orgs.upsert(org).await?;
        self.invalidate(CollectionKind::Org);
        if creating && identity.org_id.is_none() {
            self.join_org(caller, stored.id).await;
        }
        Ok(stored.id)
    }

    async fn join_org(&self, user_id: i64, org_id: i64) {
        let Ok(user) = self.store.users.get(user_id).await else {
            return;
        };
        if user.org_id.is_some() {
            return;
        }
        if self
            .store
            .users
            .update(user_id, |u| u.org_id = Some(org_id))
            .await
            .is_ok()
        {
            self.invalidate(CollectionKind::User);
            info!(user_id, org_id, "user joined org");
        }
    }

    /// Updates the caller's own user record.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AccessDenied`] unless `user` is the caller and
    /// its `org_id` is empty or the caller's own org.
    pub async fn set_user(&self, identity: Identity, user: User) -> Result<i64, GatewayError> {
        let caller = require_user(identity)?;
        if user.id != caller {
            return Err(GatewayError::AccessDenied("users may only edit themselves".into()));
        }
        if let Some(org_id) = user.org_id
            && identity.org_id != Some(org_id)
        {
            return Err(GatewayError::AccessDenied(format!("cannot join org {org_id}")));
        }
        let stored = self.store.users.upsert(user).await?;
        self.invalidate(CollectionKind::User);
        Ok(stored.id)
    }

    /// Creates or updates a listing.
    ///
    /// A new listing is owned by the caller unless it names another owner,
    /// which only that owner's org members may do. The owner of an existing
    /// listing cannot change.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AccessDenied`] when the caller may not edit
    /// the listing, or [`GatewayError::RecordNotFound`] for an unknown id.
    pub async fn set_listing(
        &self,
        identity: Identity,
        mut listing: Listing,
    ) -> Result<i64, GatewayError> {
        let caller = require_user(identity)?;
        let unowned = listing.user_id.is_none() && listing.org_id.is_none();
        if listing.id == 0 {
            if unowned {
                listing.user_id = Some(caller);
                listing.org_id = identity.org_id;
            }
        } else {
            let existing = self.store.listings.get(listing.id).await?;
            ensure_editable(identity, &existing)?;
            if unowned {
                listing.user_id = existing.user_id;
                listing.org_id = existing.org_id;
            } else if (existing.user_id, existing.org_id) != (listing.user_id, listing.org_id) {
                return Err(GatewayError::AccessDenied("listing owner cannot change".into()));
            }
        }
        ensure_editable(identity, &listing)?;
        let stored = self.store.listings.upsert(listing).await?;
        self.invalidate(CollectionKind::Listing);
        Ok(stored.id)
    }

    /// Removes a listing.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AccessDenied`] when the caller does not own
    /// the listing, or [`GatewayError::RecordNotFound`] for an unknown id.
    pub async fn remove_listing(&self, identity: Identity, id: i64) -> Result<(), GatewayError> {
        require_user(identity)?;
        let existing = self.store.listings.get(id).await?;
        ensure_editable(identity, &existing)?;
        self.store.listings.remove(id).await?;
        self.invalidate(CollectionKind::Listing);
        info!(listing_id = id, "listing removed");
        Ok(())
    }

    /// Creates or updates a deal.
    ///
    /// A new deal names the caller as customer unless told otherwise. Either
    /// party (the customer or the listing owner) may update it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AccessDenied`] when the caller is not a party,
    /// or [`GatewayError::RecordNotFound`] for an unknown deal or listing.
    pub async fn set_deal(&self, identity: Identity, mut deal: Deal) -> Result<i64, GatewayError> {
        let caller = require_user(identity)?;
        let listing = self.store.listings.get(deal.listing_id).await?;
        if deal.id == 0 {
            if deal.user_id.is_none() && deal.org_id.is_none() {
                deal.user_id = Some(caller);
                deal.org_id = identity.org_id;
            }
        } else {
            let existing = self.store.deals.get(deal.id).await?;
            if !can_edit(identity, &existing) && !can_edit(identity, &listing) {
                return Err(GatewayError::AccessDenied(format!("not a party to deal {}", deal.id)));
            }
        }
        if !can_edit(identity, &deal) && !can_edit(identity, &listing) {
            return Err(GatewayError::AccessDenied("not a party to the deal".into()));
        }
        let stored = self.store.deals.upsert(deal).await?;
        self.invalidate(CollectionKind::Deal);
        Ok(stored.id)
    }

    /// Creates or updates an event.
    ///
    /// A new event is sent by the caller; its recipient defaults to the
    /// caller and starts out unread by the recipient when that is someone
    /// else. Only the sender or the owner may update an event.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AccessDenied`] when the caller is neither
    /// sender nor owner, or [`GatewayError::RecordNotFound`] for an unknown
    /// id.
    pub async fn set_event(&self, identity: Identity, mut event: Event) -> Result<i64, GatewayError> {
        let caller = require_user(identity)?;
        if event.id == 0 {
            event.from_user_id = Some(caller);
            let recipient = *event.user_id.get_or_insert(caller);
            if recipient != caller && !event.unread_by.contains(&recipient) {
                event.unread_by.push(recipient);
            }
        } else {
            let existing = self.store.events.get(event.id).await?;
            if !can_edit(identity, &existing) && existing.from_user_id != Some(caller) {
                return Err(GatewayError::AccessDenied(format!("cannot edit event {}", event.id)));
            }
        }
        let stored = self.store.events.upsert(event).await?;
        self.invalidate(CollectionKind::Event);
        Ok(stored.id)
    }

    /// Marks an event read by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AccessDenied`] when the event is not addressed
    /// to the caller, or [`GatewayError::RecordNotFound`] for an unknown id.
    pub async fn read_event(&self, identity: Identity, id: i64) -> Result<(), GatewayError> {
        let caller = require_user(identity)?;
        let existing = self.store.events.get(id).await?;
        let involved = existing.user_id == Some(caller)
            || existing.from_user_id == Some(caller)
            || existing.unread_by.contains(&caller);
        if !involved {
            return Err(GatewayError::AccessDenied(format!("event {id} is not addressed to you")));
        }
        if !existing.unread_by.contains(&caller) {
            return Ok(());
        }
        self.store
            .events
            .update(id, |event| event.unread_by.retain(|u| *u != caller))
            .await?;
        self.invalidate(CollectionKind::Event);
        Ok(())
    }

    fn invalidate(&self, kind: CollectionKind) {
        let outcome = self.bus.publish(Publication::Invalidate(kind));
        debug!(%kind, ?outcome, "invalidation published");
    }
}

fn require_user(identity: Identity) -> Result<i64, GatewayError> {
    identity
        .user_id
        .ok_or_else(|| GatewayError::AccessDenied("anonymous sessions cannot write".into()))
}

/// The caller owns the record, or belongs to the org that owns it.
fn can_edit<R: Record>(identity: Identity, record: &R) -> bool {
    let by_user = identity.user_id.is_some() && record.owner_user_id() == identity.user_id;
    let by_org = identity.org_id.is_some() && record.owner_org_id() == identity.org_id;
    by_user || by_org
}

fn ensure_editable<R: Record>(identity: Identity, record: &R) -> Result<(), GatewayError> {
    if can_edit(identity, record) {
        Ok(())
    } else {
        Err(GatewayError::AccessDenied(format!(
            "cannot edit {} record {}",
            R::KIND,
            record.id()
        )))
    }
}

/// Builds a subscribable response from `records`.
fn respond<R: Record>(records: &[R]) -> QueryResponse {
    match Snapshot::of_records(records) {
        Ok(snapshot) => QueryResponse::subscribable(snapshot),
        Err(err) => {
            warn!(kind = %R::KIND, error = %err, "query result not serializable");
            denied::<R>("InternalError")
        }
    }
}

/// An error response that still populates `R`'s collection.
fn denied<R: Record>(code: &str) -> QueryResponse {
    let mut response = QueryResponse::error(code);
    response.snapshot.populate(R::KIND);
    response
}

/// In-band `AccessDenied` for a filter naming another user or org.
fn foreign_scope<R: Record>(invocation: &Invocation) -> Option<QueryResponse> {
    let request = &invocation.request;
    let identity = invocation.identity;
    if let Some(user_id) = request.user_id
        && identity.user_id != Some(user_id)
    {
        return Some(denied::<R>("AccessDenied").with_detail("user_id", user_id.to_string()));
    }
    if let Some(org_id) = request.org_id
        && identity.org_id != Some(org_id)
    {
        return Some(denied::<R>("AccessDenied").with_detail("org_id", org_id.to_string()));
    }
    None
}

async fn query_orgs(store: Arc<MarketStore>, invocation: Invocation) -> QueryResponse {
    if let Some(response) = foreign_scope::<Org>(&invocation) {
        return response;
    }
    let Some(org_id) = invocation.request.org_id.or(invocation.identity.org_id) else {
        return respond::<Org>(&[]);
    };
    respond(&store.orgs.select(|o| o.id == org_id).await)
}

async fn query_users(store: Arc<MarketStore>, invocation: Invocation) -> QueryResponse {
    if let Some(response) = foreign_scope::<User>(&invocation) {
        return response;
    }
    let request = &invocation.request;
    let users = match (request.user_id, request.org_id, invocation.identity.user_id) {
        (Some(id), _, _) | (None, None, Some(id)) => store.users.select(|u| u.id == id).await,
        (None, Some(org_id), _) => store.users.select(|u| u.org_id == Some(org_id)).await,
        (None, None, None) => Vec::new(),
    };
    respond(&users)
}

async fn query_listings(store: Arc<MarketStore>, invocation: Invocation) -> QueryResponse {
    if let Some(response) = foreign_scope::<Listing>(&invocation) {
        return response;
    }
    let request = &invocation.request;
    let caller = invocation.identity.user_id;

    let listings = if let Some(id) = request.listing_id {
        store.listings.select(|l| l.id == id).await
    } else if let Some(org_id) = request.org_id {
        store.listings.select(|l| l.org_id == Some(org_id)).await
    } else if let Some(user_id) = caller {
        let favorites = store
            .users
            .get(user_id)
            .await
            .map(|u| u.favorites)
            .unwrap_or_default();
        store
            .listings
            .select(|l| l.user_id == Some(user_id) || favorites.contains(&l.id))
            .await
    } else {
        Vec::new()
    };
    respond(&listings)
}

async fn query_deals(store: Arc<MarketStore>, invocation: Invocation) -> QueryResponse {
    if let Some(response) = foreign_scope::<Deal>(&invocation) {
        return response;
    }
    let request = &invocation.request;
    let identity = invocation.identity;
    if identity.is_anonymous() {
        return respond::<Deal>(&[]);
    }
    let owned: Vec<i64> = store
        .listings
        .select(|l| can_edit(identity, l))
        .await
        .into_iter()
        .map(|l| l.id)
        .collect();
    let deals = store
        .deals
        .select(|d| {
            let in_scope = request.deal_id.is_none_or(|id| d.id == id)
                && request.listing_id.is_none_or(|id| d.listing_id == id);
            in_scope && (can_edit(identity, d) || owned.contains(&d.listing_id))
        })
        .await;
    respond(&deals)
}

async fn query_events(store: Arc<MarketStore>, invocation: Invocation) -> QueryResponse {
    if let Some(response) = foreign_scope::<Event>(&invocation) {
        return response;
    }
    let request = &invocation.request;
    let identity = invocation.identity;
    let Some(caller) = identity.user_id else {
        return respond::<Event>(&[]);
    };

    let events = store
        .events
        .select(|e| {
            let in_scope = request.event_id.is_none_or(|id| e.id == id)
                && request.deal_id.is_none_or(|id| e.deal_id == Some(id))
                && request.listing_id.is_none_or(|id| e.listing_id == Some(id));
            let involved = e.user_id == Some(caller)
                || e.from_user_id == Some(caller)
                || e.unread_by.contains(&caller)
                || identity.org_id.is_some_and(|org| e.org_id == Some(org));
            let kind_ok = request
                .event_kinds
                .as_ref()
                .is_none_or(|kinds| kinds.contains(&e.body.kind()));
            let unread_ok = !request.unread || e.unread_by.contains(&caller);
            in_scope && involved && kind_ok && unread_ok
        })
        .await;
    respond(&events)
}

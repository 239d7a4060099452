//! Session DTOs for sign-in.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::SessionId;
use crate::domain::records::User;

/// Request body for `POST /sessions`.
///
/// With `user_id` the session signs in as that existing user; with `user`
/// a new user is registered first. With neither, the session is anonymous.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SignInRequest {
    /// Existing user to sign in as.
    #[serde(default)]
    pub user_id: Option<i64>,
    /// New user to register and sign in as.
    #[serde(default)]
    pub user: Option<User>,
}

/// Response body for `POST /sessions` (201 Created).
#[derive(Debug, Serialize, ToSchema)]
pub struct SignInResponse {
    /// Session id.
    #[schema(value_type = u64)]
    pub session_id: SessionId,
    /// Bearer token for every later request.
    pub bearer: String,
    /// Signed-in user, absent for anonymous sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

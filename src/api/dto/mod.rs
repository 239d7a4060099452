//! Data Transfer Objects for REST request/response serialization.
//!
//! Record bodies are the domain record types themselves; the DTOs here
//! cover sessions, upsert results and the documented query result shape.

pub mod common_dto;
pub mod session_dto;

pub use common_dto::*;
pub use session_dto::*;

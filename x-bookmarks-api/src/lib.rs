//! Shared API types for x-bookmarks.
//!
//! These types are serde-only so that the dashboard front end (or any client
//! library) can reuse them without pulling in the server stack.

pub mod error;
pub mod requests;
pub mod responses;

pub use error::ErrorResponse;
pub use requests::*;
pub use responses::*;

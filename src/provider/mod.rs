pub mod client;
pub mod types;

pub use client::XApiClient;
pub use types::{ProviderError, TokenResponse, XUser};

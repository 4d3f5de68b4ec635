pub mod extractors;
pub mod jwt;
pub mod pkce;
pub mod refresh;
pub mod services;

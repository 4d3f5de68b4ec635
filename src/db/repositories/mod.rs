pub mod oauth_state_repository;
pub mod user_token_repository;

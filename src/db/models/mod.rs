pub mod oauth_state;
pub mod user_token;

diesel::table! {
    oauth_states (state) {
        state -> Text,
        code_verifier -> Text,
        created_at -> Timestamp,
        expires_at -> Timestamp,
    }
}

diesel::table! {
    user_tokens (user_id) {
        user_id -> Text,
        access_token -> Text,
        refresh_token -> Nullable<Text>,
        username -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(oauth_states, user_tokens,);

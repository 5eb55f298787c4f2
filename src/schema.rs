// Kept in sync by hand with repository::migrations::SCHEMA_SQL.

diesel::table! {
    sources (id) {
        id -> Integer,
        name -> Text,
        organization_type -> Text,
        prompt_key -> Text,
        url1 -> Text,
        url2 -> Nullable<Text>,
        description -> Text,
        data_format -> Text,
        area -> Nullable<Text>,
        content_hash -> Nullable<Text>,
        last_scraped_at -> Nullable<Text>,
        last_checked_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    trail_conditions (id) {
        id -> Integer,
        source_id -> Integer,
        url1 -> Text,
        trail_name -> Text,
        mountain_name_raw -> Text,
        title -> Text,
        description -> Text,
        reported_at -> Nullable<Text>,
        resolved_at -> Nullable<Text>,
        status -> Text,
        area -> Text,
        reference_url -> Text,
        comment -> Text,
        ai_model -> Text,
        prompt_file -> Text,
        ai_config -> Text,
        mountain_group_id -> Nullable<Integer>,
        disabled -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    llm_usage (id) {
        id -> Integer,
        source_id -> Integer,
        model -> Text,
        prompt_tokens -> BigInt,
        thinking_tokens -> BigInt,
        output_tokens -> BigInt,
        cost_usd -> Double,
        conditions_extracted -> Integer,
        success -> Bool,
        execution_time_seconds -> Double,
        created_at -> Text,
    }
}

diesel::joinable!(trail_conditions -> sources (source_id));
diesel::joinable!(llm_usage -> sources (source_id));

diesel::allow_tables_to_appear_in_same_query!(sources, trail_conditions, llm_usage,);

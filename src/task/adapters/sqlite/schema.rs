//! Diesel schema for task lifecycle persistence.

diesel::table! {
    /// In-flight tasks.
    tasks (id) {
        /// Insertion sequence; breaks ties on `created_at`.
        id -> BigInt,
        /// Public task identifier.
        task_id -> Text,
        /// Lowercase task type.
        task_type -> Text,
        /// Amount in base units.
        amount -> Text,
        /// Payout destination.
        receiver -> Text,
        /// Lifecycle status.
        status -> Text,
        /// Creation time in unix milliseconds.
        created_at -> BigInt,
        /// Last mutation time in unix milliseconds.
        updated_at -> BigInt,
        /// Queue operation reference.
        queue_tx_ref -> Nullable<Text>,
        /// Activating operation reference.
        activate_tx_ref -> Nullable<Text>,
        /// Redemption reference.
        redeem_tx_ref -> Nullable<Text>,
        /// JSON object captured at creation.
        metadata -> Text,
    }
}

diesel::table! {
    /// Archived terminal tasks.
    history (id) {
        /// Archival sequence.
        id -> BigInt,
        /// Public task identifier.
        task_id -> Text,
        /// Lowercase task type.
        task_type -> Text,
        /// Amount in base units.
        amount -> Text,
        /// Payout destination.
        receiver -> Text,
        /// Terminal status.
        status -> Text,
        /// Creation time in unix milliseconds.
        created_at -> BigInt,
        /// Last mutation time in unix milliseconds.
        updated_at -> BigInt,
        /// Queue operation reference.
        queue_tx_ref -> Nullable<Text>,
        /// Activating operation reference.
        activate_tx_ref -> Nullable<Text>,
        /// Redemption reference.
        redeem_tx_ref -> Nullable<Text>,
        /// JSON object captured at creation.
        metadata -> Text,
        /// Archival time in unix milliseconds.
        completed_at -> BigInt,
    }
}

diesel::table! {
    /// Append-only task event log.
    events (id) {
        /// Append sequence; breaks ties on `timestamp`.
        id -> BigInt,
        /// Owning task.
        task_id -> Text,
        /// Uppercase event tag.
        event_type -> Text,
        /// Append time in unix milliseconds.
        timestamp -> BigInt,
        /// JSON details.
        details -> Text,
    }
}

diesel::table! {
    /// Per-day running totals.
    statistics (id) {
        /// Row sequence.
        id -> BigInt,
        /// `YYYY-MM-DD` in UTC.
        stat_date -> Text,
        /// Completed boost amount in base units.
        total_boosted -> Text,
        /// Completed unboost amount in base units.
        total_unboosted -> Text,
        /// Completed redeem amount in base units.
        total_redeemed -> Text,
        /// Last change in unix milliseconds.
        updated_at -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(tasks, history, events, statistics);

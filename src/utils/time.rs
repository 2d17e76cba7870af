use chrono::{DateTime, Duration, Utc};

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Unix seconds, the resolution the throttle windows work in
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

pub fn expires_at(issued: DateTime<Utc>, ttl_secs: i64) -> DateTime<Utc> {
    issued + Duration::seconds(ttl_secs)
}

/// A deadline is spent once `now` reaches it
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at
}

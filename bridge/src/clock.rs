use chrono::{DateTime, FixedOffset, Utc};

/// Every timestamp the service emits carries this offset (America/Sao_Paulo,
/// no DST since 2019).
const UTC_MINUS_3_SECS: i32 = 3 * 3600;

pub fn offset() -> FixedOffset {
    FixedOffset::west_opt(UTC_MINUS_3_SECS).expect("static offset is in range")
}

/// Current instant in the service timezone.
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset())
}

/// ISO-8601 string with the -03:00 offset attached.
pub fn now_iso() -> String {
    now().to_rfc3339()
}

/// Returns current time in milliseconds since UNIX epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_millis() as u64
}

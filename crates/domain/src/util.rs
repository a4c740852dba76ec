use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::error::DomainError;

pub fn uuid_v7_without_dashes() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn format_ms_rfc3339(epoch_ms: i64) -> String {
    let fallback = OffsetDateTime::UNIX_EPOCH;
    let value =
        OffsetDateTime::from_unix_timestamp_nanos(epoch_ms as i128 * 1_000_000).unwrap_or(fallback);
    value
        .format(&Rfc3339)
        .unwrap_or("1970-01-01T00:00:00Z".to_string())
}

/// Human-readable application number, e.g. `GACP-2026-9F31A04C`.
pub fn application_number(epoch_ms: i64) -> String {
    let year = OffsetDateTime::from_unix_timestamp(epoch_ms / 1_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .year();
    let suffix: String = uuid_v7_without_dashes()
        .chars()
        .rev()
        .take(8)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("GACP-{year}-{suffix}")
}

pub fn audit_hash<T>(value: &T) -> crate::DomainResult<String>
where
    T: Serialize,
{
    let payload = serde_json::to_vec(value).map_err(|err| {
        DomainError::Validation(format!("failed to serialize audit payload: {err}"))
    })?;
    let digest = Sha256::digest(&payload);
    Ok(hex::encode(digest))
}

pub fn backoff_ms(base_ms: u64, attempt: u32, max_ms: u64) -> u64 {
    if attempt == 0 {
        return 0;
    }
    let pow = 2u64.saturating_pow(attempt.saturating_sub(1));
    let delay = base_ms.saturating_mul(pow);
    delay.min(max_ms)
}

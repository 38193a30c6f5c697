//! Serializes a `TimeDelta` as integer nanoseconds.

use chrono::TimeDelta;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
    // Durations beyond ~292 years have no nanosecond representation; clamp
    // rather than fail, matching 64-bit nanosecond wire semantics.
    let nanos = delta.num_nanoseconds().unwrap_or_else(|| {
        if *delta < TimeDelta::zero() {
            i64::MIN
        } else {
            i64::MAX
        }
    });
    serializer.serialize_i64(nanos)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
    let nanos = i64::deserialize(deserializer)?;
    Ok(TimeDelta::nanoseconds(nanos))
}

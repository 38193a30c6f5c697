//! Trace and span identifier generation.
//!
//! Identifiers are drawn from a cryptographically secure generator so they
//! are globally unique across services without coordination.

use rand::RngCore;

/// Creates a random 128-bit trace ID as a 32-character lowercase hex string.
pub fn new_trace_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Creates a random 64-bit span ID as a 16-character lowercase hex string.
pub fn new_span_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Whether `id` is a well-formed trace ID: exactly 32 hex characters.
///
/// Both hex cases are accepted on input; generated IDs are lowercase.
pub fn is_valid_trace_id(id: &str) -> bool {
    id.len() == 32 && is_hex(id)
}

/// Whether `id` is a well-formed span ID: exactly 16 hex characters.
pub fn is_valid_span_id(id: &str) -> bool {
    id.len() == 16 && is_hex(id)
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn trace_ids_are_well_formed() {
        let id = new_trace_id();
        assert_eq!(id.len(), 32);
        assert!(is_valid_trace_id(&id));
        assert!(id.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn span_ids_are_well_formed() {
        let id = new_span_id();
        assert_eq!(id.len(), 16);
        assert!(is_valid_span_id(&id));
    }

    #[test]
    fn validation_rejects_malformed_ids() {
        assert!(!is_valid_trace_id(""));
        assert!(!is_valid_trace_id("abc"));
        assert!(!is_valid_trace_id(&"g".repeat(32)));
        assert!(is_valid_trace_id(&"A".repeat(32)));

        assert!(!is_valid_span_id(""));
        assert!(!is_valid_span_id(&"a".repeat(32)));
        assert!(is_valid_span_id("0123456789abcdef"));
    }

    #[test]
    fn concurrent_generation_produces_no_duplicates() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..1000)
                        .map(|_| (new_trace_id(), new_span_id()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut trace_ids = HashSet::new();
        let mut span_ids = HashSet::new();
        for handle in handles {
            for (trace_id, span_id) in handle.join().unwrap() {
                assert!(trace_ids.insert(trace_id), "duplicate trace id");
                assert!(span_ids.insert(span_id), "duplicate span id");
            }
        }
        assert_eq!(trace_ids.len(), 8000);
        assert_eq!(span_ids.len(), 8000);
    }
}

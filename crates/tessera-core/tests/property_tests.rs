//! # Property-Based Tests
//!
//! Determinism and round-trip invariants of the codec, the object store
//! and the audit chain.

use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use serde_json::{Map, Value, json};
use tessera_core::{
    Actor, EventType, FactRecord, Frame, FrameType, ObjectId, Record, Token, Vault,
    canonical_json, canonicalize, decode, encode, export_record, import_frame,
    primitives::GENESIS_HASH,
};

// =============================================================================
// STRATEGIES
// =============================================================================

fn token() -> impl Strategy<Value = Token> {
    prop_oneof![
        "\\PC{1,12}".prop_map(Token::Word),
        vec(any::<u8>(), 0..24).prop_map(Token::Blob),
    ]
}

fn fact_frame() -> impl Strategy<Value = Frame> {
    (
        "\\PC{0,16}",
        "\\PC{0,16}",
        btree_map("X_[A-Z0-9_]{0,6}", "\\PC{0,16}", 0..4),
        vec(token(), 0..6),
    )
        .prop_map(|(fact_id, chunk, extra, payload)| {
            let mut headers = vec![
                ("FACT_ID".to_string(), fact_id),
                ("CONFIDENCE".to_string(), "0.5".to_string()),
                ("SOURCE_CHUNK_ID".to_string(), chunk),
            ];
            headers.extend(extra);
            Frame::new(FrameType::Fact, headers, payload).expect("valid frame")
        })
}

// =============================================================================
// CODEC PROPERTIES
// =============================================================================

proptest! {
    /// decode(encode(f)) == f for every valid frame.
    #[test]
    fn frame_roundtrip(frame in fact_frame()) {
        let wire = encode(&frame);
        let back = decode(&wire).expect("decode");
        prop_assert_eq!(back, frame);
    }

    /// Canonicalization is idempotent and fixes encoded frames.
    #[test]
    fn canonicalize_idempotent(frame in fact_frame()) {
        let wire = encode(&frame);
        let once = canonicalize(&wire).expect("canonicalize");
        let twice = canonicalize(once.as_str()).expect("canonicalize");
        prop_assert_eq!(once.as_str(), wire.as_str());
        prop_assert_eq!(once, twice);
    }

    /// Encoding is deterministic.
    #[test]
    fn encode_deterministic(frame in fact_frame()) {
        prop_assert_eq!(encode(&frame), encode(&frame.clone()));
    }

    /// Fact records survive export and import.
    #[test]
    fn fact_record_roundtrip(
        subject in "\\PC{1,12}",
        predicate in "\\PC{1,12}",
        object in "\\PC{1,12}",
    ) {
        let record = Record::Fact(FactRecord {
            fact_id: "f-1".to_string(),
            confidence: "1".to_string(),
            source_chunk_id: "c-1".to_string(),
            subject,
            predicate,
            object,
        });
        let wire = export_record(&record).expect("export");
        prop_assert_eq!(import_frame(&wire).expect("import"), record);
    }

    /// Canonical JSON ignores object insertion order.
    #[test]
    fn canonical_json_order_independent(entries in btree_map("[a-z]{1,6}", any::<i64>(), 0..8)) {
        let forward: Map<String, Value> =
            entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        let backward: Map<String, Value> =
            entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
        prop_assert_eq!(
            canonical_json(&Value::Object(forward)),
            canonical_json(&Value::Object(backward))
        );
    }
}

// =============================================================================
// STORAGE PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Content addressing: same bytes, same id, regardless of how often stored.
    #[test]
    fn object_put_is_content_addressed(bytes in vec(any::<u8>(), 0..256)) {
        let vault = Vault::in_memory().expect("vault");
        let store = vault.objects();
        let a = store.put(&bytes).expect("put");
        let b = store.put(&bytes).expect("put");
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.clone(), ObjectId::of(&bytes));
        prop_assert_eq!(store.get(&a).expect("get"), bytes);
        prop_assert!(store.verify(&a).expect("verify"));
        prop_assert_eq!(store.len().expect("len"), 1);
    }

    /// Every appended sequence forms a verifiable chain.
    #[test]
    fn appended_chain_verifies(values in vec(any::<u32>(), 1..12)) {
        let vault = Vault::in_memory().expect("vault");
        let ledger = vault.ledger();
        let actor = Actor::new("prop");

        let mut prev = GENESIS_HASH.to_string();
        for value in &values {
            let event = ledger
                .append("org", EventType::Evidence, &actor, json!({"v": value}), None)
                .expect("append");
            prop_assert_eq!(&event.prev_hash, &prev);
            prev = event.event_hash;
        }

        let report = ledger.verify_chain("org").expect("verify");
        prop_assert_eq!(report.events, values.len() as u64);
        prop_assert_eq!(report.head, prev);
    }
}

//! # Validation Tier Tests (T0-T4)
//!
//! If ANY tier fails, the vault is INVALID.
//!
//! ## Tiers
//! - T0: Frame Codec
//! - T1: Object Integrity
//! - T2: Audit Chain Integrity
//! - T3: Tool Approval Flow
//! - T4: Model Admission Ceilings

#![allow(clippy::unwrap_used, clippy::panic)]

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tessera_core::{
    Actor, ApprovalStatus, Ceiling, EventType, ManualClock, ModelPolicy, ObjectId,
    ReviewDecision, Role, TesseraError, Timestamp, ToolAdmission, ToolMode, ToolPolicy,
    ToolRequest, Vault, Violation,
};

/// Rewrite a row of a vault file with raw redb, as an attacker with disk
/// access would.
fn tamper<K, F>(path: &Path, table: redb::TableDefinition<K, &[u8]>, edit: F)
where
    K: redb::Key + 'static,
    F: FnOnce(&mut redb::Table<K, &[u8]>),
{
    let db = redb::Database::create(path).expect("open raw");
    let txn = db.begin_write().expect("txn");
    {
        let mut t = txn.open_table(table).expect("table");
        edit(&mut t);
    }
    txn.commit().expect("commit");
}

// =============================================================================
// TIER T0: FRAME CODEC
// =============================================================================

mod t0_frame_codec {
    use tessera_core::{
        FrameType, Record, SummaryRecord, TesseraError, Token, canonicalize, decode,
        export_record, import_frame,
    };

    /// T0.1: Headers are sorted and TYPE is one of them.
    #[test]
    fn headers_sorted_on_encode() {
        let record = Record::Summary(SummaryRecord {
            summary_id: "s-1".to_string(),
            convo_id: "c-1".to_string(),
            created_at: "2024-01-01".to_string(),
            text: "hi".to_string(),
        });
        let wire = export_record(&record).expect("export");
        assert_eq!(
            wire,
            "{CONVO_ID c-1;CREATED_AT 2024-01-01;SUMMARY_ID s-1;TYPE SUMMARY|*aGk}"
        );
    }

    /// T0.2: Unsorted input canonicalizes to sorted output.
    #[test]
    fn canonicalize_normalizes_order() {
        let raw = "  {TYPE FACT;SOURCE_CHUNK_ID c;FACT_ID f;CONFIDENCE 0.9|a;b;c}\n";
        let canonical = canonicalize(raw).expect("canonicalize");
        assert_eq!(
            canonical.as_str(),
            "{CONFIDENCE 0.9;FACT_ID f;SOURCE_CHUNK_ID c;TYPE FACT|a;b;c}"
        );
    }

    /// T0.3: Escaped delimiters survive inside words.
    #[test]
    fn escaped_delimiters_roundtrip() {
        let wire = "{CONFIDENCE 1;FACT_ID f\\;1;SOURCE_CHUNK_ID c|a\\|b;\\{x\\};\\*y}";
        let frame = decode(wire).expect("decode");
        assert_eq!(frame.frame_type(), FrameType::Fact);
        assert_eq!(frame.header("FACT_ID"), Some("f;1"));
        assert_eq!(
            frame.payload(),
            &[
                Token::word("a|b"),
                Token::word("{x}"),
                Token::word("*y")
            ]
        );
    }

    /// T0.4: Structural damage is a parse error.
    #[test]
    fn malformed_frames_are_parse_errors() {
        for bad in [
            "",
            "{TYPE FACT",
            "{TYPE FACT|a;b;c",
            "TYPE FACT|a}",
            "{TYPE FACT|a;b;c}x",
            "{TYPE FACT|a;;c}",
            "{TYPE FACT|a\\qb}",
            "{TYPE SUMMARY|*!!}",
            "{TYPE FACT;TYPE FACT|a}",
            "{type FACT|a}",
        ] {
            assert!(
                matches!(decode(bad), Err(TesseraError::Parse { .. })),
                "expected parse error for {:?}",
                bad
            );
        }
    }

    /// T0.5: Well-formed but invalid records are schema errors.
    #[test]
    fn schema_violations_are_schema_errors() {
        for bad in [
            "{TYPE NOTE|a}",
            "{FACT_ID f;TYPE FACT|a;b;c}",
            "{CONFIDENCE 7;FACT_ID f;SOURCE_CHUNK_ID c;TYPE FACT|a;b;c}",
            "{CREATED_AT t;SOURCE s;TYPE TRAIN_PAIR|*aGk}",
        ] {
            assert!(
                matches!(import_frame(bad), Err(TesseraError::Schema(_))),
                "expected schema error for {:?}",
                bad
            );
        }
    }
}

// =============================================================================
// TIER T1: OBJECT INTEGRITY
// =============================================================================

mod t1_object_integrity {
    use super::*;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    /// T1.1: Known content hash.
    #[test]
    fn hello_has_known_id() {
        let vault = Vault::in_memory().expect("vault");
        let id = vault.objects().put(b"hello").expect("put");
        assert_eq!(id.as_str(), HELLO);
        assert_eq!(vault.objects().get(&id).expect("get"), b"hello");
        assert!(vault.objects().verify(&id).expect("verify"));
    }

    /// T1.2: Out-of-band corruption on disk is detected.
    #[test]
    fn disk_corruption_detected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vault.redb");
        let id = {
            let vault = Vault::open(&path).expect("open");
            vault.objects().put(b"hello").expect("put")
        };

        let objects: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("objects");
        tamper(&path, objects, |t| {
            t.insert(HELLO, b"jello".as_slice()).expect("overwrite");
        });

        let vault = Vault::open(&path).expect("reopen");
        assert!(!vault.objects().verify(&id).expect("verify"));
        match vault.objects().check(&id) {
            Err(TesseraError::Corruption { id: bad, actual }) => {
                assert_eq!(bad, id);
                assert_eq!(actual, ObjectId::of(b"jello").as_str());
            }
            other => panic!("expected Corruption, got {:?}", other),
        }
    }

    /// T1.3: Deleting leaves a tombstone and get fails.
    #[test]
    fn tombstoned_object_is_gone() {
        let vault = Vault::in_memory().expect("vault");
        let id = vault.objects().put(b"bye").expect("put");
        assert!(vault.objects().delete(&id).expect("delete"));
        assert!(matches!(
            vault.objects().get(&id),
            Err(TesseraError::NotFound(_))
        ));
        assert!(vault.objects().tombstone(&id).expect("tombstone").is_some());
        assert_eq!(vault.stats().expect("stats").tombstones, 1);
    }
}

// =============================================================================
// TIER T2: AUDIT CHAIN INTEGRITY
// =============================================================================

mod t2_audit_chain {
    use super::*;

    /// T2.1 / T2.2: Events link, and on-disk payload tampering is reported
    /// at the tampered event.
    #[test]
    fn tamper_reported_at_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vault.redb");
        let actor = Actor::new("agent");

        let (e1, e2, e3) = {
            let vault = Vault::open(&path).expect("open");
            let ledger = vault.ledger();
            let e1 = ledger
                .append("acme", EventType::Request, &actor, json!({"q": "a"}), None)
                .expect("e1");
            let e2 = ledger
                .append("acme", EventType::Model, &actor, json!({"tokens": 10}), None)
                .expect("e2");
            let e3 = ledger
                .append("acme", EventType::Response, &actor, json!({"ok": true}), None)
                .expect("e3");
            (e1, e2, e3)
        };
        assert_eq!(e2.prev_hash, e1.event_hash);
        assert_eq!(e3.prev_hash, e2.event_hash);

        let mut forged = e2.clone();
        forged.payload = json!({"tokens": 1});
        let row = serde_json::to_vec(&forged).expect("json");
        let events: redb::TableDefinition<(&str, u64), &[u8]> =
            redb::TableDefinition::new("audit_events");
        tamper(&path, events, |t| {
            t.insert(("acme", e2.seq), row.as_slice()).expect("overwrite");
        });

        let vault = Vault::open(&path).expect("reopen");
        match vault.ledger().verify_chain("acme") {
            Err(TesseraError::ChainBroken { event_id, .. }) => assert_eq!(event_id, e2.id),
            other => panic!("expected ChainBroken, got {:?}", other),
        }
    }

    /// T2.3: Chains are per org.
    #[test]
    fn org_chains_are_independent() {
        let vault = Vault::in_memory().expect("vault");
        let actor = Actor::new("agent");
        for org in ["a", "b", "a"] {
            vault
                .ledger()
                .append(org, EventType::Auth, &actor, json!({}), None)
                .expect("append");
        }
        assert_eq!(vault.ledger().verify_chain("a").expect("a").events, 2);
        assert_eq!(vault.ledger().verify_chain("b").expect("b").events, 1);
    }
}

// =============================================================================
// TIER T3: TOOL APPROVAL FLOW
// =============================================================================

mod t3_tool_approval {
    use super::*;

    fn pending(vault: &Vault, tool: &str) -> tessera_core::ToolApproval {
        let request = ToolRequest::new("acme", tool, json!({}), Actor::new("agent"));
        match vault.tools().admit_tool(&request).expect("admit") {
            ToolAdmission::PendingApproval(a) => a,
            other => panic!("expected pending approval, got {:?}", other),
        }
    }

    /// T3.1: Deny never creates approvals.
    #[test]
    fn deny_creates_no_approval() {
        let vault = Vault::in_memory().expect("vault");
        let admin = Actor::new("admin");
        vault
            .tools()
            .set_policy(&ToolPolicy::new("acme", "rm", ToolMode::Deny), &admin)
            .expect("policy");

        let request = ToolRequest::new("acme", "rm", json!({"path": "/"}), Actor::new("agent"));
        assert!(matches!(
            vault.tools().admit_tool(&request),
            Err(TesseraError::PolicyViolation(Violation::ToolDenied { .. }))
        ));
        assert_eq!(vault.stats().expect("stats").tool_approvals, 0);

        let last = vault.ledger().events("acme").expect("events");
        assert_eq!(last.last().map(|e| e.event_type), Some(EventType::Tool));
    }

    /// T3.2: Double review raises an approval state error.
    #[test]
    fn double_review_rejected() {
        let vault = Vault::in_memory().expect("vault");
        let policy =
            ToolPolicy::new("acme", "deploy", ToolMode::Approve).with_roles([Role::new("ops")]);
        vault
            .tools()
            .set_policy(&policy, &Actor::new("admin"))
            .expect("policy");

        let approval = pending(&vault, "deploy");
        let ops = [Role::new("ops")];
        vault
            .tools()
            .review(approval.id, &Actor::new("r1"), &ops, ReviewDecision::Deny)
            .expect("first review");
        match vault
            .tools()
            .review(approval.id, &Actor::new("r2"), &ops, ReviewDecision::Approve)
        {
            Err(TesseraError::ApprovalState { id, status }) => {
                assert_eq!(id, approval.id);
                assert_eq!(status, ApprovalStatus::Denied);
            }
            other => panic!("expected ApprovalState, got {:?}", other),
        }
        vault.ledger().verify_chain("acme").expect("chain");
    }
}

// =============================================================================
// TIER T4: MODEL ADMISSION CEILINGS
// =============================================================================

mod t4_model_admission {
    use super::*;

    /// T4.1: The 6th admit after 5 failures is cooled down.
    #[test]
    fn cooldown_after_five_failures() {
        let start = Timestamp(1_000_000);
        let clock = Arc::new(ManualClock::new(start));
        let vault = Vault::in_memory_with_clock(clock.clone()).expect("vault");
        let actor = Actor::new("agent");

        let mut policy = ModelPolicy::new("acme", "openai", "gpt");
        policy.max_failures = Some(5);
        policy.cooldown_seconds = 120;
        vault.models().set_policy(&policy, &actor).expect("policy");

        for _ in 0..5 {
            let ticket = vault
                .models()
                .admit("acme", "openai", "gpt", 100, 10, &actor)
                .expect("admit");
            vault
                .models()
                .record_failure(ticket, "503")
                .expect("failure");
        }

        match vault.models().admit("acme", "openai", "gpt", 100, 10, &actor) {
            Err(TesseraError::CooldownActive { until }) => {
                assert_eq!(until, start.plus_secs(120));
            }
            other => panic!("expected CooldownActive, got {:?}", other),
        }

        clock.advance_secs(120);
        let _ticket = vault
            .models()
            .admit("acme", "openai", "gpt", 100, 10, &actor)
            .expect("admitted after cooldown");
    }

    /// T4.2: Per-request cost ceiling is a budget refusal.
    #[test]
    fn cost_per_request_refused() {
        let vault = Vault::in_memory().expect("vault");
        let actor = Actor::new("agent");
        let mut policy = ModelPolicy::new("acme", "openai", "gpt");
        policy.max_cost_per_request = Some(50_000);
        vault.models().set_policy(&policy, &actor).expect("policy");

        let result = vault
            .models()
            .admit("acme", "openai", "gpt", 10, 50_001, &actor);
        assert!(matches!(
            result,
            Err(TesseraError::BudgetExceeded(Ceiling::CostPerRequest {
                limit: 50_000,
                attempted: 50_001
            }))
        ));
    }
}

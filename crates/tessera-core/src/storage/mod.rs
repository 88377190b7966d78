//! # Storage
//!
//! The durable layer under every component: a single redb database
//! wrapped by `Vault`.

mod vault;

pub use vault::{Vault, VaultStats};

pub(crate) use vault::{
    AUDIT_BY_HASH, AUDIT_BY_ID, AUDIT_EVENTS, AUDIT_HEADS, MODEL_POLICIES, MODEL_USAGE,
    NEXT_APPROVAL_ID, NEXT_EVENT_ID, NEXT_TICKET_ID, OBJECT_META, OBJECTS, TOMBSTONES,
    TOOL_APPROVALS, TOOL_POLICIES, next_id,
};

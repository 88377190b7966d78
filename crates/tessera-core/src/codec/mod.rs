//! # Frame Codec
//!
//! Deterministic, side-effect free conversion between records and the
//! canonical textual wire form.
//!
//! - `frame`: the `Frame` type and `encode`/`decode`
//! - `canonical`: `canonicalize` for frame text, `canonical_json` for payloads
//! - `record`: typed records and `export_record`/`import_frame`

pub mod canonical;
pub mod frame;
pub mod record;

pub use canonical::{CanonicalForm, canonical_json, canonicalize};
pub use frame::{Frame, FrameType, Token, decode, encode};
pub use record::{
    FactRecord, Record, SummaryRecord, TrainPairRecord, export_record, import_frame,
};

//! # Typed Records
//!
//! The three record kinds exchanged with agent runtimes, and their mapping
//! to frames. `export_record` and `import_frame` are the library surface
//! used by external collaborators.

use super::frame::{Frame, FrameType, Token, decode, encode};
use crate::TesseraError;
use serde::{Deserialize, Serialize};

/// A conversation summary. Carried as one UTF-8 blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub summary_id: String,
    pub convo_id: String,
    pub created_at: String,
    pub text: String,
}

/// A subject-predicate-object fact extracted from a source chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRecord {
    pub fact_id: String,
    /// Decimal in `[0, 1]`, kept as text (e.g. `"0.85"`).
    pub confidence: String,
    pub source_chunk_id: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// An instruction/completion pair for training export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainPairRecord {
    pub created_at: String,
    pub source: String,
    pub instruction: String,
    pub completion: String,
}

/// Any record that can be framed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Record {
    Summary(SummaryRecord),
    Fact(FactRecord),
    TrainPair(TrainPairRecord),
}

impl Record {
    /// The frame type this record maps to.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Record::Summary(_) => FrameType::Summary,
            Record::Fact(_) => FrameType::Fact,
            Record::TrainPair(_) => FrameType::TrainPair,
        }
    }

    /// Build the frame for this record.
    ///
    /// # Errors
    ///
    /// `TesseraError::Schema` if a fact has an empty word or a confidence
    /// outside `[0, 1]`.
    pub fn to_frame(&self) -> Result<Frame, TesseraError> {
        match self {
            Record::Summary(r) => Frame::new(
                FrameType::Summary,
                [
                    ("SUMMARY_ID", r.summary_id.as_str()),
                    ("CONVO_ID", r.convo_id.as_str()),
                    ("CREATED_AT", r.created_at.as_str()),
                ],
                vec![Token::blob(r.text.as_bytes())],
            ),
            Record::Fact(r) => {
                validate_confidence(&r.confidence)?;
                Frame::new(
                    FrameType::Fact,
                    [
                        ("FACT_ID", r.fact_id.as_str()),
                        ("CONFIDENCE", r.confidence.as_str()),
                        ("SOURCE_CHUNK_ID", r.source_chunk_id.as_str()),
                    ],
                    vec![
                        Token::word(r.subject.as_str()),
                        Token::word(r.predicate.as_str()),
                        Token::word(r.object.as_str()),
                    ],
                )
            }
            Record::TrainPair(r) => Frame::new(
                FrameType::TrainPair,
                [
                    ("CREATED_AT", r.created_at.as_str()),
                    ("SOURCE", r.source.as_str()),
                ],
                vec![
                    Token::blob(r.instruction.as_bytes()),
                    Token::blob(r.completion.as_bytes()),
                ],
            ),
        }
    }

    /// Read a record back out of a frame.
    ///
    /// # Errors
    ///
    /// `TesseraError::Schema` if the payload does not have the shape the
    /// frame type requires, or a blob is not UTF-8.
    pub fn from_frame(frame: &Frame) -> Result<Self, TesseraError> {
        let header = |key: &str| -> Result<String, TesseraError> {
            frame.header(key).map(str::to_string).ok_or_else(|| {
                TesseraError::Schema(format!("{} frame is missing {}", frame.frame_type(), key))
            })
        };

        match frame.frame_type() {
            FrameType::Summary => {
                let [text] = blobs::<1>(frame)?;
                Ok(Record::Summary(SummaryRecord {
                    summary_id: header("SUMMARY_ID")?,
                    convo_id: header("CONVO_ID")?,
                    created_at: header("CREATED_AT")?,
                    text,
                }))
            }
            FrameType::Fact => {
                let confidence = header("CONFIDENCE")?;
                validate_confidence(&confidence)?;
                let [subject, predicate, object] = words::<3>(frame)?;
                Ok(Record::Fact(FactRecord {
                    fact_id: header("FACT_ID")?,
                    confidence,
                    source_chunk_id: header("SOURCE_CHUNK_ID")?,
                    subject,
                    predicate,
                    object,
                }))
            }
            FrameType::TrainPair => {
                let [instruction, completion] = blobs::<2>(frame)?;
                Ok(Record::TrainPair(TrainPairRecord {
                    created_at: header("CREATED_AT")?,
                    source: header("SOURCE")?,
                    instruction,
                    completion,
                }))
            }
        }
    }
}

/// Encode a record to its canonical frame string.
///
/// Fails with `Schema` for records `import_frame` could not read back,
/// including any whose frame would exceed `MAX_FRAME_LENGTH`.
pub fn export_record(record: &Record) -> Result<String, TesseraError> {
    Ok(encode(&record.to_frame()?))
}

/// Decode a frame string into a record.
pub fn import_frame(frame: &str) -> Result<Record, TesseraError> {
    Record::from_frame(&decode(frame)?)
}

// =============================================================================
// PAYLOAD SHAPES
// =============================================================================

fn shape_error(frame: &Frame, expected: &str) -> TesseraError {
    TesseraError::Schema(format!(
        "{} frame payload must be {}",
        frame.frame_type(),
        expected
    ))
}

fn words<const N: usize>(frame: &Frame) -> Result<[String; N], TesseraError> {
    let expected = format!("{} word tokens", N);
    let texts: Vec<String> = frame
        .payload()
        .iter()
        .map(|t| match t {
            Token::Word(w) => Ok(w.clone()),
            Token::Blob(_) => Err(shape_error(frame, &expected)),
        })
        .collect::<Result<_, _>>()?;
    texts
        .try_into()
        .map_err(|_: Vec<String>| shape_error(frame, &expected))
}

fn blobs<const N: usize>(frame: &Frame) -> Result<[String; N], TesseraError> {
    let expected = format!("{} UTF-8 blob tokens", N);
    let texts: Vec<String> = frame
        .payload()
        .iter()
        .map(|t| match t {
            Token::Blob(bytes) => {
                String::from_utf8(bytes.clone()).map_err(|_| shape_error(frame, &expected))
            }
            Token::Word(_) => Err(shape_error(frame, &expected)),
        })
        .collect::<Result<_, _>>()?;
    texts
        .try_into()
        .map_err(|_: Vec<String>| shape_error(frame, &expected))
}

/// Accepts `0`, `1`, `0.<digits>` and `1.<zeros>`.
fn validate_confidence(s: &str) -> Result<(), TesseraError> {
    let (int, frac) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    let digits = frac.is_none_or(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()));
    let in_range = match int {
        "0" => true,
        "1" => frac.is_none_or(|f| f.bytes().all(|b| b == b'0')),
        _ => false,
    };
    if digits && in_range {
        Ok(())
    } else {
        Err(TesseraError::Schema(format!(
            "confidence '{}' is not a decimal in [0, 1]",
            s
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact() -> Record {
        Record::Fact(FactRecord {
            fact_id: "f-42".to_string(),
            confidence: "0.75".to_string(),
            source_chunk_id: "chunk-3".to_string(),
            subject: "Ada Lovelace".to_string(),
            predicate: "wrote".to_string(),
            object: "Note G; the first program".to_string(),
        })
    }

    #[test]
    fn fact_export_is_canonical() {
        let wire = export_record(&fact()).expect("export");
        assert_eq!(
            wire,
            "{CONFIDENCE 0.75;FACT_ID f-42;SOURCE_CHUNK_ID chunk-3;TYPE FACT|Ada Lovelace;wrote;Note G\\; the first program}"
        );
    }

    #[test]
    fn records_roundtrip() {
        let records = [
            fact(),
            Record::Summary(SummaryRecord {
                summary_id: "s-1".to_string(),
                convo_id: "c-9".to_string(),
                created_at: "2024-05-01T12:00:00Z".to_string(),
                text: "User asked about {braces} | pipes; and *stars*.\nDone.".to_string(),
            }),
            Record::TrainPair(TrainPairRecord {
                created_at: "2024-05-01T12:00:00Z".to_string(),
                source: "convo:c-9".to_string(),
                instruction: "Summarize.".to_string(),
                completion: String::new(),
            }),
        ];
        for record in records {
            let wire = export_record(&record).expect("export");
            assert_eq!(import_frame(&wire).expect("import"), record);
        }
    }

    #[test]
    fn summary_text_travels_as_blob() {
        let record = Record::Summary(SummaryRecord {
            summary_id: "s".to_string(),
            convo_id: "c".to_string(),
            created_at: "t".to_string(),
            text: "hi".to_string(),
        });
        let wire = export_record(&record).expect("export");
        assert!(wire.ends_with("|*aGk}"));
    }

    #[test]
    fn oversized_record_is_refused_on_export() {
        // Base64 grows the text by a third, past the frame limit.
        let text = "x".repeat(crate::primitives::MAX_FRAME_LENGTH / 4 * 3 + 3);
        let record = Record::Summary(SummaryRecord {
            summary_id: "s".to_string(),
            convo_id: "c".to_string(),
            created_at: "t".to_string(),
            text,
        });
        assert!(matches!(
            export_record(&record),
            Err(TesseraError::Schema(_))
        ));
    }

    #[test]
    fn fact_with_wrong_token_count_is_schema_error() {
        let wire = "{CONFIDENCE 1;FACT_ID f;SOURCE_CHUNK_ID c;TYPE FACT|a;b}";
        assert!(matches!(import_frame(wire), Err(TesseraError::Schema(_))));
    }

    #[test]
    fn fact_with_blob_is_schema_error() {
        let wire = "{CONFIDENCE 1;FACT_ID f;SOURCE_CHUNK_ID c;TYPE FACT|a;b;*aGk}";
        assert!(matches!(import_frame(wire), Err(TesseraError::Schema(_))));
    }

    #[test]
    fn summary_with_non_utf8_blob_is_schema_error() {
        // 0xFF 0xFE
        let wire = "{CONVO_ID c;CREATED_AT t;SUMMARY_ID s;TYPE SUMMARY|*__4}";
        assert!(matches!(import_frame(wire), Err(TesseraError::Schema(_))));
    }

    #[test]
    fn confidence_validation() {
        for ok in ["0", "1", "0.5", "0.000", "1.0", "1.000"] {
            assert!(validate_confidence(ok).is_ok(), "{}", ok);
        }
        for bad in ["", "2", "1.5", "0.", ".5", "-0.1", "0.5e1", "01"] {
            assert!(validate_confidence(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn record_json_uses_type_tag() {
        let json = serde_json::to_value(fact()).expect("json");
        assert_eq!(json["type"], "FACT");
        let back: Record = serde_json::from_value(json).expect("back");
        assert_eq!(back, fact());
    }
}

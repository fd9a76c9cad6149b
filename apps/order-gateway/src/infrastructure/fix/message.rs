//! FIX Message Representation
//!
//! A decoded frame is an ordered list of `tag=value` fields. Order matters:
//! repeating groups are defined by position, so the representation never
//! collapses fields into a map.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::tags;

/// One `tag=value` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Tag number.
    pub tag: u32,
    /// Raw value.
    pub value: String,
}

impl Field {
    /// Create a field.
    #[must_use]
    pub fn new(tag: u32, value: impl Into<String>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }
}

/// A FIX message between `BodyLength(9)` and `CheckSum(10)`, fields in wire
/// order. `BeginString(8)` is kept alongside; length and checksum are
/// recomputed at encode time and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixMessage {
    /// Protocol version from tag 8.
    pub begin_string: String,
    /// All fields in wire order, starting with `MsgType(35)`.
    pub fields: Vec<Field>,
}

impl FixMessage {
    /// Start a message of the given type.
    #[must_use]
    pub fn new(msg_type: &str) -> Self {
        Self {
            begin_string: super::BEGIN_STRING.to_string(),
            fields: vec![Field::new(tags::MSG_TYPE, msg_type)],
        }
    }

    /// Append a field.
    pub fn push(&mut self, tag: u32, value: impl Into<String>) {
        self.fields.push(Field::new(tag, value));
    }

    /// Builder-style append.
    #[must_use]
    pub fn with(mut self, tag: u32, value: impl Into<String>) -> Self {
        self.push(tag, value);
        self
    }

    /// The message type, when present.
    #[must_use]
    pub fn msg_type(&self) -> Option<&str> {
        self.get(tags::MSG_TYPE)
    }

    /// First value carried under `tag`.
    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.value.as_str())
    }

    /// First value under `tag`, parsed.
    #[must_use]
    pub fn get_parsed<T: FromStr>(&self, tag: u32) -> Option<T> {
        self.get(tag).and_then(|v| v.parse().ok())
    }

    /// Every value carried under `tag`, in wire order.
    pub fn get_all(&self, tag: u32) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(move |f| f.tag == tag)
            .map(|f| f.value.as_str())
    }

    /// Index of the first field carrying `tag`.
    #[must_use]
    pub fn position(&self, tag: u32) -> Option<usize> {
        self.fields.iter().position(|f| f.tag == tag)
    }
}

/// Errors extracting the standard header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// A required header field is absent.
    #[error("missing header field {0}")]
    Missing(u32),

    /// A header field carries an unparseable value.
    #[error("invalid header field {tag}: {value}")]
    Invalid {
        /// Offending tag.
        tag: u32,
        /// Offending value.
        value: String,
    },
}

/// The standard header fields the session layer works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixHeader {
    /// MsgType(35).
    pub msg_type: String,
    /// SenderCompID(49).
    pub sender_comp_id: String,
    /// TargetCompID(56).
    pub target_comp_id: String,
    /// MsgSeqNum(34).
    pub msg_seq_num: u64,
    /// SendingTime(52); lenient on inbound, always stamped on outbound.
    pub sending_time: Option<DateTime<Utc>>,
}

impl FixHeader {
    /// Extract the header from a decoded message.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] when 35, 49, 56, or 34 is absent or 34/52 does
    /// not parse. A header fault is a session-level reject, not a malformed
    /// frame.
    pub fn parse(message: &FixMessage) -> Result<Self, HeaderError> {
        let required = |tag: u32| -> Result<&str, HeaderError> {
            message.get(tag).ok_or(HeaderError::Missing(tag))
        };
        let msg_type = required(tags::MSG_TYPE)?.to_string();
        let sender_comp_id = required(tags::SENDER_COMP_ID)?.to_string();
        let target_comp_id = required(tags::TARGET_COMP_ID)?.to_string();
        let seq_raw = required(tags::MSG_SEQ_NUM)?;
        let msg_seq_num = seq_raw.parse().map_err(|_| HeaderError::Invalid {
            tag: tags::MSG_SEQ_NUM,
            value: seq_raw.to_string(),
        })?;
        let sending_time = match message.get(tags::SENDING_TIME) {
            None => None,
            Some(raw) => Some(parse_sending_time(raw).ok_or_else(|| HeaderError::Invalid {
                tag: tags::SENDING_TIME,
                value: raw.to_string(),
            })?),
        };
        Ok(Self {
            msg_type,
            sender_comp_id,
            target_comp_id,
            msg_seq_num,
            sending_time,
        })
    }
}

/// Format a UTC timestamp as FIX SendingTime with microsecond precision.
#[must_use]
pub fn format_sending_time(time: DateTime<Utc>) -> String {
    time.format("%Y%m%d-%H:%M:%S%.6f").to_string()
}

/// Parse a FIX timestamp, accepting micro-, milli-, and whole-second
/// precision.
#[must_use]
pub fn parse_sending_time(raw: &str) -> Option<DateTime<Utc>> {
    for format in ["%Y%m%d-%H:%M:%S%.6f", "%Y%m%d-%H:%M:%S%.3f", "%Y%m%d-%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_message() -> FixMessage {
        FixMessage::new("D")
            .with(tags::SENDER_COMP_ID, "test")
            .with(tags::TARGET_COMP_ID, "proxy")
            .with(tags::MSG_SEQ_NUM, "7")
            .with(tags::SENDING_TIME, "20230928-16:42:00.000001")
            .with(tags::CL_ORD_ID, "clordid1")
            .with(tags::SYMBOL, "BTC-PERPETUAL")
    }

    #[test]
    fn get_and_get_all() {
        let mut message = make_message();
        message.push(tags::MD_ENTRY_TYPE, "0");
        message.push(tags::MD_ENTRY_TYPE, "1");

        assert_eq!(message.get(tags::CL_ORD_ID), Some("clordid1"));
        assert_eq!(message.get_parsed::<u64>(tags::MSG_SEQ_NUM), Some(7));
        let entries: Vec<&str> = message.get_all(tags::MD_ENTRY_TYPE).collect();
        assert_eq!(entries, vec!["0", "1"]);
    }

    #[test]
    fn header_parses() {
        let header = FixHeader::parse(&make_message()).unwrap();
        assert_eq!(header.msg_type, "D");
        assert_eq!(header.sender_comp_id, "test");
        assert_eq!(header.target_comp_id, "proxy");
        assert_eq!(header.msg_seq_num, 7);
        assert!(header.sending_time.is_some());
    }

    #[test]
    fn header_missing_sender_rejected() {
        let message = FixMessage::new("D")
            .with(tags::TARGET_COMP_ID, "proxy")
            .with(tags::MSG_SEQ_NUM, "1");
        let err = FixHeader::parse(&message).unwrap_err();
        assert_eq!(err, HeaderError::Missing(tags::SENDER_COMP_ID));
    }

    #[test]
    fn header_bad_seq_rejected() {
        let message = FixMessage::new("D")
            .with(tags::SENDER_COMP_ID, "a")
            .with(tags::TARGET_COMP_ID, "b")
            .with(tags::MSG_SEQ_NUM, "seven");
        let err = FixHeader::parse(&message).unwrap_err();
        assert!(matches!(
            err,
            HeaderError::Invalid {
                tag: tags::MSG_SEQ_NUM,
                ..
            }
        ));
    }

    #[test]
    fn sending_time_round_trip() {
        let raw = "20230928-16:42:00.123456";
        let parsed = parse_sending_time(raw).unwrap();
        assert_eq!(format_sending_time(parsed), raw);
    }

    #[test]
    fn sending_time_accepts_millis_and_seconds() {
        assert!(parse_sending_time("20230928-16:42:00.123").is_some());
        assert!(parse_sending_time("20230928-16:42:00").is_some());
        assert!(parse_sending_time("not-a-time").is_none());
    }
}

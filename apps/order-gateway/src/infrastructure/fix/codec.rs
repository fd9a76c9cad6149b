//! FIX Framing Codec
//!
//! Byte-level decode/encode. Decoding consumes exactly one frame at a time
//! from a growing buffer and reports how many bytes it used; a partial frame
//! is `NeedMoreData`, never an error. Any framing fault is a
//! [`MalformedFrame`], which the session layer treats as connection-fatal.
//!
//! Frame layout:
//!
//! ```text
//! 8=FIX.4.4␁9=<len>␁<body>10=<sum>␁
//! ```
//!
//! `BodyLength(9)` counts the bytes between its own terminating SOH and the
//! SOH preceding `CheckSum(10)`. The checksum is the byte sum of everything
//! before `10=`, mod 256, rendered as three decimal digits.

use super::message::{Field, FixMessage};
use super::{BEGIN_STRING, SOH};

/// Framing faults. Connection-fatal for FIX sessions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedFrame {
    /// Frame does not start with `8=`.
    #[error("frame does not start with BeginString")]
    MissingProlog,

    /// Unsupported BeginString value.
    #[error("unsupported FIX version: {0}")]
    UnsupportedVersion(String),

    /// `BodyLength(9)` absent or unparseable.
    #[error("invalid BodyLength: {0}")]
    InvalidBodyLength(String),

    /// Declared body length does not land on the trailer.
    #[error("BodyLength mismatch: declared {declared}")]
    BodyLengthMismatch {
        /// The declared length.
        declared: usize,
    },

    /// Checksum digits absent or unparseable.
    #[error("invalid CheckSum field")]
    InvalidCheckSum,

    /// Checksum does not match the byte sum.
    #[error("CheckSum mismatch: declared {declared}, computed {computed}")]
    CheckSumMismatch {
        /// The declared checksum.
        declared: u8,
        /// The computed checksum.
        computed: u8,
    },

    /// A body field is not `tag=value` with a numeric tag.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// A repeating group declared more or fewer instances than present.
    #[error("group count mismatch for tag {count_tag}: declared {declared}, found {found}")]
    GroupCountMismatch {
        /// The `NoXXX` count tag.
        count_tag: u32,
        /// Instances declared.
        declared: usize,
        /// Instances found.
        found: usize,
    },
}

/// Result of attempting to decode one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete frame was decoded.
    Message {
        /// The decoded message.
        message: FixMessage,
        /// Bytes consumed from the buffer.
        consumed: usize,
    },
    /// The buffer does not yet hold a complete frame.
    NeedMoreData,
}

/// Byte sum mod 256 of `bytes`.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Decode one frame from the front of `buf`.
///
/// # Errors
///
/// Returns [`MalformedFrame`] on any framing fault. A fault poisons the
/// buffer: the caller must drop the connection rather than resynchronize.
pub fn decode(buf: &[u8]) -> Result<DecodeOutcome, MalformedFrame> {
    if buf.len() < 2 {
        return Ok(DecodeOutcome::NeedMoreData);
    }
    if &buf[..2] != b"8=" {
        return Err(MalformedFrame::MissingProlog);
    }
    let Some(soh1) = find_soh(buf, 2) else {
        return Ok(DecodeOutcome::NeedMoreData);
    };
    let begin_string = String::from_utf8_lossy(&buf[2..soh1]).into_owned();
    if begin_string != BEGIN_STRING {
        return Err(MalformedFrame::UnsupportedVersion(begin_string));
    }

    let length_start = soh1 + 1;
    if buf.len() < length_start + 2 {
        return Ok(DecodeOutcome::NeedMoreData);
    }
    if &buf[length_start..length_start + 2] != b"9=" {
        return Err(MalformedFrame::InvalidBodyLength(
            String::from_utf8_lossy(&buf[length_start..(length_start + 2).min(buf.len())])
                .into_owned(),
        ));
    }
    let Some(soh2) = find_soh(buf, length_start + 2) else {
        return Ok(DecodeOutcome::NeedMoreData);
    };
    let length_raw = &buf[length_start + 2..soh2];
    let body_length: usize = std::str::from_utf8(length_raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            MalformedFrame::InvalidBodyLength(String::from_utf8_lossy(length_raw).into_owned())
        })?;

    let body_start = soh2 + 1;
    let body_end = body_start + body_length;
    // Trailer is "10=" + 3 digits + SOH.
    let frame_end = body_end + 7;
    if buf.len() < frame_end {
        return Ok(DecodeOutcome::NeedMoreData);
    }
    if &buf[body_end..body_end + 3] != b"10=" {
        return Err(MalformedFrame::BodyLengthMismatch {
            declared: body_length,
        });
    }
    if body_length == 0 || buf[body_end - 1] != SOH {
        return Err(MalformedFrame::BodyLengthMismatch {
            declared: body_length,
        });
    }
    let declared: u8 = std::str::from_utf8(&buf[body_end + 3..body_end + 6])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(MalformedFrame::InvalidCheckSum)?;
    if buf[body_end + 6] != SOH {
        return Err(MalformedFrame::InvalidCheckSum);
    }
    let computed = checksum(&buf[..body_end]);
    if declared != computed {
        return Err(MalformedFrame::CheckSumMismatch { declared, computed });
    }

    let fields = parse_fields(&buf[body_start..body_end])?;
    Ok(DecodeOutcome::Message {
        message: FixMessage {
            begin_string,
            fields,
        },
        consumed: frame_end,
    })
}

/// Encode a message, computing `BodyLength` and `CheckSum`.
#[must_use]
pub fn encode(message: &FixMessage) -> Vec<u8> {
    let mut body = Vec::with_capacity(message.fields.len() * 12);
    for field in &message.fields {
        body.extend_from_slice(field.tag.to_string().as_bytes());
        body.push(b'=');
        body.extend_from_slice(field.value.as_bytes());
        body.push(SOH);
    }

    let mut frame = Vec::with_capacity(body.len() + 24);
    frame.extend_from_slice(b"8=");
    frame.extend_from_slice(message.begin_string.as_bytes());
    frame.push(SOH);
    frame.extend_from_slice(b"9=");
    frame.extend_from_slice(body.len().to_string().as_bytes());
    frame.push(SOH);
    frame.extend_from_slice(&body);

    let sum = checksum(&frame);
    frame.extend_from_slice(format!("10={sum:03}").as_bytes());
    frame.push(SOH);
    frame
}

fn find_soh(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..].iter().position(|b| *b == SOH).map(|p| p + from)
}

fn parse_fields(body: &[u8]) -> Result<Vec<Field>, MalformedFrame> {
    let mut fields = Vec::new();
    for raw in body.split(|b| *b == SOH) {
        if raw.is_empty() {
            continue;
        }
        let text = std::str::from_utf8(raw)
            .map_err(|_| MalformedFrame::InvalidField(String::from_utf8_lossy(raw).into_owned()))?;
        let (tag_raw, value) = text
            .split_once('=')
            .ok_or_else(|| MalformedFrame::InvalidField(text.to_string()))?;
        let tag: u32 = tag_raw
            .parse()
            .map_err(|_| MalformedFrame::InvalidField(text.to_string()))?;
        fields.push(Field::new(tag, value));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::super::tags;
    use super::*;

    fn make_message() -> FixMessage {
        FixMessage::new("A")
            .with(tags::SENDER_COMP_ID, "test")
            .with(tags::TARGET_COMP_ID, "proxy")
            .with(tags::MSG_SEQ_NUM, "1")
            .with(tags::SENDING_TIME, "20230928-16:42:00.000000")
            .with(tags::USERNAME, "trader")
            .with(tags::PASSWORD, "secret")
    }

    fn decode_one(buf: &[u8]) -> (FixMessage, usize) {
        match decode(buf).unwrap() {
            DecodeOutcome::Message { message, consumed } => (message, consumed),
            DecodeOutcome::NeedMoreData => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn round_trip() {
        let message = make_message();
        let bytes = encode(&message);
        let (decoded, consumed) = decode_one(&bytes);

        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, message);
    }

    #[test]
    fn partial_frame_needs_more_data() {
        let bytes = encode(&make_message());
        for cut in [0, 1, 5, bytes.len() / 2, bytes.len() - 1] {
            assert_eq!(
                decode(&bytes[..cut]).unwrap(),
                DecodeOutcome::NeedMoreData,
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn two_frames_consumed_one_at_a_time() {
        let first = encode(&make_message());
        let second = encode(&FixMessage::new("5")
            .with(tags::SENDER_COMP_ID, "test")
            .with(tags::TARGET_COMP_ID, "proxy")
            .with(tags::MSG_SEQ_NUM, "2"));
        let mut buf = first.clone();
        buf.extend_from_slice(&second);

        let (m1, consumed) = decode_one(&buf);
        assert_eq!(m1.msg_type(), Some("A"));
        assert_eq!(consumed, first.len());

        let (m2, consumed2) = decode_one(&buf[consumed..]);
        assert_eq!(m2.msg_type(), Some("5"));
        assert_eq!(consumed2, second.len());
    }

    #[test]
    fn checksum_mismatch_rejected() {
        let mut bytes = encode(&make_message());
        // Flip a body byte without touching length or trailer.
        let idx = bytes.len() / 2;
        bytes[idx] = bytes[idx].wrapping_add(1);

        assert!(matches!(
            decode(&bytes),
            Err(MalformedFrame::CheckSumMismatch { .. })
        ));
    }

    #[test]
    fn body_length_mismatch_rejected() {
        let message = make_message();
        let good = encode(&message);
        let text = String::from_utf8_lossy(&good).into_owned();
        // Shrink the declared length by one; the trailer no longer lines up.
        let declared = text
            .split('\u{1}')
            .nth(1)
            .and_then(|f| f.strip_prefix("9="))
            .unwrap()
            .parse::<usize>()
            .unwrap();
        let tampered = text.replacen(
            &format!("9={declared}\u{1}"),
            &format!("9={}\u{1}", declared - 1),
            1,
        );

        assert!(matches!(
            decode(tampered.as_bytes()),
            Err(MalformedFrame::BodyLengthMismatch { .. })
        ));
    }

    #[test]
    fn garbage_prolog_rejected() {
        assert_eq!(
            decode(b"hello world this is not fix"),
            Err(MalformedFrame::MissingProlog)
        );
    }

    #[test]
    fn wrong_version_rejected() {
        let mut message = make_message();
        message.begin_string = "FIX.4.2".to_string();
        let bytes = encode(&message);
        assert!(matches!(
            decode(&bytes),
            Err(MalformedFrame::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn known_checksum_value() {
        // Empty input sums to zero.
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(b"\x01"), 1);
        assert_eq!(checksum(&[255u8, 2]), 1); // wraps mod 256
    }

    proptest! {
        #[test]
        fn round_trip_arbitrary_messages(
            msg_type in "[A-Zq0-9]{1,2}",
            body in proptest::collection::vec(
                (11u32..1000u32, "[A-Za-z0-9._-]{1,16}"),
                0..12,
            ),
        ) {
            let mut message = FixMessage::new(&msg_type)
                .with(tags::SENDER_COMP_ID, "test")
                .with(tags::TARGET_COMP_ID, "proxy")
                .with(tags::MSG_SEQ_NUM, "1");
            for (tag, value) in body {
                message.push(tag, value);
            }

            let bytes = encode(&message);
            match decode(&bytes).unwrap() {
                DecodeOutcome::Message { message: decoded, consumed } => {
                    prop_assert_eq!(consumed, bytes.len());
                    prop_assert_eq!(decoded, message);
                }
                DecodeOutcome::NeedMoreData => prop_assert!(false, "complete frame not decoded"),
            }
        }
    }
}

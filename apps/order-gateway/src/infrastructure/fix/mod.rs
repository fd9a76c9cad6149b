//! FIX 4.4 Wire Codec
//!
//! Tag=value framing, checksum/body-length validation, repeating groups, and
//! the typed mapping between FIX messages and the protocol-neutral model.
//!
//! - [`codec`]: byte-level framing (decode with `NeedMoreData`, encode with
//!   recomputed `BodyLength`/`CheckSum`)
//! - [`message`]: the ordered field representation and header extraction
//! - [`wire`]: typed request decoding and reply encoding
//!
//! Frame-level faults (`MalformedFrame`) are connection-fatal for FIX
//! sessions; everything above the frame degrades to session or business
//! rejects.

/// Byte-level framing.
pub mod codec;

/// Ordered field representation.
pub mod message;

/// FIX tag numbers used by the gateway.
pub mod tags;

/// Typed request/reply mapping.
pub mod wire;

pub use codec::{DecodeOutcome, MalformedFrame, decode, encode};
pub use message::{Field, FixHeader, FixMessage, HeaderError};
pub use wire::{FixDecodeError, FixInbound, HeaderStamp};

/// FIX version spoken by the gateway.
pub const BEGIN_STRING: &str = "FIX.4.4";

/// Field separator.
pub const SOH: u8 = 0x01;

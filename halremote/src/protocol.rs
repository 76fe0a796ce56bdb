//! Wire codec: frame payload encode/decode and wire ↔ local type bridging.
//!
//! Frames on both channels are serialized [`Container`] messages; the
//! transport carries them as opaque byte payloads. This module owns the
//! message shapes and the conversions between wire enums and the local pin
//! model.

pub mod message;

pub use message::{
    Component, Container, HalPinDirection, MessageType, Pin, ProtocolParameters, ValueType,
};

use prost::Message as _;

use crate::pin::{PinDirection, PinType, PinValue};

/// Payload decode failure (malformed or truncated frame).
pub type DecodeError = prost::DecodeError;

/// Serializes a frame payload.
#[must_use]
pub fn encode(container: &Container) -> Vec<u8> {
    container.encode_to_vec()
}

/// Parses a frame payload.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the payload is not a valid message.
pub fn decode(payload: &[u8]) -> Result<Container, DecodeError> {
    Container::decode(payload)
}

impl From<PinType> for ValueType {
    fn from(ty: PinType) -> Self {
        match ty {
            PinType::Bit => Self::Bit,
            PinType::Float => Self::Float,
            PinType::S32 => Self::S32,
            PinType::U32 => Self::U32,
        }
    }
}

impl From<ValueType> for PinType {
    fn from(ty: ValueType) -> Self {
        match ty {
            ValueType::Bit => Self::Bit,
            ValueType::Float => Self::Float,
            ValueType::S32 => Self::S32,
            ValueType::U32 => Self::U32,
        }
    }
}

impl From<PinDirection> for HalPinDirection {
    fn from(dir: PinDirection) -> Self {
        match dir {
            PinDirection::In => Self::In,
            PinDirection::Out => Self::Out,
            PinDirection::InOut => Self::InOut,
        }
    }
}

impl From<HalPinDirection> for PinDirection {
    fn from(dir: HalPinDirection) -> Self {
        match dir {
            HalPinDirection::In => Self::In,
            HalPinDirection::Out => Self::Out,
            HalPinDirection::InOut => Self::InOut,
        }
    }
}

impl Pin {
    /// Writes `value` into the value field matching its type, clearing the
    /// other three.
    pub fn set_value(&mut self, value: PinValue) {
        self.halfloat = None;
        self.halbit = None;
        self.hals32 = None;
        self.halu32 = None;
        match value {
            PinValue::Float(v) => self.halfloat = Some(v),
            PinValue::Bit(v) => self.halbit = Some(v),
            PinValue::S32(v) => self.hals32 = Some(v),
            PinValue::U32(v) => self.halu32 = Some(v),
        }
    }

    /// Reads whichever value field is present.
    ///
    /// Returns `None` if no value field is set. Field precedence (float,
    /// bit, s32, u32) only matters for malformed frames carrying more than
    /// one field.
    #[must_use]
    pub fn value(&self) -> Option<PinValue> {
        if let Some(v) = self.halfloat {
            Some(PinValue::Float(v))
        } else if let Some(v) = self.halbit {
            Some(PinValue::Bit(v))
        } else if let Some(v) = self.hals32 {
            Some(PinValue::S32(v))
        } else if let Some(v) = self.halu32 {
            Some(PinValue::U32(v))
        } else {
            None
        }
    }
}

//! Wire message definitions for the remote component dialect.
//!
//! Every frame is one serialized [`Container`] whose `type` field selects
//! which of the optional bodies is meaningful. The field tags are the wire
//! contract; struct and variant names are local convention.

/// Frame discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    /// Liveness probe, either direction. No body.
    Ping = 10,
    /// Reply to a client `Ping` on the command channel.
    PingAcknowledge = 11,
    /// Server-side protocol error, published on the update channel.
    HalrcommandError = 20,
    /// Client registers its component shape.
    HalrcompBind = 30,
    /// Server accepted the bind.
    HalrcompBindConfirm = 31,
    /// Server rejected the bind; `note` carries the reasons.
    HalrcompBindReject = 32,
    /// Client forwards changed output pin values.
    HalrcompSet = 33,
    /// Server rejected a set; `note` carries the reasons.
    HalrcompSetReject = 34,
    /// Snapshot of all pins: handles and values, per component.
    HalrcompFullUpdate = 35,
    /// Delta carrying only changed pins, addressed by handle.
    HalrcompIncrementalUpdate = 36,
}

/// Pin value type on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ValueType {
    Bit = 1,
    Float = 2,
    S32 = 3,
    U32 = 4,
}

/// Pin direction on the wire. Values follow the daemon's HAL convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum HalPinDirection {
    In = 16,
    Out = 32,
    InOut = 48,
}

/// One pin entry inside a bind, set, or update frame.
///
/// Exactly one of the four value fields is set, matching `type`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pin {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(uint32, optional, tag = "2")]
    pub handle: Option<u32>,
    #[prost(enumeration = "ValueType", optional, tag = "3")]
    pub r#type: Option<i32>,
    #[prost(enumeration = "HalPinDirection", optional, tag = "4")]
    pub dir: Option<i32>,
    #[prost(double, optional, tag = "5")]
    pub halfloat: Option<f64>,
    #[prost(bool, optional, tag = "6")]
    pub halbit: Option<bool>,
    #[prost(int32, optional, tag = "7")]
    pub hals32: Option<i32>,
    #[prost(uint32, optional, tag = "8")]
    pub halu32: Option<u32>,
}

/// One component entry inside a bind or full-update frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Component {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub pin: Vec<Pin>,
}

/// Update-channel timing parameters, sent with the first full update.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtocolParameters {
    /// Maximum silence on the update channel before the client must assume
    /// the service is gone, in milliseconds.
    #[prost(uint32, optional, tag = "1")]
    pub keepalive_timer: Option<u32>,
}

/// The single top-level frame type.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Container {
    #[prost(enumeration = "MessageType", tag = "1")]
    pub r#type: i32,
    #[prost(message, repeated, tag = "2")]
    pub comp: Vec<Component>,
    #[prost(message, repeated, tag = "3")]
    pub pin: Vec<Pin>,
    #[prost(string, repeated, tag = "4")]
    pub note: Vec<String>,
    #[prost(message, optional, tag = "5")]
    pub pparams: Option<ProtocolParameters>,
}

impl Container {
    /// An empty frame of the given type.
    #[must_use]
    pub fn of_type(ty: MessageType) -> Self {
        Self {
            r#type: ty as i32,
            ..Self::default()
        }
    }

    /// The frame discriminator, if it is a known type.
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::try_from(self.r#type).ok()
    }
}

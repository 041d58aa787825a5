//! USB 1.1 protocol definitions
//!
//! Packet identifiers, standard request encodings and the descriptor layouts the host core
//! consumes. Multi-byte descriptor fields are little endian on the wire; the structs keep the raw
//! wire value and expose accessors that convert, so the same code works on big endian cores.
//!
//! See the crate-level documentation for the acronyms used to refer to specific documents.
pub use self::config::ConfigDescriptor;
pub use self::desc::{find_desc, parse, AnyDescriptor, DescError, DescIter, Descriptor};
pub use self::device::DeviceDescriptor;
pub use self::endpoint::{EndpointDescriptor, EndpointTy};
pub use self::hub::*;
pub use self::interface::InterfaceDescriptor;
pub use self::setup::{ReqDirection, ReqRecipient, ReqType, Setup, SetupReq};

/// Packet identifiers as they appear on the wire, including the check nibble. (USB2 8.3.1)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Pid {
    Out = 0xE1,
    In = 0x69,
    Sof = 0xA5,
    Setup = 0x2D,
    Data0 = 0xC3,
    Data1 = 0x4B,
    Ack = 0xD2,
    Nak = 0x5A,
    Stall = 0x1E,
}

impl Pid {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0xE1 => Self::Out,
            0x69 => Self::In,
            0xA5 => Self::Sof,
            0x2D => Self::Setup,
            0xC3 => Self::Data0,
            0x4B => Self::Data1,
            0xD2 => Self::Ack,
            0x5A => Self::Nak,
            0x1E => Self::Stall,
            _ => return None,
        })
    }

    /// DATA0 and DATA1 are the only PIDs whose low two bits are both set.
    pub fn is_data(raw: u8) -> bool {
        raw & 0x3 == 0x3
    }
}

/// Enumerates the descriptor kinds this host understands. (USB2 Table 9-5)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum DescriptorKind {
    /// A Device Descriptor. See [DeviceDescriptor]
    Device = 1,
    /// A Configuration Descriptor. See [ConfigDescriptor]
    Configuration = 2,
    /// A String Descriptor. Never requested by the host, but may appear when dumping.
    String = 3,
    /// An Interface Descriptor. See [InterfaceDescriptor]
    Interface = 4,
    /// An Endpoint Descriptor. See [EndpointDescriptor]
    Endpoint = 5,
    /// The class descriptor that follows a HID interface descriptor.
    Hid = 0x21,
    /// A USB Hub Descriptor. See [HubDescriptor]
    Hub = 0x29,
}

/// Interface class codes the host binds drivers for.
pub const CLASS_HID: u8 = 3;
pub const CLASS_HUB: u8 = 9;

/// HID interface subclass for devices that support the boot protocol.
pub const HID_SUBCLASS_BOOT: u8 = 1;
pub const HID_PROTOCOL_KEYBOARD: u8 = 1;
pub const HID_PROTOCOL_MOUSE: u8 = 2;

pub(crate) mod config;
pub(crate) mod desc;
pub(crate) mod device;
pub(crate) mod endpoint;
pub(crate) mod hub;
pub(crate) mod interface;
pub(crate) mod setup;

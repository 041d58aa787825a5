use super::{DescriptorKind, HubPortFeature};

/// The 8-byte SETUP packet that opens every control transfer. (USB2 9.3)
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Setup {
    pub kind: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

unsafe impl plain::Plain for Setup {}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReqDirection {
    HostToDevice = 0,
    DeviceToHost = 1,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReqType {
    Standard = 0,
    Class = 1,
    Vendor = 2,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReqRecipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetupReq {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
}

pub const USB_SETUP_DIR_BIT: u8 = 1 << 7;
pub const USB_SETUP_REQ_TY_SHIFT: u8 = 5;

pub const fn request_type(dir: ReqDirection, ty: ReqType, recipient: ReqRecipient) -> u8 {
    ((dir as u8) << 7) | ((ty as u8) << USB_SETUP_REQ_TY_SHIFT) | recipient as u8
}

impl Setup {
    pub const fn new(kind: u8, request: SetupReq, value: u16, index: u16, length: u16) -> Self {
        Self {
            kind,
            request: request as u8,
            value,
            index,
            length,
        }
    }

    pub fn direction(&self) -> ReqDirection {
        if self.kind & USB_SETUP_DIR_BIT == 0 {
            ReqDirection::HostToDevice
        } else {
            ReqDirection::DeviceToHost
        }
    }

    /// Number of bytes in the data stage.
    pub fn data_len(&self) -> u16 {
        self.length
    }

    /// The packet as it goes on the wire.
    pub fn to_bytes(&self) -> [u8; 8] {
        let (value, index, length) = (self.value, self.index, self.length);
        let mut bytes = [0; 8];
        bytes[0] = self.kind;
        bytes[1] = self.request;
        bytes[2..4].copy_from_slice(&value.to_le_bytes());
        bytes[4..6].copy_from_slice(&index.to_le_bytes());
        bytes[6..8].copy_from_slice(&length.to_le_bytes());
        bytes
    }

    /// Decodes a packet captured off the wire.
    pub fn from_bytes(bytes: &[u8; 8]) -> Self {
        Self {
            kind: bytes[0],
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    pub const fn set_address(address: u8) -> Self {
        Self::new(
            request_type(ReqDirection::HostToDevice, ReqType::Standard, ReqRecipient::Device),
            SetupReq::SetAddress,
            address as u16,
            0,
            0,
        )
    }

    pub const fn get_descriptor(kind: DescriptorKind, index: u8, length: u16) -> Self {
        Self::new(
            request_type(ReqDirection::DeviceToHost, ReqType::Standard, ReqRecipient::Device),
            SetupReq::GetDescriptor,
            ((kind as u16) << 8) | (index as u16),
            0,
            length,
        )
    }

    pub const fn set_configuration(value: u8) -> Self {
        Self::new(
            request_type(ReqDirection::HostToDevice, ReqType::Standard, ReqRecipient::Device),
            SetupReq::SetConfiguration,
            value as u16,
            0,
            0,
        )
    }

    /// Class request for the hub descriptor, which is not part of the configuration bundle.
    pub const fn get_hub_descriptor(length: u16) -> Self {
        Self::new(
            request_type(ReqDirection::DeviceToHost, ReqType::Class, ReqRecipient::Device),
            SetupReq::GetDescriptor,
            (DescriptorKind::Hub as u16) << 8,
            0,
            length,
        )
    }

    /// Reads the 4-byte status and change word of a hub downstream port. (USB2 11.24.2.7)
    pub const fn get_port_status(port: u8) -> Self {
        Self::new(
            request_type(ReqDirection::DeviceToHost, ReqType::Class, ReqRecipient::Other),
            SetupReq::GetStatus,
            0,
            port as u16,
            4,
        )
    }

    pub const fn set_port_feature(feature: HubPortFeature, port: u8) -> Self {
        Self::new(
            request_type(ReqDirection::HostToDevice, ReqType::Class, ReqRecipient::Other),
            SetupReq::SetFeature,
            feature as u16,
            port as u16,
            0,
        )
    }

    pub const fn clear_port_feature(feature: HubPortFeature, port: u8) -> Self {
        Self::new(
            request_type(ReqDirection::HostToDevice, ReqType::Class, ReqRecipient::Other),
            SetupReq::ClearFeature,
            feature as u16,
            port as u16,
            0,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_layout() {
        let setup = Setup::get_descriptor(DescriptorKind::Configuration, 0, 9);
        assert_eq!(setup.to_bytes(), [0x80, 0x06, 0x00, 0x02, 0x00, 0x00, 0x09, 0x00]);
        assert_eq!(setup.direction(), ReqDirection::DeviceToHost);

        let setup = Setup::set_port_feature(HubPortFeature::PortReset, 3);
        assert_eq!(setup.to_bytes(), [0x23, 0x03, 0x04, 0x00, 0x03, 0x00, 0x00, 0x00]);
        assert_eq!(setup.direction(), ReqDirection::HostToDevice);

        let setup = Setup::get_port_status(2);
        assert_eq!(setup.to_bytes(), [0xA3, 0x00, 0x00, 0x00, 0x02, 0x00, 0x04, 0x00]);
    }

    #[test]
    fn decode_captured() {
        let setup = Setup::from_bytes(&[0x00, 0x05, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(setup.request, SetupReq::SetAddress as u8);
        assert_eq!({ setup.value }, 7);
        assert_eq!(setup.data_len(), 0);
    }
}

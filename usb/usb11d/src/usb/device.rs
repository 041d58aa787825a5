//! Implements the "Device" USB Descriptor.
//!
//! This descriptor is described in USB2 section 9.6.1

/// A USB Device Descriptor.
///
/// "Provides information that applies globally to the device and all the device's
/// configurations" (USB2 9.6.1). A given device has exactly one. The host reads it in full right
/// after SET_ADDRESS, which is when it first learns the real size of endpoint zero.
///
/// USB2 Table 9-8 describes the offsets of the fields described by this structure.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceDescriptor {
    /// bLength
    pub length: u8,
    /// bDescriptorType, always [super::DescriptorKind::Device]
    pub kind: u8,
    /// bcdUSB, the supported USB revision in binary-coded decimal. Little endian.
    pub usb: u16,
    /// bDeviceClass. Zero means every interface names its own class, which is the common case
    /// for the HID devices this host drives.
    pub class: u8,
    /// bDeviceSubClass
    pub sub_class: u8,
    /// bDeviceProtocol
    pub protocol: u8,
    /// bMaxPacketSize0, the maximum packet size of endpoint zero: 8, 16, 32 or 64.
    pub packet_size: u8,
    /// idVendor. Little endian.
    pub vendor: u16,
    /// idProduct. Little endian.
    pub product: u16,
    /// bcdDevice. Little endian.
    pub release: u16,
    /// iManufacturer
    pub manufacturer_str: u8,
    /// iProduct
    pub product_str: u8,
    /// iSerialNumber
    pub serial_str: u8,
    /// bNumConfigurations
    pub configurations: u8,
}

unsafe impl plain::Plain for DeviceDescriptor {}

impl DeviceDescriptor {
    pub const SIZE: usize = 18;

    pub fn usb_version(&self) -> u16 {
        u16::from_le(self.usb)
    }

    pub fn vendor(&self) -> u16 {
        u16::from_le(self.vendor)
    }

    pub fn product(&self) -> u16 {
        u16::from_le(self.product)
    }

    pub fn release(&self) -> u16 {
        u16::from_le(self.release)
    }

    /// Endpoint zero packet size, or `None` if the device reported a value USB 1.1 forbids.
    pub fn ep0_packet_size(&self) -> Option<u16> {
        match self.packet_size {
            8 | 16 | 32 | 64 => Some(self.packet_size.into()),
            _ => None,
        }
    }
}

/// The configuration descriptor header. (USB2 9.6.3)
///
/// A GET_DESCRIPTOR(Configuration) returns this header followed by every interface, endpoint and
/// class descriptor of the configuration, `total_length` bytes in all.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigDescriptor {
    pub length: u8,
    pub kind: u8,
    pub total_length: u16,
    pub interfaces: u8,
    pub configuration_value: u8,
    pub configuration_str: u8,
    pub attributes: u8,
    pub max_power: u8,
}

unsafe impl plain::Plain for ConfigDescriptor {}

impl ConfigDescriptor {
    pub const SIZE: usize = 9;

    pub fn total_length(&self) -> u16 {
        u16::from_le(self.total_length)
    }
}

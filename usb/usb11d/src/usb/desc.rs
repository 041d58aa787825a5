use std::mem;

use plain::Plain;
use thiserror::Error;

use super::{
    ConfigDescriptor, DescriptorKind, DeviceDescriptor, EndpointDescriptor, InterfaceDescriptor,
};

#[derive(Debug, Error, Eq, PartialEq)]
pub enum DescError {
    #[error("descriptor truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unexpected descriptor type {found:#04x}, wanted {wanted:?}")]
    WrongKind {
        wanted: DescriptorKind,
        found: u8,
    },
}

/// The two bytes every descriptor starts with.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct AnyDescriptor {
    pub length: u8,
    pub kind: u8,
}

unsafe impl Plain for AnyDescriptor {}

/// Walks a configuration bundle one descriptor at a time.
///
/// Iteration stops at the end of the buffer, at a descriptor claiming to be shorter than its own
/// header, or at one running past the end. A device that lies about lengths therefore yields a
/// short iteration, never an out of bounds read.
pub struct DescIter<'a> {
    bytes: &'a [u8],
}

impl<'a> DescIter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl<'a> From<&'a [u8]> for DescIter<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Self::new(slice)
    }
}

impl<'a> Iterator for DescIter<'a> {
    type Item = (AnyDescriptor, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let desc = *plain::from_bytes::<AnyDescriptor>(self.bytes).ok()?;
        let len = desc.length as usize;
        if len < mem::size_of::<AnyDescriptor>() || len > self.bytes.len() {
            self.bytes = &[];
            return None;
        }
        let (this, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Some((desc, this))
    }
}

/// Finds the first descriptor of `kind` in `bytes`.
///
/// Returns the buffer starting at that descriptor, so a caller can parse it and then continue
/// the search past it.
pub fn find_desc(bytes: &[u8], kind: DescriptorKind) -> Option<&[u8]> {
    let mut offset = 0;
    for (desc, this) in DescIter::new(bytes) {
        if desc.kind == kind as u8 {
            return Some(&bytes[offset..]);
        }
        offset += this.len();
    }
    None
}

/// Descriptors that can be read straight out of a byte buffer.
pub trait Descriptor: Plain + Copy {
    const KIND: DescriptorKind;
}

impl Descriptor for DeviceDescriptor {
    const KIND: DescriptorKind = DescriptorKind::Device;
}

impl Descriptor for ConfigDescriptor {
    const KIND: DescriptorKind = DescriptorKind::Configuration;
}

impl Descriptor for InterfaceDescriptor {
    const KIND: DescriptorKind = DescriptorKind::Interface;
}

impl Descriptor for EndpointDescriptor {
    const KIND: DescriptorKind = DescriptorKind::Endpoint;
}

impl Descriptor for super::HubDescriptor {
    const KIND: DescriptorKind = DescriptorKind::Hub;
}

/// Reads a `T` from the start of `bytes`, checking its type byte.
pub fn parse<T: Descriptor>(bytes: &[u8]) -> Result<T, DescError> {
    let need = mem::size_of::<T>();
    let desc = plain::from_bytes::<T>(bytes).map_err(|_| DescError::Truncated {
        need,
        have: bytes.len(),
    })?;
    let found = bytes[1];
    if found != T::KIND as u8 {
        return Err(DescError::WrongKind {
            wanted: T::KIND,
            found,
        });
    }
    Ok(*desc)
}

#[cfg(test)]
mod test {
    use super::*;

    #[rustfmt::skip]
    const KEYBOARD_CONFIG: [u8; 34] = [
        // configuration, total length 34
        0x09, 0x02, 0x22, 0x00, 0x01, 0x01, 0x00, 0xA0, 0x32,
        // interface 0, class 3/1/1
        0x09, 0x04, 0x00, 0x00, 0x01, 0x03, 0x01, 0x01, 0x00,
        // HID class descriptor
        0x09, 0x21, 0x11, 0x01, 0x00, 0x01, 0x22, 0x3F, 0x00,
        // endpoint 0x81, interrupt, 8 bytes, 10ms
        0x07, 0x05, 0x81, 0x03, 0x08, 0x00, 0x0A,
    ];

    #[test]
    fn walk_bundle() {
        let kinds: Vec<u8> = DescIter::new(&KEYBOARD_CONFIG).map(|(d, _)| d.kind).collect();
        assert_eq!(kinds, [0x02, 0x04, 0x21, 0x05]);
    }

    #[test]
    fn find_and_continue() {
        let iface = find_desc(&KEYBOARD_CONFIG, DescriptorKind::Interface).unwrap();
        let iface_desc: InterfaceDescriptor = parse(iface).unwrap();
        assert_eq!(
            (iface_desc.class, iface_desc.sub_class, iface_desc.protocol),
            (3, 1, 1)
        );

        let rest = &iface[iface_desc.length as usize..];
        let endp: EndpointDescriptor = parse(find_desc(rest, DescriptorKind::Endpoint).unwrap()).unwrap();
        assert_eq!(endp.number(), 1);
        assert!(endp.is_in());
        assert_eq!(endp.max_packet_size(), 8);

        assert!(find_desc(rest, DescriptorKind::Interface).is_none());
    }

    #[test]
    fn zero_length_stops() {
        let bytes = [0x09, 0x02, 0x0B, 0x00, 0x01, 0x01, 0x00, 0xA0, 0x32, 0x00, 0x04];
        assert_eq!(DescIter::new(&bytes).count(), 1);
        assert!(find_desc(&bytes, DescriptorKind::Interface).is_none());
    }

    #[test]
    fn overlong_stops() {
        let bytes = [0x09, 0x04, 0x00, 0x00];
        assert_eq!(DescIter::new(&bytes).count(), 0);
    }

    #[test]
    fn parse_checks() {
        assert_eq!(
            parse::<InterfaceDescriptor>(&KEYBOARD_CONFIG[..5]).unwrap_err(),
            DescError::Truncated { need: 9, have: 5 }
        );
        assert_eq!(
            parse::<InterfaceDescriptor>(&KEYBOARD_CONFIG).unwrap_err(),
            DescError::WrongKind {
                wanted: DescriptorKind::Interface,
                found: 0x02
            }
        );
        let conf: ConfigDescriptor = parse(&KEYBOARD_CONFIG).unwrap();
        assert_eq!(conf.total_length(), 34);
    }
}

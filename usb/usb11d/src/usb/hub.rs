/// The hub class descriptor as far as a USB 1.1 hub with at most 8 ports fills it in.
///
/// Hubs do not include it in their configuration bundle; it has to be fetched with a class
/// GET_DESCRIPTOR. (USB2 11.23.2.1)
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct HubDescriptor {
    pub length: u8,
    pub kind: u8,
    pub ports: u8,
    pub characteristics: u16,
    pub power_on_good: u8,
    pub current: u8,
    pub device_removable: u8,
    pub power_control_mask: u8,
}

unsafe impl plain::Plain for HubDescriptor {}

impl HubDescriptor {
    pub const SIZE: usize = 9;

    /// Time from power on to power good, in milliseconds.
    pub fn power_on_delay_ms(&self) -> u32 {
        u32::from(self.power_on_good) * 2
    }
}

/// Port features addressed by SET_FEATURE / CLEAR_FEATURE with an "other" recipient.
#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum HubPortFeature {
    PortConnection = 0,
    PortEnable = 1,
    PortSuspend = 2,
    PortOverCurrent = 3,
    PortReset = 4,
    PortPower = 8,
    PortLowSpeed = 9,
    CPortConnection = 16,
    CPortEnable = 17,
    CPortReset = 20,
}

bitflags::bitflags! {
    /// wPortStatus in the low half, wPortChange in the high half. (USB2 11.24.2.7)
    #[derive(Default)]
    #[repr(transparent)]
    pub struct HubPortStatus: u32 {
        const CONNECTION = 1 << 0;
        const ENABLE = 1 << 1;
        const SUSPEND = 1 << 2;
        const OVER_CURRENT = 1 << 3;
        const RESET = 1 << 4;
        // bits 5-7 reserved
        const POWER = 1 << 8;
        const LOW_SPEED = 1 << 9;
        // bits 10-15 reserved in USB 1.1
        const CONNECTION_CHANGED = 1 << 16;
        const ENABLE_CHANGED = 1 << 17;
        const SUSPEND_CHANGED = 1 << 18;
        const OVER_CURRENT_CHANGED = 1 << 19;
        const RESET_CHANGED = 1 << 20;
        // bits 21 - 31 reserved
    }
}

impl HubPortStatus {
    /// Decodes the status word as received in the data stage of GET_STATUS.
    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self::from_bits_truncate(u32::from_le_bytes(bytes))
    }

    pub fn is_powered(&self) -> bool {
        self.contains(Self::POWER)
    }

    pub fn is_connected(&self) -> bool {
        self.contains(Self::CONNECTION)
    }

    /// The hub finished driving reset on this port since the change bit was last cleared.
    pub fn has_reset(&self) -> bool {
        self.contains(Self::RESET_CHANGED)
    }

    pub fn is_enabled(&self) -> bool {
        self.contains(Self::ENABLE)
    }

    pub fn is_low_speed(&self) -> bool {
        self.contains(Self::LOW_SPEED)
    }
}

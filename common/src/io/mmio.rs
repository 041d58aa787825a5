use core::mem::MaybeUninit;
use core::ptr;

use super::Io;

/// A memory-mapped register.
///
/// Never constructed directly by drivers: a register block is a `#[repr(C)]` struct of these,
/// overlaid on the device's address window.
#[repr(transparent)]
pub struct Mmio<T> {
    value: MaybeUninit<T>,
}

impl<T: Copy> Io for Mmio<T> {
    type Value = T;

    #[inline(always)]
    fn read(&self) -> T {
        unsafe { ptr::read_volatile(self.value.as_ptr()) }
    }

    #[inline(always)]
    fn write(&mut self, value: T) {
        unsafe { ptr::write_volatile(self.value.as_mut_ptr(), value) }
    }
}

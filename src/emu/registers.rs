use std::{cell::RefCell, rc::Rc};

use crate::u4;

/// Hook notified on every instruction-level register access.
///
/// Used by debug front ends to highlight registers; has no effect on execution.
pub trait RegisterObserver {
    fn register_read(&mut self, _reg: u4) {}
    fn register_written(&mut self, _reg: u4, _value: u8) {}
}

/// General-purpose registers V0-VF (VF doubles as the flag register).
#[derive(Default)]
pub struct Registers {
    v: [u8; 16],
    observer: Option<Box<dyn RegisterObserver>>,
}

impl Registers {
    pub fn get(&mut self, reg: u4) -> u8 {
        if let Some(observer) = self.observer.as_mut() {
            observer.register_read(reg);
        }
        self.v[reg]
    }

    pub fn set(&mut self, reg: u4, value: u8) {
        if let Some(observer) = self.observer.as_mut() {
            observer.register_written(reg, value);
        }
        self.v[reg] = value;
    }

    /// Writes a register without notifying the observer. `values` reads the same way.
    pub fn poke(&mut self, reg: u4, value: u8) {
        self.v[reg] = value;
    }

    pub fn values(&self) -> &[u8; 16] {
        &self.v
    }

    pub fn clear(&mut self) {
        self.v = [0; 16];
    }

    pub fn set_observer(&mut self, observer: Option<Box<dyn RegisterObserver>>) {
        self.observer = observer;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AccessFlags {
    pub read: [bool; 16],
    pub written: [bool; 16],
}

/// Shared read/written flags per register.
///
/// Clones share the same flags, so one handle can be attached to the VM
/// while another is kept for display.
#[derive(Debug, Default, Clone)]
pub struct RegisterAccessLog {
    flags: Rc<RefCell<AccessFlags>>,
}

impl RegisterAccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> AccessFlags {
        *self.flags.borrow()
    }

    pub fn was_read(&self, reg: u4) -> bool {
        self.flags.borrow().read[reg]
    }

    pub fn was_written(&self, reg: u4) -> bool {
        self.flags.borrow().written[reg]
    }

    pub fn clear(&self) {
        *self.flags.borrow_mut() = AccessFlags::default();
    }
}

impl RegisterObserver for RegisterAccessLog {
    fn register_read(&mut self, reg: u4) {
        self.flags.borrow_mut().read[reg] = true;
    }

    fn register_written(&mut self, reg: u4, _value: u8) {
        self.flags.borrow_mut().written[reg] = true;
    }
}

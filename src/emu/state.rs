use std::fmt;

use super::ExecState;

/// Point-in-time copy of the CPU state for debug output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDump {
    pub pc: u16,
    pub i: u16,
    pub sp: u8,
    pub delay_timer: u8,
    pub sound_timer: u8,
    /// Last fetched opcode
    pub opcode: u16,
    pub v: [u8; 16],
    pub stack: Vec<u16>,
    pub state: ExecState,
}

impl fmt::Display for StateDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "PC: {:03X}  I: {:03X}  SP: {:X}  Opcode: {:04X}",
            self.pc, self.i, self.sp, self.opcode
        )?;
        writeln!(
            f,
            "DT: {:02X}  ST: {:02X}  State: {:?}",
            self.delay_timer, self.sound_timer, self.state
        )?;

        for (idx, value) in self.v.iter().enumerate() {
            write!(f, "V{idx:X}: {value:02X}")?;
            f.write_str(if idx % 8 == 7 { "\n" } else { "  " })?;
        }

        write!(f, "Stack:")?;
        if self.stack.is_empty() {
            write!(f, " empty")?;
        }
        for addr in &self.stack {
            write!(f, " {addr:03X}")?;
        }
        Ok(())
    }
}

/// Switches for behaviors that historical interpreters disagree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatibilityConfig {
    /// 8xy6/8xyE shift Vy into Vx instead of shifting Vx in place.
    pub shift_uses_vy: bool,
    /// Fx55/Fx65 leave I pointing past the last register transferred.
    pub increment_i_after_block_op: bool,
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        Self {
            shift_uses_vy: true,
            increment_i_after_block_op: true,
        }
    }
}

impl CompatibilityConfig {
    /// Both quirks off: shifts work on Vx and I is left unchanged by block ops.
    pub const fn modern() -> Self {
        Self {
            shift_uses_vy: false,
            increment_i_after_block_op: false,
        }
    }
}

/// What `step()` does with an opcode that matches no instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidOpcodePolicy {
    /// Halt the VM with `Chip8Error::InvalidOpcode`.
    #[default]
    Halt,
    /// Log a warning and carry on with the next instruction.
    Skip,
}

use crate::u4;

/// Result type for a single CHIP-8 step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip8Result {
    /// Continue executing instructions in the current frame.
    Continue,
    /// Wait for the next frame before continuing
    /// (after a draw instruction, to limit the display update rate to the frame rate).
    WaitForNextFrame,
    /// The VM is suspended on Fx0A until a key-down event is delivered.
    AwaitingKey,
}

/// What the VM will do on the next `step()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// Ready to fetch the next instruction.
    Running,
    /// Suspended on Fx0A; the pressed key goes into `Vx`.
    AwaitingKey { x: u4 },
    /// A fatal error occurred; see `Chip8::fault`.
    Halted,
}

/// Coarse classification of `Chip8Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidOpcode,
    OutOfRange,
    StackOverflow,
    StackUnderflow,
    RomTooLarge,
}

/// Error types that can occur during CHIP-8 emulation.
///
/// All of them are terminal for the running VM instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("Memory access out of range at address {address:#06X}")]
    MemoryOutOfRange { address: u16 },

    #[error("Program counter out of range or misaligned: {pc:#06X}")]
    PcOutOfRange { pc: u16 },

    #[error("Sprite pixel out of range at ({x}, {y})")]
    PixelOutOfRange { x: usize, y: usize },

    #[error("Stack overflow: no room for return address {address:#06X}")]
    StackOverflow { address: u16 },

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,

    #[error("Invalid opcode {opcode:#06X} at address {address:#06X}")]
    InvalidOpcode { opcode: u16, address: u16 },
}

impl Chip8Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Chip8Error::RomTooLarge { .. } => ErrorKind::RomTooLarge,
            Chip8Error::MemoryOutOfRange { .. }
            | Chip8Error::PcOutOfRange { .. }
            | Chip8Error::PixelOutOfRange { .. } => ErrorKind::OutOfRange,
            Chip8Error::StackOverflow { .. } => ErrorKind::StackOverflow,
            Chip8Error::StackUnderflow => ErrorKind::StackUnderflow,
            Chip8Error::InvalidOpcode { .. } => ErrorKind::InvalidOpcode,
        }
    }
}

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
/// A type alias for the CHIP-8 display buffer representation
pub type Display<T> = [[T; DISPLAY_X]; DISPLAY_Y];

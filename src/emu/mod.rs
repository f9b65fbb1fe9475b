mod chip8;
mod config;
mod display;
mod execute;
mod font;
mod keypad;
mod memory;
mod opcode;
mod registers;
mod runner;
mod stack;
mod state;
mod timers;
mod types;

pub use chip8::*;
pub use config::*;
pub use display::*;
pub use font::*;
pub use keypad::*;
pub use memory::*;
pub use opcode::*;
pub use registers::*;
pub use runner::*;
pub use stack::*;
pub use state::*;
pub use timers::*;
pub use types::*;

use super::{Chip8Error, FONT_END_ADDRESS, FONT_SIZE, FONT_START_ADDRESS};

pub const MEMORY_SIZE: usize = 4096;
pub const ROM_START_ADDRESS: usize = 0x200;
/// Largest program image that fits between 0x200 and 0xFFF.
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;

/// Flat 4 KiB address space with bounds-checked access.
#[derive(Clone)]
pub struct Memory {
    bytes: [u8; MEMORY_SIZE],
}

impl Memory {
    pub fn new() -> Self {
        Self {
            bytes: [0; MEMORY_SIZE],
        }
    }

    /// Copies a program image to 0x200. Fails without touching memory if it does not fit.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            });
        }

        let rom_end = ROM_START_ADDRESS + rom.len();
        self.bytes[ROM_START_ADDRESS..rom_end].copy_from_slice(rom);
        Ok(())
    }

    pub fn load_font(&mut self, glyphs: &[u8; FONT_SIZE]) {
        self.bytes[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(glyphs);
    }

    pub fn read(&self, addr: u16) -> Result<u8, Chip8Error> {
        self.bytes
            .get(addr as usize)
            .copied()
            .ok_or(Chip8Error::MemoryOutOfRange { address: addr })
    }

    pub fn write(&mut self, addr: u16, value: u8) -> Result<(), Chip8Error> {
        let byte = self
            .bytes
            .get_mut(addr as usize)
            .ok_or(Chip8Error::MemoryOutOfRange { address: addr })?;
        *byte = value;
        Ok(())
    }

    /// Returns `len` bytes starting at `start`, truncated at the end of memory.
    pub fn slice(&self, start: u16, len: u16) -> &[u8] {
        let start = (start as usize).min(MEMORY_SIZE);
        let end = (start + len as usize).min(MEMORY_SIZE);
        &self.bytes[start..end]
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

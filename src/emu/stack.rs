use super::Chip8Error;

pub const STACK_DEPTH: usize = 16;

/// Fixed 16-entry return address stack.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    entries: [u16; STACK_DEPTH],
    sp: u8,
}

impl Stack {
    pub fn push(&mut self, addr: u16) -> Result<(), Chip8Error> {
        let slot = self
            .entries
            .get_mut(self.sp as usize)
            .ok_or(Chip8Error::StackOverflow { address: addr })?;
        *slot = addr;
        self.sp += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u16, Chip8Error> {
        self.sp = self.sp.checked_sub(1).ok_or(Chip8Error::StackUnderflow)?;
        Ok(self.entries[self.sp as usize])
    }

    /// Number of return addresses currently on the stack.
    pub fn sp(&self) -> u8 {
        self.sp
    }

    /// The live part of the stack, oldest entry first.
    pub fn as_slice(&self) -> &[u16] {
        &self.entries[..self.sp as usize]
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = Stack::default();
        stack.push(0x202).unwrap();
        stack.push(0x304).unwrap();
        assert_eq!(stack.as_slice(), &[0x202, 0x304]);
        assert_eq!(stack.pop(), Ok(0x304));
        assert_eq!(stack.pop(), Ok(0x202));
        assert_eq!(stack.sp(), 0);
    }

    #[test]
    fn seventeenth_push_overflows() {
        let mut stack = Stack::default();
        for i in 0..STACK_DEPTH as u16 {
            stack.push(0x200 + i * 2).unwrap();
        }
        assert_eq!(
            stack.push(0x400),
            Err(Chip8Error::StackOverflow { address: 0x400 })
        );
        assert_eq!(stack.sp(), 16);
    }

    #[test]
    fn pop_on_empty_stack_underflows() {
        let mut stack = Stack::default();
        assert_eq!(stack.pop(), Err(Chip8Error::StackUnderflow));
        assert_eq!(stack.sp(), 0);
    }
}

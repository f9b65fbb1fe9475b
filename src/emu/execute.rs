use log::warn;
use rand::Rng;

use super::{
    Chip8, Chip8Error, Chip8Result, ExecState, FONT_GLYPH_SIZE, FONT_START_ADDRESS,
    InvalidOpcodePolicy, MEMORY_SIZE, Opcode, OpcodeALU,
};
use crate::u4;

const VF: u4 = u4::MAX;

impl Chip8 {
    pub(crate) fn execute(&mut self, opcode: Opcode) -> Result<Chip8Result, Chip8Error> {
        self.pc = self.pc.wrapping_add(2);

        match opcode {
            Opcode::ClearDisplay => {
                self.display.clear();
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                self.pc = nnn.wrapping_add(self.registers.get(u4::new(0)).into());
            }
            Opcode::Call { nnn } => {
                self.stack.push(self.pc)?;
                self.pc = nnn;
            }
            Opcode::Return => {
                self.pc = self.stack.pop()?;
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                let skip = self.registers.get(x) == nn;
                self.skip_if(skip);
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                let skip = self.registers.get(x) != nn;
                self.skip_if(skip);
            }
            Opcode::SkipRegEqualReg { x, y } => {
                let skip = self.registers.get(x) == self.registers.get(y);
                self.skip_if(skip);
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                let skip = self.registers.get(x) != self.registers.get(y);
                self.skip_if(skip);
            }
            Opcode::SetRegImm { x, nn } => {
                self.registers.set(x, nn);
            }
            Opcode::AddRegImm { x, nn } => {
                let value = self.registers.get(x).wrapping_add(nn);
                self.registers.set(x, value);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = self.rng.random();
                self.registers.set(x, rand_byte & nn);
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.registers.get(x).into());
            }
            Opcode::Draw { x, y, n } => {
                return self.execute_draw(x, y, n);
            }
            Opcode::SkipIfPressed { x } => {
                let key = u4::from_low_bits(self.registers.get(x));
                let skip = self.keypad.is_down(key);
                self.skip_if(skip);
            }
            Opcode::SkipIfNotPressed { x } => {
                let key = u4::from_low_bits(self.registers.get(x));
                let skip = !self.keypad.is_down(key);
                self.skip_if(skip);
            }
            Opcode::WaitForKey { x } => {
                // PC already points past this instruction; resumed by `key_down`
                self.state = ExecState::AwaitingKey { x };
                return Ok(Chip8Result::AwaitingKey);
            }
            Opcode::ReadDelayTimer { x } => {
                self.registers.set(x, self.timers.delay);
            }
            Opcode::SetDelayTimer { x } => {
                self.timers.delay = self.registers.get(x);
            }
            Opcode::SetSoundTimer { x } => {
                self.timers.sound = self.registers.get(x);
            }
            Opcode::FontChar { x } => {
                let digit = u16::from(self.registers.get(x));
                self.i = FONT_START_ADDRESS as u16 + digit * FONT_GLYPH_SIZE as u16;
            }
            Opcode::BCD { x } => {
                let value = self.registers.get(x);
                self.check_index_range(3)?;
                self.memory.write(self.index_offset(0)?, value / 100)?;
                self.memory.write(self.index_offset(1)?, (value / 10) % 10)?;
                self.memory.write(self.index_offset(2)?, value % 10)?;
            }
            Opcode::StoreRegs { x } => {
                self.check_index_range(u16::from(x) + 1)?;
                for reg in 0..=x.value() {
                    let value = self.registers.get(u4::new(reg));
                    self.memory.write(self.index_offset(reg.into())?, value)?;
                }
                self.finish_block_op(x);
            }
            Opcode::LoadRegs { x } => {
                self.check_index_range(u16::from(x) + 1)?;
                for reg in 0..=x.value() {
                    let value = self.memory.read(self.index_offset(reg.into())?)?;
                    self.registers.set(u4::new(reg), value);
                }
                self.finish_block_op(x);
            }
            Opcode::Unknown(opcode) => {
                let address = self.pc.wrapping_sub(2);
                match self.invalid_opcode_policy {
                    InvalidOpcodePolicy::Halt => {
                        return Err(Chip8Error::InvalidOpcode { opcode, address });
                    }
                    InvalidOpcodePolicy::Skip => {
                        warn!("Skipping invalid opcode {opcode:#06X} at {address:#05X}");
                    }
                }
            }
        };

        Ok(Chip8Result::Continue)
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        match op {
            OpcodeALU::Set => {
                let value = self.registers.get(y);
                self.registers.set(x, value);
            }
            OpcodeALU::Or => {
                let value = self.registers.get(x) | self.registers.get(y);
                self.registers.set(x, value);
            }
            OpcodeALU::And => {
                let value = self.registers.get(x) & self.registers.get(y);
                self.registers.set(x, value);
            }
            OpcodeALU::Xor => {
                let value = self.registers.get(x) ^ self.registers.get(y);
                self.registers.set(x, value);
            }
            OpcodeALU::Add => {
                let (res, overflow) = self.registers.get(x).overflowing_add(self.registers.get(y));
                self.registers.set(x, res);
                self.registers.set(VF, overflow as u8);
            }
            // Subtractions and shifts write VF before Vx, so the result wins when x = F
            OpcodeALU::Sub => {
                let (res, borrow) = self.registers.get(x).overflowing_sub(self.registers.get(y));
                self.registers.set(VF, !borrow as u8); // Notice that borrow is inverted
                self.registers.set(x, res);
            }
            OpcodeALU::SubReverse => {
                let (res, borrow) = self.registers.get(y).overflowing_sub(self.registers.get(x));
                self.registers.set(VF, !borrow as u8);
                self.registers.set(x, res);
            }
            OpcodeALU::ShiftRight => {
                let source = self.shift_source(x, y);
                self.registers.set(VF, source & 1);
                self.registers.set(x, source >> 1);
            }
            OpcodeALU::ShiftLeft => {
                let source = self.shift_source(x, y);
                self.registers.set(VF, source >> 7);
                self.registers.set(x, source << 1);
            }
        }
    }

    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Result<Chip8Result, Chip8Error> {
        // No wraparound: a set bit past the right or bottom edge is an error
        let x_pos = self.registers.get(x) as usize;
        let y_pos = self.registers.get(y) as usize;

        let mut any_erased = false;
        for row in 0..n.value() {
            let sprite_byte = self.memory.read(self.index_offset(row.into())?)?;

            for col in 0..8 {
                // If current sprite bit is non-zero
                if (sprite_byte & (0x80 >> col)) != 0 {
                    any_erased |= self
                        .display
                        .xor_pixel(x_pos + col, y_pos + usize::from(row))?;
                }
            }
        }

        self.registers.set(VF, any_erased as u8);
        Ok(Chip8Result::WaitForNextFrame)
    }

    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.pc = self.pc.wrapping_add(2);
        }
    }

    fn shift_source(&mut self, x: u4, y: u4) -> u8 {
        if self.compat.shift_uses_vy {
            self.registers.get(y)
        } else {
            self.registers.get(x)
        }
    }

    fn finish_block_op(&mut self, x: u4) {
        if self.compat.increment_i_after_block_op {
            self.i = self.i.wrapping_add(u16::from(x) + 1);
        }
    }

    /// Fails unless all of `I..I + len` is addressable, before anything is transferred.
    fn check_index_range(&self, len: u16) -> Result<(), Chip8Error> {
        if usize::from(self.i) + usize::from(len) > MEMORY_SIZE {
            let address = self.i.max(MEMORY_SIZE as u16);
            return Err(Chip8Error::MemoryOutOfRange { address });
        }
        Ok(())
    }

    /// Address `I + offset`, rejecting overflow of the 16-bit index.
    fn index_offset(&self, offset: u16) -> Result<u16, Chip8Error> {
        self.i
            .checked_add(offset)
            .ok_or(Chip8Error::MemoryOutOfRange { address: self.i })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::{CompatibilityConfig, ErrorKind};

    fn vm_with(compat: CompatibilityConfig, rom: &[u8]) -> Chip8 {
        let mut chip8 = Chip8::new(compat);
        chip8.load(rom).unwrap();
        chip8
    }

    fn run(chip8: &mut Chip8, steps: usize) {
        for _ in 0..steps {
            chip8.step(0.0).unwrap();
        }
    }

    #[test]
    fn load_then_add_immediate() {
        let mut chip8 = vm_with(CompatibilityConfig::default(), &[0x60, 0x05, 0x70, 0x03]);
        run(&mut chip8, 2);
        assert_eq!(chip8.v()[0], 8);
        assert_eq!(chip8.pc(), 0x204);
    }

    #[test]
    fn add_immediate_wraps_without_touching_vf() {
        let mut chip8 = vm_with(
            CompatibilityConfig::default(),
            &[0x60, 0xFF, 0x70, 0x02],
        );
        run(&mut chip8, 2);
        assert_eq!(chip8.v()[0], 1);
        assert_eq!(chip8.v()[0xF], 0);
    }

    #[test]
    fn add_sets_carry() {
        let rom = [0x60, 250, 0x61, 10, 0x80, 0x14];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.v()[0], 4);
        assert_eq!(chip8.v()[0xF], 1);

        let rom = [0x60, 10, 0x61, 10, 0x80, 0x14];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.v()[0], 20);
        assert_eq!(chip8.v()[0xF], 0);
    }

    #[test]
    fn sub_and_subn_treat_equal_operands_as_no_borrow() {
        let rom = [0x60, 7, 0x61, 7, 0x80, 0x15];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.v()[0], 0);
        assert_eq!(chip8.v()[0xF], 1);

        let rom = [0x60, 7, 0x61, 7, 0x80, 0x17];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.v()[0], 0);
        assert_eq!(chip8.v()[0xF], 1);
    }

    #[test]
    fn sub_with_borrow_clears_vf() {
        let rom = [0x60, 1, 0x61, 2, 0x80, 0x15];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.v()[0], 0xFF);
        assert_eq!(chip8.v()[0xF], 0);
    }

    #[test]
    fn shift_right_uses_vx_without_quirk() {
        let rom = [0x60, 0b0000_0011, 0x61, 0b0000_0010, 0x80, 0x16];
        let mut chip8 = vm_with(CompatibilityConfig::modern(), &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.v()[0], 1);
        assert_eq!(chip8.v()[0xF], 1);
    }

    #[test]
    fn shift_right_uses_vy_with_quirk() {
        let rom = [0x60, 0b0000_0011, 0x61, 0b0000_0010, 0x80, 0x16];
        let compat = CompatibilityConfig {
            shift_uses_vy: true,
            ..CompatibilityConfig::modern()
        };
        let mut chip8 = vm_with(compat, &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.v()[0], 1);
        assert_eq!(chip8.v()[0xF], 0);
    }

    #[test]
    fn shift_left_reports_msb() {
        let rom = [0x60, 0b1000_0001, 0x80, 0x0E];
        let mut chip8 = vm_with(CompatibilityConfig::modern(), &rom);
        run(&mut chip8, 2);
        assert_eq!(chip8.v()[0], 0b0000_0010);
        assert_eq!(chip8.v()[0xF], 1);
    }

    #[test]
    fn add_carry_wins_when_vf_is_the_destination() {
        let rom = [0x6F, 200, 0x61, 100, 0x8F, 0x14];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.v()[0xF], 1);
    }

    #[test]
    fn sub_result_wins_when_vf_is_the_destination() {
        // VF = 9; V1 = 3; VF -= V1
        let rom = [0x6F, 9, 0x61, 3, 0x8F, 0x15];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.v()[0xF], 6);

        // VF = 3; V1 = 9; VF = V1 - VF
        let rom = [0x6F, 3, 0x61, 9, 0x8F, 0x17];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.v()[0xF], 6);
    }

    #[test]
    fn shift_result_wins_when_vf_is_the_destination() {
        let mut chip8 = vm_with(CompatibilityConfig::modern(), &[0x6F, 6, 0x8F, 0x06]);
        run(&mut chip8, 2);
        assert_eq!(chip8.v()[0xF], 3);

        let mut chip8 = vm_with(CompatibilityConfig::modern(), &[0x6F, 0x81, 0x8F, 0x0E]);
        run(&mut chip8, 2);
        assert_eq!(chip8.v()[0xF], 0x02);
    }

    #[test]
    fn bitwise_ops() {
        let rom = [
            0x60, 0b1100, 0x61, 0b1010, // V0, V1
            0x82, 0x00, 0x82, 0x11, // V2 = V0 | V1
            0x83, 0x00, 0x83, 0x12, // V3 = V0 & V1
            0x84, 0x00, 0x84, 0x13, // V4 = V0 ^ V1
        ];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 8);
        assert_eq!(chip8.v()[2], 0b1110);
        assert_eq!(chip8.v()[3], 0b1000);
        assert_eq!(chip8.v()[4], 0b0110);
    }

    #[test]
    fn skips_advance_pc_by_four() {
        let rom = [0x60, 0x05, 0x30, 0x05, 0x00, 0x00, 0x40, 0x05, 0x61, 0x01];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 2);
        assert_eq!(chip8.pc(), 0x206);
        run(&mut chip8, 2);
        assert_eq!(chip8.pc(), 0x20A);
        assert_eq!(chip8.v()[1], 1);
    }

    #[test]
    fn register_compare_skips() {
        let rom = [0x60, 3, 0x61, 3, 0x50, 0x10, 0xFF, 0xFF, 0x90, 0x10, 0x62, 9];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 5);
        assert_eq!(chip8.v()[2], 9);
    }

    #[test]
    fn jump_with_offset_adds_v0() {
        let rom = [0x60, 0x04, 0xB3, 0x00];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 2);
        assert_eq!(chip8.pc(), 0x304);
    }

    #[test]
    fn random_is_masked_and_reproducible() {
        let rom = [0xC0, 0x0F, 0xC1, 0x00];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        chip8.seed_rng(7);
        run(&mut chip8, 2);
        let first = chip8.v()[0];
        assert!(first <= 0x0F);
        assert_eq!(chip8.v()[1], 0);

        chip8.reset();
        chip8.seed_rng(7);
        run(&mut chip8, 1);
        assert_eq!(chip8.v()[0], first);
    }

    #[test]
    fn font_char_points_at_glyph() {
        let rom = [0x60, 0x0A, 0xF0, 0x29];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 2);
        assert_eq!(chip8.i(), 50);
        assert_eq!(chip8.memory().read(chip8.i()), Ok(0xF0));
    }

    #[test]
    fn bcd_digits() {
        let rom = [0x60, 255, 0xA3, 0x00, 0xF0, 0x33, 0x60, 0, 0xA3, 0x10, 0xF0, 0x33];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 3);
        assert_eq!(chip8.memory().slice(0x300, 3), &[2, 5, 5]);
        run(&mut chip8, 3);
        assert_eq!(chip8.memory().slice(0x310, 3), &[0, 0, 0]);
    }

    #[test]
    fn bcd_past_end_of_memory_halts() {
        let rom = [0xAF, 0xFE, 0xF0, 0x33];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 1);
        assert_eq!(
            chip8.step(0.0),
            Err(Chip8Error::MemoryOutOfRange { address: 0x1000 })
        );
    }

    #[test]
    fn partial_transfers_past_end_of_memory_write_nothing() {
        // V0 = 123; I = 0xFFE; BCD
        let rom = [0x60, 123, 0xAF, 0xFE, 0xF0, 0x33];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 2);
        assert!(chip8.step(0.0).is_err());
        assert_eq!(chip8.memory().slice(0xFFE, 2), &[0, 0]);

        // V0 = 1; V1 = 2; V2 = 3; I = 0xFFE; store V0..V2
        let rom = [0x60, 1, 0x61, 2, 0x62, 3, 0xAF, 0xFE, 0xF2, 0x55];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 4);
        assert_eq!(
            chip8.step(0.0),
            Err(Chip8Error::MemoryOutOfRange { address: 0x1000 })
        );
        assert_eq!(chip8.memory().slice(0xFFE, 2), &[0, 0]);
        assert_eq!(chip8.i(), 0xFFE);
    }

    #[test]
    fn index_add_and_timer_registers() {
        let rom = [
            0x60, 0x10, 0xA1, 0x00, 0xF0, 0x1E, // I = 0x110
            0xF0, 0x15, 0xF0, 0x18, // DT = ST = 0x10
            0xF1, 0x07, // V1 = DT
        ];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 6);
        assert_eq!(chip8.i(), 0x110);
        assert_eq!(chip8.delay_timer(), 0x10);
        assert_eq!(chip8.sound_timer(), 0x10);
        assert_eq!(chip8.v()[1], 0x10);
        assert!(chip8.should_beep());
    }

    #[test]
    fn key_skips_read_keypad() {
        let rom = [0x60, 0x05, 0xE0, 0x9E, 0xFF, 0xFF, 0xE0, 0xA1, 0x61, 0x01];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        chip8.key_down(u4::new(5));
        run(&mut chip8, 3);
        assert_eq!(chip8.pc(), 0x208);
        chip8.key_up(u4::new(5));
        chip8.set_pc(0x206);
        run(&mut chip8, 1);
        assert_eq!(chip8.pc(), 0x20A);
    }

    #[test]
    fn draw_sets_collision_only_when_erasing() {
        // I = font glyph 0, draw it twice at (0, 0)
        let rom = [0xA0, 0x00, 0xD0, 0x05, 0xD0, 0x05];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 1);
        assert_eq!(chip8.step(0.0), Ok(Chip8Result::WaitForNextFrame));
        assert_eq!(chip8.v()[0xF], 0);
        assert!(chip8.get_display_pixel(0, 0));
        assert!(!chip8.get_display_pixel(1, 1));

        run(&mut chip8, 1);
        assert_eq!(chip8.v()[0xF], 1);
        assert!(chip8.display().snapshot().iter().flatten().all(|p| !p));
    }

    #[test]
    fn draw_past_right_edge_is_out_of_range() {
        let rom = [0x60, 62, 0xA0, 0x00, 0xD0, 0x11];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 2);
        let err = chip8.step(0.0).unwrap_err();
        assert_eq!(err, Chip8Error::PixelOutOfRange { x: 64, y: 0 });
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn clear_display() {
        let rom = [0xA0, 0x00, 0xD0, 0x05, 0x00, 0xE0];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        run(&mut chip8, 3);
        assert!(chip8.display().snapshot().iter().flatten().all(|p| !p));
    }

    #[test]
    fn block_store_load_round_trip() {
        let rom = [
            0x60, 1, 0x61, 2, 0x62, 3, 0x63, 4, // V0..V3
            0xA4, 0x00, 0xF3, 0x55, // store at 0x400
            0xA4, 0x00, 0xF3, 0x65, // load from 0x400
        ];
        for increment in [false, true] {
            let compat = CompatibilityConfig {
                increment_i_after_block_op: increment,
                ..CompatibilityConfig::modern()
            };
            let mut chip8 = vm_with(compat, &rom);
            run(&mut chip8, 6);
            assert_eq!(chip8.memory().slice(0x400, 4), &[1, 2, 3, 4]);
            assert_eq!(chip8.i(), if increment { 0x404 } else { 0x400 });

            for reg in 0..4 {
                chip8.set_v(u4::new(reg), 0);
            }
            run(&mut chip8, 2);
            assert_eq!(&chip8.v()[..4], &[1, 2, 3, 4]);
            assert_eq!(chip8.i(), if increment { 0x404 } else { 0x400 });
        }
    }

    #[test]
    fn call_on_full_stack_overflows() {
        // 0x200: CALL 0x200, recursing until the stack is full
        let mut chip8 = vm_with(CompatibilityConfig::default(), &[0x22, 0x00]);
        run(&mut chip8, 16);
        assert_eq!(chip8.sp(), 16);
        assert_eq!(
            chip8.step(0.0),
            Err(Chip8Error::StackOverflow { address: 0x202 })
        );
    }

    #[test]
    fn skip_policy_continues_past_invalid_opcode() {
        let rom = [0x51, 0x23, 0x60, 0x09];
        let mut chip8 = vm_with(CompatibilityConfig::default(), &rom);
        chip8.set_invalid_opcode_policy(InvalidOpcodePolicy::Skip);
        assert_eq!(chip8.step(0.0), Ok(Chip8Result::Continue));
        run(&mut chip8, 1);
        assert_eq!(chip8.v()[0], 9);
    }
}

use std::collections::HashSet;

use super::{Chip8, Chip8Error, Chip8Result};
use crate::u4;

pub const DEFAULT_CPU_HZ: f32 = 700.0;
pub const MIN_SPEED: f32 = 0.1;
pub const MAX_SPEED: f32 = 10.0;

/// High-level emulator runner that manages timing internally.
pub struct Chip8Runner {
    chip8: Chip8,
    cpu_hz: f32,
    speed: f32,
    cpu_dt_accumulator: f32,
    /// Wall-clock time not yet handed to `Chip8::step`
    pending_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip8RunnerResult {
    HitBreakpoint,
    Ok,
}

impl Chip8Runner {
    pub fn new(chip8: Chip8) -> Self {
        Self {
            chip8,
            cpu_hz: DEFAULT_CPU_HZ,
            speed: 1.0,
            cpu_dt_accumulator: 0.0,
            pending_ms: 0.0,
        }
    }

    pub fn with_cpu_hz(mut self, cpu_hz: f32) -> Self {
        self.cpu_hz = cpu_hz.max(1.0);
        self
    }

    /// Update emulator by delta time (seconds).
    ///
    /// Runs `cpu_hz * speed` instructions per second of `dt`. All elapsed time is
    /// passed through to the VM, so the 60Hz timers do not depend on the speed.
    /// Returns early if a frame has to be rendered before the next CPU cycle.
    pub fn update(&mut self, dt: f32) -> Result<Chip8RunnerResult, Chip8Error> {
        self.update_with_breakpoints(dt, None)
    }

    /// Like `update` but checks for breakpoints after each CPU cycle.
    pub fn update_with_breakpoints(
        &mut self,
        dt: f32,
        breakpoints: Option<&HashSet<u16>>,
    ) -> Result<Chip8RunnerResult, Chip8Error> {
        let cpu_time_step = 1.0 / (self.cpu_hz * self.speed);

        self.pending_ms += f64::from(dt) * 1000.0;
        self.cpu_dt_accumulator += dt;

        while self.cpu_dt_accumulator >= cpu_time_step {
            self.cpu_dt_accumulator -= cpu_time_step;

            let elapsed_ms = std::mem::take(&mut self.pending_ms);
            let cpu_result = self.chip8.step(elapsed_ms)?;

            if let Some(breakpoints) = &breakpoints
                && breakpoints.contains(&self.chip8.pc())
            {
                self.cpu_dt_accumulator = 0.0;
                return Ok(Chip8RunnerResult::HitBreakpoint);
            }

            match cpu_result {
                Chip8Result::WaitForNextFrame => {
                    // If we need to wait for the next frame we stop executing cycles.
                    // We clear the accumulator to avoid "catching up" in the next frame.
                    self.cpu_dt_accumulator = 0.0;
                    break;
                }
                Chip8Result::AwaitingKey | Chip8Result::Continue => {}
            }
        }

        Ok(Chip8RunnerResult::Ok)
    }

    /// Executes exactly one instruction, ignoring the speed setting.
    pub fn single_step(&mut self) -> Result<Chip8Result, Chip8Error> {
        let elapsed_ms = std::mem::take(&mut self.pending_ms);
        self.chip8.step(elapsed_ms)
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Sets the emulation speed multiplier, clamped to 0.1 - 10.0.
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
    }

    /// Drops accumulated time, e.g. after the host was paused.
    pub fn discard_elapsed(&mut self) {
        self.cpu_dt_accumulator = 0.0;
        self.pending_ms = 0.0;
    }

    /// Returns true if the sound timer is active, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.chip8.should_beep()
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.chip8.set_key(key, pressed)
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn get_display_pixel(&self, y: usize, x: usize) -> bool {
        self.chip8.get_display_pixel(y, x)
    }

    pub fn chip8_ref(&self) -> &Chip8 {
        &self.chip8
    }

    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        &mut self.chip8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner_with(rom: &[u8]) -> Chip8Runner {
        let mut chip8 = Chip8::default();
        chip8.load(rom).unwrap();
        Chip8Runner::new(chip8).with_cpu_hz(100.0)
    }

    #[test]
    fn runs_cpu_hz_instructions_per_second() {
        // 0x200: ADD V0, 1; JP 0x200
        let mut runner = runner_with(&[0x70, 0x01, 0x12, 0x00]);
        runner.update(0.105).unwrap();
        assert_eq!(runner.chip8_ref().v()[0], 5);
    }

    #[test]
    fn speed_scales_instruction_rate_but_not_timers() {
        // 0x200: DT = 60 (V0 preset), then ADD V1, 1; JP 0x202
        let mut runner = runner_with(&[0x60, 60, 0xF0, 0x15, 0x71, 0x01, 0x12, 0x04]);
        runner.set_speed(2.0);

        for _ in 0..10 {
            runner.update(0.1).unwrap();
        }

        let chip8 = runner.chip8_ref();
        assert!(chip8.v()[1] > 90, "executed {} adds", chip8.v()[1]);
        // 900 ms elapse after DT is set: 54 ticks
        assert!(
            (5..=7).contains(&chip8.delay_timer()),
            "delay timer {}",
            chip8.delay_timer()
        );
    }

    #[test]
    fn draw_ends_the_frame() {
        let mut runner = runner_with(&[0xD0, 0x01, 0x70, 0x01]);
        runner.update(1.0).unwrap();
        assert_eq!(runner.chip8_ref().pc(), 0x202);
    }

    #[test]
    fn stops_on_breakpoint() {
        let mut runner = runner_with(&[0x60, 0x01, 0x61, 0x02, 0x62, 0x03]);
        let breakpoints = HashSet::from([0x204]);
        assert_eq!(
            runner.update_with_breakpoints(1.0, Some(&breakpoints)),
            Ok(Chip8RunnerResult::HitBreakpoint)
        );
        assert_eq!(runner.chip8_ref().pc(), 0x204);
    }

    #[test]
    fn speed_is_clamped() {
        let mut runner = runner_with(&[]);
        runner.set_speed(100.0);
        assert_eq!(runner.speed(), MAX_SPEED);
        runner.set_speed(0.0);
        assert_eq!(runner.speed(), MIN_SPEED);
    }
}

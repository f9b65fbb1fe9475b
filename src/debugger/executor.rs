use std::collections::HashSet;

use super::commands::{BreakpointAction, Command, CommandError, CommandResult, SetTarget};
use crate::emu::{
    Chip8Error, Chip8Runner, Chip8RunnerResult, Display, ExecState, MEMORY_SIZE, Memory,
    RegisterAccessLog, StateDump,
};

pub struct Executor {
    is_running: bool,
    runner: Chip8Runner,
    breakpoints: HashSet<u16>,
    access_log: RegisterAccessLog,
}

impl Executor {
    pub fn new(mut runner: Chip8Runner) -> Self {
        let access_log = RegisterAccessLog::new();
        runner
            .chip8_mut()
            .set_register_observer(Some(Box::new(access_log.clone())));

        Self {
            is_running: false,
            runner,
            breakpoints: Default::default(),
            access_log,
        }
    }

    pub fn poll(&mut self, dt: f32) -> Result<Chip8RunnerResult, Chip8Error> {
        if !self.is_running {
            return Ok(Chip8RunnerResult::Ok);
        }

        let result = self
            .runner
            .update_with_breakpoints(dt, Some(&self.breakpoints));

        if matches!(result, Err(_) | Ok(Chip8RunnerResult::HitBreakpoint)) {
            self.is_running = false;
        }

        result
    }

    pub fn execute(&mut self, command: Command) -> Result<CommandResult, CommandError> {
        match command {
            Command::Run => {
                self.run();
                Ok(CommandResult::Ok)
            }
            Command::Pause => {
                self.pause();
                Ok(CommandResult::Ok)
            }
            Command::Step => self.step(),
            Command::Breakpoint { action } => Ok(self.handle_breakpoint(action)),
            Command::Set { target, value } => self.handle_set(target, value),
            Command::Mem { start, len } => Ok(self.handle_mem(start, len)),
            Command::Reset => {
                self.runner.chip8_mut().reset();
                self.access_log.clear();
                Ok(CommandResult::Ok)
            }
            Command::Dump => Ok(CommandResult::Dump(
                self.runner.chip8_ref().dump_state().to_string(),
            )),
            Command::Quit => Ok(CommandResult::Quit),
        }
    }

    pub fn run(&mut self) {
        self.runner.discard_elapsed();
        self.is_running = true;
    }

    pub fn pause(&mut self) {
        self.is_running = false;
    }

    /// Executes one instruction; the access log then holds only that instruction's accesses.
    pub fn step(&mut self) -> Result<CommandResult, CommandError> {
        self.access_log.clear();
        self.runner.single_step()?;
        Ok(CommandResult::Ok)
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn exec_state(&self) -> ExecState {
        self.runner.chip8_ref().exec_state()
    }

    pub fn get_display(&self) -> &Display<bool> {
        self.runner.chip8_ref().display().snapshot()
    }

    pub fn get_pc(&self) -> u16 {
        self.runner.chip8_ref().pc()
    }

    pub fn get_v(&self) -> &[u8; 16] {
        self.runner.chip8_ref().v()
    }

    pub fn get_memory(&self) -> &Memory {
        self.runner.chip8_ref().memory()
    }

    pub fn dump_state(&self) -> StateDump {
        self.runner.chip8_ref().dump_state()
    }

    /// The error that halted the VM, if any.
    pub fn fault(&self) -> Option<&Chip8Error> {
        self.runner.chip8_ref().fault()
    }

    pub fn breakpoints(&self) -> &HashSet<u16> {
        &self.breakpoints
    }

    pub fn get_keypad(&self) -> &[bool; 16] {
        self.runner.chip8_ref().keypad()
    }

    pub fn access_log(&self) -> &RegisterAccessLog {
        &self.access_log
    }

    pub fn runner_mut(&mut self) -> &mut Chip8Runner {
        &mut self.runner
    }

    fn handle_breakpoint(&mut self, action: BreakpointAction) -> CommandResult {
        match action {
            BreakpointAction::Set { addr } => {
                self.breakpoints.insert(addr);
            }
            BreakpointAction::Clear { addr } => {
                self.breakpoints.remove(&addr);
            }
            BreakpointAction::ClearAll => {
                self.breakpoints.clear();
            }
            BreakpointAction::List => {
                let mut bps: Vec<u16> = self.breakpoints.iter().cloned().collect();
                bps.sort();
                return CommandResult::Breakpoints(bps);
            }
        };

        CommandResult::Ok
    }

    fn handle_set(&mut self, target: SetTarget, value: u16) -> Result<CommandResult, CommandError> {
        let chip8 = self.runner.chip8_mut();

        match target {
            SetTarget::V(reg) => {
                let value = u8::try_from(value).map_err(|_| CommandError::ValueOutOfRange)?;
                chip8.set_v(reg, value);
            }
            SetTarget::I => {
                chip8.set_i(value);
            }
            SetTarget::Pc => {
                if value as usize >= MEMORY_SIZE {
                    return Err(CommandError::ValueOutOfRange);
                }
                chip8.set_pc(value);
            }
        }

        Ok(CommandResult::Ok)
    }

    fn handle_mem(&self, start: u16, len: u16) -> CommandResult {
        CommandResult::MemDump {
            data: self.runner.chip8_ref().memory().slice(start, len).to_vec(),
            offset: start,
        }
    }
}

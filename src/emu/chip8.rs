use log::{debug, error, trace};
use rand::{SeedableRng, rngs::StdRng};

use super::{
    Chip8Error, Chip8Result, CompatibilityConfig, ExecState, FONT, FONT_START_ADDRESS, Framebuffer,
    InvalidOpcodePolicy, Keypad, Memory, Opcode, ROM_START_ADDRESS, RegisterObserver, Registers,
    Stack, StateDump, Timers,
};
use crate::u4;

/// Highest address an instruction can be fetched from.
pub const PC_MAX: u16 = 0xFFE;

/// CHIP-8 virtual machine state
pub struct Chip8 {
    /// 4KB memory, font at 0x000 and program from 0x200
    pub(crate) memory: Memory,
    /// Memory as it was right after the last load, restored by `reset`
    pub(crate) initial_memory: Memory,
    /// Display buffer: 64x32 monochrome pixels
    pub(crate) display: Framebuffer,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) registers: Registers,
    /// Call stack for subroutine returns
    pub(crate) stack: Stack,
    /// Delay and sound timers, both counting down at 60Hz
    pub(crate) timers: Timers,

    /// Keypad state: 16 keys (true = pressed)
    pub(crate) keypad: Keypad,
    pub(crate) state: ExecState,
    /// The error that halted the VM, if any
    pub(crate) fault: Option<Chip8Error>,
    /// Last fetched opcode
    pub(crate) opcode: u16,

    pub(crate) compat: CompatibilityConfig,
    pub(crate) invalid_opcode_policy: InvalidOpcodePolicy,
    pub(crate) rng: StdRng,
}

impl Chip8 {
    pub fn new(compat: CompatibilityConfig) -> Self {
        let mut memory = Memory::new();
        memory.load_font(&FONT);
        debug!("Font loaded at {FONT_START_ADDRESS:#05X}, {} bytes", FONT.len());

        Chip8 {
            initial_memory: memory.clone(),
            memory,
            display: Framebuffer::new(),
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            registers: Registers::default(),
            stack: Stack::default(),
            timers: Timers::default(),
            keypad: Keypad::default(),
            state: ExecState::Running,
            fault: None,
            opcode: 0,
            compat,
            invalid_opcode_policy: InvalidOpcodePolicy::default(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Loads a program image at 0x200 and resets the VM.
    ///
    /// On error the VM is left exactly as it was.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        let mut memory = Memory::new();
        memory.load_font(&FONT);
        memory.load(rom)?;

        debug!("Loaded {} byte program", rom.len());
        self.initial_memory = memory;
        self.reset();

        Ok(())
    }

    /// Restores the power-on state with the last loaded program. Idempotent.
    pub fn reset(&mut self) {
        self.memory = self.initial_memory.clone();
        self.display.clear();
        self.pc = ROM_START_ADDRESS as u16;
        self.i = 0;
        self.registers.clear();
        self.stack.clear();
        self.timers.reset();
        self.keypad.release_all();
        self.state = ExecState::Running;
        self.fault = None;
        self.opcode = 0;

        debug!("VM reset");
    }

    /// Executes one instruction, then feeds `elapsed_ms` of wall-clock time to the timers.
    ///
    /// While awaiting a key only the timers advance. The first error halts the VM;
    /// every later call returns the same error until `reset`.
    pub fn step(&mut self, elapsed_ms: f64) -> Result<Chip8Result, Chip8Error> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }

        let result = match self.state {
            ExecState::AwaitingKey { .. } => Ok(Chip8Result::AwaitingKey),
            ExecState::Running | ExecState::Halted => self.cpu_cycle(),
        };

        match result {
            Ok(result) => {
                self.timers.advance(elapsed_ms);
                Ok(result)
            }
            Err(e) => {
                error!("VM halted: {e}");
                self.state = ExecState::Halted;
                self.fault = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Fetch, decode, execute.
    fn cpu_cycle(&mut self) -> Result<Chip8Result, Chip8Error> {
        let opcode = self.fetch()?;
        self.opcode = opcode;
        trace!("{:#05X}: {:04X}", self.pc, opcode);

        self.execute(Opcode::decode(opcode))
    }

    /// Fetches the 16-bit big-endian opcode at PC.
    fn fetch(&self) -> Result<u16, Chip8Error> {
        if self.pc % 2 != 0 || !(ROM_START_ADDRESS as u16..=PC_MAX).contains(&self.pc) {
            return Err(Chip8Error::PcOutOfRange { pc: self.pc });
        }

        let high = self.memory.read(self.pc)?;
        let low = self.memory.read(self.pc + 1)?;

        Ok(u16::from_be_bytes([high, low]))
    }

    /// Host key-down event. Resolves a pending Fx0A wait with this key.
    ///
    /// Repeats for a key that is already down are ignored, so a key held
    /// since before the wait only counts once it is released and pressed again.
    pub fn key_down(&mut self, key: u4) {
        let was_down = self.keypad.is_down(key);
        self.keypad.set(key, true);
        if was_down {
            return;
        }

        if let ExecState::AwaitingKey { x } = self.state {
            trace!("Key {key} resolves wait into V{x}");
            self.registers.set(x, key.value());
            self.state = ExecState::Running;
        }
    }

    /// Host key-up event.
    pub fn key_up(&mut self, key: u4) {
        self.keypad.set(key, false);
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        if pressed {
            self.key_down(key);
        } else {
            self.key_up(key);
        }
    }

    pub fn is_key_down(&self, key: u4) -> bool {
        self.keypad.is_down(key)
    }

    /// Returns true if the sound timer is greater than zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.timers.is_tone_active()
    }

    pub fn is_awaiting_key(&self) -> bool {
        matches!(self.state, ExecState::AwaitingKey { .. })
    }

    pub fn exec_state(&self) -> ExecState {
        self.state
    }

    pub fn fault(&self) -> Option<&Chip8Error> {
        self.fault.as_ref()
    }

    pub fn compat(&self) -> CompatibilityConfig {
        self.compat
    }

    pub fn set_compat(&mut self, compat: CompatibilityConfig) {
        self.compat = compat;
    }

    pub fn set_invalid_opcode_policy(&mut self, policy: InvalidOpcodePolicy) {
        self.invalid_opcode_policy = policy;
    }

    /// Reseeds the Cxnn random source, making it reproducible.
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Attaches a hook that sees every instruction-level register access.
    pub fn set_register_observer(&mut self, observer: Option<Box<dyn RegisterObserver>>) {
        self.registers.set_observer(observer);
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn get_display_pixel(&self, y: usize, x: usize) -> bool {
        self.display.get(x, y)
    }

    pub fn display(&self) -> &Framebuffer {
        &self.display
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn i(&self) -> u16 {
        self.i
    }

    pub fn set_i(&mut self, i: u16) {
        self.i = i;
    }

    pub fn v(&self) -> &[u8; 16] {
        self.registers.values()
    }

    /// Writes a register from outside the instruction stream (debuggers, tests).
    pub fn set_v(&mut self, reg: u4, value: u8) {
        self.registers.poke(reg, value);
    }

    pub fn stack(&self) -> &[u16] {
        self.stack.as_slice()
    }

    pub fn sp(&self) -> u8 {
        self.stack.sp()
    }

    pub fn delay_timer(&self) -> u8 {
        self.timers.delay
    }

    pub fn sound_timer(&self) -> u8 {
        self.timers.sound
    }

    pub fn keypad(&self) -> &[bool; 16] {
        self.keypad.state()
    }

    /// Last fetched opcode.
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    pub fn dump_state(&self) -> StateDump {
        StateDump {
            pc: self.pc,
            i: self.i,
            sp: self.stack.sp(),
            delay_timer: self.timers.delay,
            sound_timer: self.timers.sound,
            opcode: self.opcode,
            v: *self.registers.values(),
            stack: self.stack.as_slice().to_vec(),
            state: self.state,
        }
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new(CompatibilityConfig::default())
    }
}

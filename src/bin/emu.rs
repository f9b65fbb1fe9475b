use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use pixels::{Pixels, SurfaceTexture};
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source, source::SquareWave};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use chip8_vm::{
    emu::{
        Chip8, Chip8Runner, CompatibilityConfig, DEFAULT_CPU_HZ, DISPLAY_X, DISPLAY_Y, Display,
        ExecState, InvalidOpcodePolicy,
    },
    u4,
};

/// The rate at which pixels fade out (phosphor decay).
const DISPLAY_PHOSPHOR_RATE: f32 = 10.0;

const SPEED_STEP: f32 = 0.1;

/// Mapping from physical keyboard keys to CHIP-8 hex keypad (0x0-0xF).
const KEY_MAP: [KeyCode; 16] = [
    KeyCode::KeyX,   // 0x00
    KeyCode::Digit1, // 0x01
    KeyCode::Digit2, // 0x02
    KeyCode::Digit3, // 0x03
    KeyCode::KeyQ,   // 0x04
    KeyCode::KeyW,   // 0x05
    KeyCode::KeyE,   // 0x06
    KeyCode::KeyA,   // 0x07
    KeyCode::KeyS,   // 0x08
    KeyCode::KeyD,   // 0x09
    KeyCode::KeyY,   // 0x0A
    KeyCode::KeyC,   // 0x0B
    KeyCode::Digit4, // 0x0C
    KeyCode::KeyR,   // 0x0D
    KeyCode::KeyF,   // 0x0E
    KeyCode::KeyV,   // 0x0F
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Running,
    Paused,
    /// Only F6 advances the VM, one instruction at a time.
    Stepping,
}

struct App {
    pixels: Option<Pixels<'static>>,
    window: Option<Arc<Window>>,
    /// Stores the brightness of each pixel (0.0 to 1.0) to implement phosphor decay.
    display_float: Display<f32>,

    /// Audio output stream (must be kept alive).
    _audio_stream: OutputStream,
    audio_sink: Sink,

    runner: Chip8Runner,
    mode: RunMode,
    /// Used for delta time calculation.
    last_frame_instant: Instant,
    last_title: String,

    /// Stores the result of the application to be returned from main.
    exit_result: anyhow::Result<()>,
}

impl App {
    fn new(rom: &[u8], args: &Args) -> anyhow::Result<Self> {
        // Initialize audio
        let mut _audio_stream = OutputStreamBuilder::open_default_stream()
            .context("Failed to open audio output stream")?;
        _audio_stream.log_on_drop(false);

        let audio_sink = Sink::connect_new(_audio_stream.mixer());
        audio_sink.pause();
        audio_sink.append(SquareWave::new(440.0).amplify(0.5));

        // Initialize CHIP-8
        let mut chip8 = Chip8::new(args.compat());
        if args.lenient {
            chip8.set_invalid_opcode_policy(InvalidOpcodePolicy::Skip);
        }
        chip8
            .load(rom)
            .context("Failed to load ROM into CHIP-8 memory")?;

        let mut runner = Chip8Runner::new(chip8).with_cpu_hz(args.cpu_hz);
        runner.set_speed(args.speed);

        Ok(Self {
            pixels: None,
            window: None,
            display_float: [[0.0; DISPLAY_X]; DISPLAY_Y],

            _audio_stream,
            audio_sink,

            runner,
            mode: RunMode::Running,
            last_frame_instant: Instant::now(),
            last_title: String::new(),
            exit_result: Ok(()),
        })
    }

    fn process_display(&mut self, dt: f32) -> anyhow::Result<()> {
        let buff = self
            .pixels
            .as_mut()
            .context("Pixels surface not initialized")?
            .frame_mut();

        for (i, pxl) in buff.chunks_exact_mut(4).enumerate() {
            let x = i % DISPLAY_X;
            let y = i / DISPLAY_X;

            // We use display_float to track the "brightness" of each pixel over time.
            // This allows us to implement a phosphor decay effect where pixels fade out
            // slowly instead of turning off instantly.
            self.display_float[y][x] = if self.runner.get_display_pixel(y, x) {
                // Pixel is currently on, set to full brightness
                1.0
            } else {
                // Pixel is off, but we decay the previous brightness value based on elapsed time
                (self.display_float[y][x] - DISPLAY_PHOSPHOR_RATE * dt).max(0.0)
            };

            let rgba = [0, 0xff, 0, (self.display_float[y][x] * 255.0) as u8];
            pxl.copy_from_slice(&rgba);
        }

        Ok(())
    }

    fn title(&self) -> String {
        let chip8 = self.runner.chip8_ref();
        let state = match (chip8.exec_state(), self.mode) {
            (ExecState::Halted, _) => " [HALTED]",
            (_, RunMode::Paused) => " [PAUSED]",
            (_, RunMode::Stepping) => " [STEPPING]",
            (ExecState::AwaitingKey { .. }, RunMode::Running) => " - waiting for keypress",
            (ExecState::Running, RunMode::Running) => "",
        };

        format!("chip8-vm - speed {:.1}x{}", self.runner.speed(), state)
    }

    fn update_title(&mut self) {
        let title = self.title();
        if title != self.last_title {
            if let Some(window) = &self.window {
                window.set_title(&title);
            }
            self.last_title = title;
        }
    }

    fn run_frame(&mut self, dt: f32) {
        if self.mode != RunMode::Running || self.runner.chip8_ref().fault().is_some() {
            return;
        }

        if let Err(e) = self.runner.update(dt) {
            // The VM keeps its last state for inspection; F4 resets it.
            error!("Chip8 execution error: {e}");
            info!("State at fault:\n{}", self.runner.chip8_ref().dump_state());
        }
    }

    fn handle_shortcut(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::KeyP => {
                self.mode = match self.mode {
                    RunMode::Paused => RunMode::Running,
                    _ => RunMode::Paused,
                };
                self.runner.discard_elapsed();
            }
            KeyCode::F5 => {
                self.mode = match self.mode {
                    RunMode::Stepping => RunMode::Running,
                    _ => RunMode::Stepping,
                };
                self.runner.discard_elapsed();
            }
            KeyCode::F6 if self.mode == RunMode::Stepping => {
                if let Err(e) = self.runner.single_step() {
                    error!("Chip8 execution error: {e}");
                }
            }
            KeyCode::F7 => {
                self.runner.set_speed(self.runner.speed() - SPEED_STEP);
            }
            KeyCode::F8 => {
                self.runner.set_speed(self.runner.speed() + SPEED_STEP);
            }
            KeyCode::F4 => {
                self.runner.chip8_mut().reset();
                self.runner.discard_elapsed();
                info!("Reset");
            }
            KeyCode::Backspace => {
                info!("State dump:\n{}", self.runner.chip8_ref().dump_state());
            }
            _ => return false,
        }

        true
    }

    fn try_resumed(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = {
            let size = LogicalSize::new(DISPLAY_X as u32 * 10, DISPLAY_Y as u32 * 10);
            let min_size = LogicalSize::new(DISPLAY_X as u32, DISPLAY_Y as u32);

            Arc::new(
                event_loop
                    .create_window(
                        Window::default_attributes()
                            .with_title(self.title())
                            .with_inner_size(size)
                            .with_min_inner_size(min_size),
                    )
                    .context("Failed to create window")?,
            )
        };

        self.window = Some(window.clone());
        self.pixels = {
            let window_size = window.inner_size();
            let surface_texture =
                SurfaceTexture::new(window_size.width, window_size.height, window.clone());

            let pixels = Pixels::new(DISPLAY_X as u32, DISPLAY_Y as u32, surface_texture)
                .context("Failed to create pixels surface")?;

            window.request_redraw();
            Some(pixels)
        };

        // Avoid large dt on first frame
        self.last_frame_instant = Instant::now();
        Ok(())
    }

    fn try_window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        event: WindowEvent,
    ) -> anyhow::Result<()> {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                self.pixels
                    .as_mut()
                    .context("Pixels surface not initialized")?
                    .resize_surface(size.width, size.height)
                    .context("Failed to resize pixels surface")?;
            }

            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = (now - self.last_frame_instant).as_secs_f32();
                self.last_frame_instant = now;

                self.run_frame(dt);

                if self.runner.should_beep() && self.mode == RunMode::Running {
                    self.audio_sink.play();
                } else {
                    self.audio_sink.pause();
                }

                self.process_display(dt)?;
                self.update_title();

                self.pixels
                    .as_ref()
                    .context("Pixels surface not initialized")?
                    .render()
                    .context("Pixels render error")?;

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return Ok(());
                };

                match event.state {
                    ElementState::Pressed => {
                        if event.repeat || self.handle_shortcut(code) {
                            return Ok(());
                        }
                        if let Some(key) = KEY_MAP.iter().position(|&k| k == code) {
                            self.runner.set_key(u4::new(key as u8), true);
                        }
                    }
                    ElementState::Released => {
                        if let Some(key) = KEY_MAP.iter().position(|&k| k == code) {
                            self.runner.set_key(u4::new(key as u8), false);
                        }
                    }
                }
            }

            _ => (),
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.try_resumed(event_loop) {
            self.exit_result = Err(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.try_window_event(event_loop, event) {
            self.exit_result = Err(e);
            event_loop.exit();
        }
    }
}

/// CHIP-8 emulator written in Rust.
///
/// Keys 1-4, Q-R, A-F, Y/X/C/V map to CHIP-8 keys.
/// P pauses, F5 toggles stepping mode and F6 steps one instruction,
/// F7/F8 change the speed, F4 resets, Backspace logs the CPU state
/// and Escape exits.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,

    /// Emulation speed multiplier (0.1 - 10.0)
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Instructions per second at speed 1.0
    #[arg(long, default_value_t = DEFAULT_CPU_HZ)]
    cpu_hz: f32,

    /// Shift Vx in place for 8xy6/8xyE instead of shifting Vy into Vx
    #[arg(long)]
    shift_vx: bool,

    /// Leave I unchanged after Fx55/Fx65
    #[arg(long)]
    no_index_increment: bool,

    /// Skip invalid opcodes with a warning instead of halting
    #[arg(long)]
    lenient: bool,
}

impl Args {
    fn compat(&self) -> CompatibilityConfig {
        CompatibilityConfig {
            shift_uses_vy: !self.shift_vx,
            increment_i_after_block_op: !self.no_index_increment,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(&rom, &args).context("Failed to initialize application")?;
    event_loop
        .run_app(&mut app)
        .context("Error occurred during event loop execution")?;

    // Return the result captured during the event loop
    app.exit_result
}

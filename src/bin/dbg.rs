use std::{
    collections::VecDeque,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    DefaultTerminal,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Widget},
};

use chip8_vm::{
    debugger::{Cli, Command, CommandResult, Executor},
    emu::{
        Chip8, Chip8Runner, Chip8RunnerResult, CompatibilityConfig, DISPLAY_X, DISPLAY_Y,
        ExecState, StateDump, key_for_label,
    },
    u4,
};

// Terminals send repeated presses but no releases, so a key is released
// once no press has been seen for this long.
const KEY_RELEASE_TIMEOUT: Duration = Duration::from_millis(50);
const CONSOLE_HISTORY: usize = 200;
const CODE_ROWS: u16 = 8;
const SIDE_WIDTH: u16 = 21;
const KEYPAD_LAYOUT: [[u8; 4]; 4] = [
    [0x1, 0x2, 0x3, 0xC],
    [0x4, 0x5, 0x6, 0xD],
    [0x7, 0x8, 0x9, 0xE],
    [0xA, 0x0, 0xB, 0xF],
];

#[derive(Default)]
struct HeldKeys {
    last_seen: [Option<Instant>; 16],
}

impl HeldKeys {
    /// Records a press. Returns true if the key was not held already.
    fn press(&mut self, key: u4, now: Instant) -> bool {
        self.last_seen[key].replace(now).is_none()
    }

    fn release_expired(&mut self, now: Instant) -> Vec<u4> {
        u4::all()
            .filter(|&key| {
                let expired = self.last_seen[key]
                    .is_some_and(|seen| now.duration_since(seen) > KEY_RELEASE_TIMEOUT);
                if expired {
                    self.last_seen[key] = None;
                }
                expired
            })
            .collect()
    }
}

struct App {
    executor: Executor,
    prompt: String,
    console: VecDeque<String>,
    last_command: Option<Command>,
    held_keys: HeldKeys,
    last_tick: Instant,
    should_quit: bool,
}

impl App {
    fn new(rom: &[u8], compat: CompatibilityConfig) -> anyhow::Result<Self> {
        let mut chip8 = Chip8::new(compat);
        chip8
            .load(rom)
            .context("Failed to load ROM into CHIP-8 memory")?;

        let mut app = Self {
            executor: Executor::new(Chip8Runner::new(chip8)),
            prompt: String::new(),
            console: VecDeque::new(),
            last_command: None,
            held_keys: HeldKeys::default(),
            last_tick: Instant::now(),
            should_quit: false,
        };
        app.print(&format!("Loaded {} bytes. Type `help` for commands.", rom.len()));

        Ok(app)
    }

    fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        while !self.should_quit {
            let now = Instant::now();
            let dt = now.duration_since(self.last_tick).as_secs_f32();
            self.last_tick = now;

            match self.executor.poll(dt) {
                Ok(Chip8RunnerResult::HitBreakpoint) => {
                    let pc = self.executor.get_pc();
                    self.print(&format!("Breakpoint at {pc:03X}"));
                }
                Ok(Chip8RunnerResult::Ok) => {}
                Err(e) => self.print(&format!("Halted: {e}")),
            }

            for key in self.held_keys.release_expired(now) {
                self.executor.runner_mut().set_key(key, false);
            }

            terminal.draw(|frame| frame.render_widget(&*self, frame.area()))?;

            if event::poll(Duration::from_millis(16))?
                && let Event::Key(key) = event::read()?
            {
                self.handle_key_event(key);
            }
        }

        Ok(())
    }

    fn print(&mut self, text: &str) {
        self.console.extend(text.lines().map(str::to_owned));
        while self.console.len() > CONSOLE_HISTORY {
            self.console.pop_front();
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
        } else if self.executor.is_running() {
            self.handle_running_key(key.code);
        } else if key.kind == KeyEventKind::Press {
            self.handle_prompt_key(key.code);
        }
    }

    /// While running, keys go to the CHIP-8 keypad and Esc pauses.
    fn handle_running_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.executor.pause();
                self.print("Paused");
            }
            KeyCode::Char(c) => {
                let Some(key) = key_for_label(c) else {
                    return;
                };
                if self.held_keys.press(key, Instant::now()) {
                    self.executor.runner_mut().set_key(key, true);
                }
            }
            _ => {}
        }
    }

    fn handle_prompt_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Enter => self.submit(),
            KeyCode::Char(c) => self.prompt.push(c),
            KeyCode::Backspace => {
                self.prompt.pop();
            }
            _ => {}
        }
    }

    /// Runs the prompt, or repeats the last command when the prompt is empty.
    fn submit(&mut self) {
        let input = std::mem::take(&mut self.prompt);
        if input.trim().is_empty() {
            if let Some(command) = self.last_command.clone() {
                self.execute_command(command);
            }
            return;
        }

        self.print(&format!("> {input}"));
        match Cli::try_parse_from(input.split_whitespace()) {
            Ok(cli) => {
                self.last_command = Some(cli.command.clone());
                self.execute_command(cli.command);
            }
            Err(e) => {
                self.last_command = None;
                self.print(&e.to_string());
            }
        }
    }

    fn execute_command(&mut self, command: Command) {
        let text = match self.executor.execute(command) {
            Ok(CommandResult::Ok) => return,
            Ok(CommandResult::Quit) => {
                self.should_quit = true;
                return;
            }
            Ok(CommandResult::Breakpoints(breakpoints)) if breakpoints.is_empty() => {
                "No breakpoints".to_string()
            }
            Ok(CommandResult::Breakpoints(breakpoints)) => breakpoints
                .iter()
                .map(|addr| format!("{addr:03X}"))
                .collect::<Vec<_>>()
                .join(" "),
            Ok(CommandResult::MemDump { data, offset }) => data
                .chunks(8)
                .zip((offset..).step_by(8))
                .map(|(row, addr)| {
                    let bytes: Vec<String> = row.iter().map(|b| format!("{b:02X}")).collect();
                    format!("{addr:03X}: {}", bytes.join(" "))
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Ok(CommandResult::Dump(dump)) => dump,
            Err(e) => format!("Error: {e}"),
        };

        self.print(&text);
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Two display rows share one terminal cell
        const DISPLAY_HEIGHT: u16 = DISPLAY_Y as u16 / 2 + 2;
        const MACHINE_HEIGHT: u16 = 13 + 2;
        const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + SIDE_WIDTH;
        const MIN_HEIGHT: u16 = MACHINE_HEIGHT + CODE_ROWS + 2 + 4 + 2 + 3;

        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            Paragraph::new(format!("Need at least {MIN_WIDTH}x{MIN_HEIGHT}"))
                .style(Style::default().fg(Color::Red))
                .alignment(Alignment::Center)
                .block(Block::bordered())
                .render(area, buf);
            return;
        }

        let [left, side] = Layout::horizontal([
            Constraint::Min(MIN_WIDTH - SIDE_WIDTH),
            Constraint::Length(SIDE_WIDTH),
        ])
        .areas(area);
        let [display, console] =
            Layout::vertical([Constraint::Length(DISPLAY_HEIGHT), Constraint::Min(3)]).areas(left);
        let [machine, code, keypad, stack] = Layout::vertical([
            Constraint::Length(MACHINE_HEIGHT),
            Constraint::Length(CODE_ROWS + 2),
            Constraint::Length(4 + 2),
            Constraint::Min(3),
        ])
        .areas(side);

        let dump = self.executor.dump_state();
        self.render_display(display, buf);
        self.render_console(console, buf);
        self.render_machine(&dump, machine, buf);
        self.render_code(&dump, code, buf);
        self.render_keypad(keypad, buf);
        render_stack(&dump, stack, buf);
    }
}

impl App {
    fn render_display(&self, area: Rect, buf: &mut Buffer) {
        let lines: Vec<Line> = self
            .executor
            .get_display()
            .chunks(2)
            .map(|rows| {
                let cells: String = rows[0]
                    .iter()
                    .zip(rows[1].iter())
                    .map(|(&top, &bottom)| match (top, bottom) {
                        (true, true) => '█',
                        (true, false) => '▀',
                        (false, true) => '▄',
                        (false, false) => ' ',
                    })
                    .collect();
                Line::styled(cells, Style::default().fg(Color::Green))
            })
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Display "))
            .render(area, buf);
    }

    fn render_console(&self, area: Rect, buf: &mut Buffer) {
        // One row for the prompt, two for the border
        let history_rows = usize::from(area.height.saturating_sub(3));
        let skip = self.console.len().saturating_sub(history_rows);

        let mut lines: Vec<Line> = self
            .console
            .iter()
            .skip(skip)
            .map(|line| Line::raw(line.as_str()))
            .collect();
        lines.push(Line::from(vec![
            Span::styled("> ", Style::default().fg(Color::Yellow)),
            Span::raw(self.prompt.as_str()),
        ]));

        Paragraph::new(lines)
            .block(Block::bordered().title(" Console "))
            .render(area, buf);
    }

    fn render_machine(&self, dump: &StateDump, area: Rect, buf: &mut Buffer) {
        let (status, color) = match (dump.state, self.executor.is_running()) {
            (ExecState::Halted, _) => ("HALTED", Color::Red),
            (ExecState::AwaitingKey { .. }, _) => ("KEY WAIT", Color::Cyan),
            (ExecState::Running, true) => ("RUNNING", Color::Green),
            (ExecState::Running, false) => ("PAUSED", Color::Yellow),
        };
        let detail = match (self.executor.fault(), dump.state) {
            (Some(fault), _) => format!("{:?}", fault.kind()),
            (None, ExecState::AwaitingKey { x }) => format!("key -> V{x}"),
            _ => String::new(),
        };

        let mut lines = vec![
            Line::from(vec![
                Span::styled(status, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(" "),
                Span::styled(detail, Style::default().fg(color)),
            ]),
            Line::raw(format!("PC {:03X}    I {:03X}", dump.pc, dump.i)),
            Line::raw(format!("SP {:X}     OP {:04X}", dump.sp, dump.opcode)),
            Line::raw(format!("DT {:02X}     ST {:02X}", dump.delay_timer, dump.sound_timer)),
            Line::raw(""),
        ];

        for low in 0..8 {
            let (left, right) = (u4::new(low), u4::new(low + 8));
            lines.push(Line::from(vec![
                self.register_span(left, dump.v[left]),
                Span::raw("   "),
                self.register_span(right, dump.v[right]),
            ]));
        }

        Paragraph::new(lines)
            .block(Block::bordered().title(" Machine "))
            .render(area, buf);
    }

    /// Written by the last step: yellow. Only read: cyan.
    fn register_span(&self, reg: u4, value: u8) -> Span<'static> {
        let log = self.executor.access_log();
        let style = if log.was_written(reg) {
            Style::default().fg(Color::Yellow)
        } else if log.was_read(reg) {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        Span::styled(format!("V{reg} {value:02X}"), style)
    }

    /// Upcoming instruction words from PC; `*` marks a breakpoint.
    fn render_code(&self, dump: &StateDump, area: Rect, buf: &mut Buffer) {
        let memory = self.executor.get_memory();
        let lines: Vec<Line> = (0..CODE_ROWS)
            .map(|row| dump.pc.wrapping_add(row * 2))
            .map_while(|addr| match memory.slice(addr, 2) {
                &[high, low] => Some((addr, u16::from_be_bytes([high, low]))),
                _ => None,
            })
            .map(|(addr, word)| {
                let marker = if self.executor.breakpoints().contains(&addr) {
                    '*'
                } else {
                    ' '
                };
                let style = if addr == dump.pc {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                Line::styled(format!("{marker}{addr:03X}  {word:04X}"), style)
            })
            .collect();

        Paragraph::new(lines)
            .block(Block::bordered().title(" Code "))
            .render(area, buf);
    }

    fn render_keypad(&self, area: Rect, buf: &mut Buffer) {
        let pressed = self.executor.get_keypad();
        let lines: Vec<Line> = KEYPAD_LAYOUT
            .iter()
            .map(|row| {
                let spans: Vec<Span> = row
                    .iter()
                    .map(|&key| {
                        let style = if pressed[usize::from(key)] {
                            Style::default().fg(Color::Black).bg(Color::White)
                        } else {
                            Style::default()
                        };
                        Span::styled(format!(" {key:X} "), style)
                    })
                    .collect();
                Line::from(spans)
            })
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Keypad "))
            .render(area, buf);
    }
}

/// Return addresses, most recent first.
fn render_stack(dump: &StateDump, area: Rect, buf: &mut Buffer) {
    let rows = usize::from(area.height.saturating_sub(2));
    let mut lines: Vec<Line> = dump
        .stack
        .iter()
        .enumerate()
        .rev()
        .take(rows)
        .map(|(depth, addr)| Line::raw(format!("{depth:X}: {addr:03X}")))
        .collect();
    if lines.is_empty() {
        lines.push(Line::raw("empty"));
    }

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::bordered().title(" Stack "))
        .render(area, buf);
}

/// TUI debugger for CHIP-8
#[derive(Parser)]
struct Args {
    /// Path to the ROM file to load
    rom_path: PathBuf,

    /// Shift Vx in place for 8xy6/8xyE instead of shifting Vy into Vx
    #[arg(long)]
    shift_vx: bool,

    /// Leave I unchanged after Fx55/Fx65
    #[arg(long)]
    no_index_increment: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let compat = CompatibilityConfig {
        shift_uses_vy: !args.shift_vx,
        increment_i_after_block_op: !args.no_index_increment,
    };

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;
    let mut app = App::new(&rom, compat).context("Failed to initialize application")?;

    let mut terminal = ratatui::init();
    let app_result = app.run(&mut terminal);
    ratatui::restore();

    app_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_key_repeats_are_not_new_presses() {
        let mut keys = HeldKeys::default();
        let start = Instant::now();
        let key = u4::new(0xA);

        assert!(keys.press(key, start));
        assert!(!keys.press(key, start + Duration::from_millis(30)));
        assert!(keys.release_expired(start + Duration::from_millis(60)).is_empty());

        let released = keys.release_expired(start + Duration::from_millis(100));
        assert_eq!(released, vec![key]);
        assert!(keys.press(key, start + Duration::from_millis(120)));
    }
}

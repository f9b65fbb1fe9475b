use clap::{Parser, Subcommand};
use clap_num::maybe_hex;

use crate::u4;

#[derive(Parser)]
#[command(multicall = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Command {
    #[command(visible_alias = "r")]
    Run,

    #[command(visible_alias = "p")]
    Pause,

    #[command(visible_alias = "s")]
    Step,

    #[command(visible_alias = "b")]
    Breakpoint {
        #[command(subcommand)]
        action: BreakpointAction,
    },

    Set {
        #[arg(value_parser = parse_set_target)]
        target: SetTarget,
        #[arg(value_parser = maybe_hex::<u16>)]
        value: u16,
    },

    #[command(visible_alias = "m")]
    Mem {
        #[arg(default_value = "0x200", value_parser = maybe_hex::<u16>)]
        start: u16,
        #[arg(default_value = "64", value_parser = maybe_hex::<u16>)]
        len: u16,
    },

    Reset,

    #[command(visible_alias = "d")]
    Dump,

    #[command(visible_alias = "q")]
    Quit,
}

#[derive(Debug, PartialEq)]
pub enum CommandResult {
    Ok,
    Breakpoints(Vec<u16>),
    MemDump { data: Vec<u8>, offset: u16 },
    Dump(String),
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Error while executing cpu instruction: {0}")]
    Chip8Error(#[from] crate::emu::Chip8Error),
    #[error("Value out of range")]
    ValueOutOfRange,
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum BreakpointAction {
    #[command(visible_alias = "s")]
    Set {
        #[arg(value_parser = maybe_hex::<u16>)]
        addr: u16,
    },

    #[command(visible_alias = "c")]
    Clear {
        #[arg(value_parser = maybe_hex::<u16>)]
        addr: u16,
    },

    #[command(visible_alias = "l")]
    List,

    #[command(visible_alias = "ca")]
    ClearAll,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SetTarget {
    V(u4),
    I,
    Pc,
}

fn parse_set_target(s: &str) -> Result<SetTarget, String> {
    let lower = s.to_lowercase();

    match lower.as_str() {
        "index" | "i" => Ok(SetTarget::I),
        "pc" => Ok(SetTarget::Pc),

        _ if lower.starts_with('v') => {
            let hex_str = &lower[1..];
            match u8::from_str_radix(hex_str, 16).ok().map(u4::try_from) {
                Some(Ok(reg)) => Ok(SetTarget::V(reg)),
                _ => Err(format!("Invalid register: '{}'", s)),
            }
        }

        _ => Err(format!("Unknown set target: '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, clap::Error> {
        Cli::try_parse_from(line.split_whitespace()).map(|cli| cli.command)
    }

    #[test]
    fn aliases_parse() {
        assert_eq!(parse("r").unwrap(), Command::Run);
        assert_eq!(parse("s").unwrap(), Command::Step);
        assert_eq!(parse("d").unwrap(), Command::Dump);
        assert_eq!(
            parse("b s 0x20a").unwrap(),
            Command::Breakpoint {
                action: BreakpointAction::Set { addr: 0x20A }
            }
        );
    }

    #[test]
    fn set_accepts_registers_and_hex_values() {
        assert_eq!(
            parse("set vA 0xff").unwrap(),
            Command::Set {
                target: SetTarget::V(u4::new(0xA)),
                value: 0xFF
            }
        );
        assert_eq!(
            parse("set pc 512").unwrap(),
            Command::Set {
                target: SetTarget::Pc,
                value: 0x200
            }
        );
        assert!(parse("set v10 1").is_err());
        assert!(parse("set sp 1").is_err());
    }

    #[test]
    fn mem_has_defaults() {
        assert_eq!(
            parse("mem").unwrap(),
            Command::Mem {
                start: 0x200,
                len: 64
            }
        );
    }
}

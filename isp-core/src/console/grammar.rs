//! Line parser for the console.
//!
//! Commands are a keyword followed by space separated arguments. Numbers are
//! decimal or `0x` hexadecimal; parameter values may also be one of the
//! symbolic words in the catalog.

use core::fmt;

use winnow::ascii::{dec_uint, hex_uint, space0, space1};
use winnow::combinator::{alt, opt, preceded};
use winnow::ModalResult;
use winnow::prelude::*;
use winnow::token::take_while;

use super::catalog::{self, CommandTag, ParamSpec};

/// Structured commands produced by the parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Get(&'static ParamSpec),
    Set(&'static ParamSpec, u32),
    /// Raw command; a value makes it a write.
    Cmd {
        kind: u8,
        id: u8,
        value: Option<u32>,
    },
    Frame(u32),
    Status,
    History,
    Context(Option<u8>),
    Help(Option<&'a str>),
}

/// Why a line was rejected. Offsets are byte positions in the line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Empty,
    UnknownCommand(&'a str),
    UnknownParam(&'a str),
    Expected { what: &'static str, at: usize },
    Trailing { at: usize },
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty command"),
            ParseError::UnknownCommand(word) => write!(f, "unknown command `{word}`"),
            ParseError::UnknownParam(word) => write!(f, "unknown parameter `{word}`"),
            ParseError::Expected { what, at } => write!(f, "expected {what} at column {at}"),
            ParseError::Trailing { at } => write!(f, "unexpected input at column {at}"),
        }
    }
}

/// Frames run by a bare `frame`.
pub const DEFAULT_FRAME_COUNT: u32 = 1;

/// Parses one console line. A trailing line ending is ignored.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let mut input = line.trim_end_matches(['\r', '\n']);
    let _: ModalResult<&str> = space0.parse_next(&mut input);
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let keyword = word
        .parse_next(&mut input)
        .map_err(|_| ParseError::Expected {
            what: "command",
            at: offset(line, input),
        })?;
    let spec = catalog::find(keyword).ok_or(ParseError::UnknownCommand(keyword))?;

    let mut cursor = Cursor { line, input };
    let command = match spec.tag {
        CommandTag::Get => Command::Get(cursor.param()?),
        CommandTag::Set => {
            let param = cursor.param()?;
            Command::Set(param, cursor.required("value", value)?)
        }
        CommandTag::Cmd => Command::Cmd {
            kind: cursor.required("command type", byte)?,
            id: cursor.required("command id", byte)?,
            value: cursor.optional(value),
        },
        CommandTag::Frame => {
            Command::Frame(cursor.optional(number).unwrap_or(DEFAULT_FRAME_COUNT))
        }
        CommandTag::Status => Command::Status,
        CommandTag::History => Command::History,
        CommandTag::Context => Command::Context(cursor.optional(byte)),
        CommandTag::Help => Command::Help(cursor.optional(word)),
    };
    cursor.finish()?;
    Ok(command)
}

struct Cursor<'a> {
    line: &'a str,
    input: &'a str,
}

impl<'a> Cursor<'a> {
    fn required<O>(
        &mut self,
        what: &'static str,
        parser: fn(&mut &'a str) -> ModalResult<O>,
    ) -> Result<O, ParseError<'a>> {
        let start = self.input;
        preceded(space1, parser)
            .parse_next(&mut self.input)
            .map_err(|_| {
                self.input = start;
                ParseError::Expected {
                    what,
                    at: offset(self.line, start.trim_start()),
                }
            })
    }

    fn optional<O>(&mut self, parser: fn(&mut &'a str) -> ModalResult<O>) -> Option<O> {
        let start = self.input;
        let parsed: ModalResult<Option<O>> =
            opt(preceded(space1, parser)).parse_next(&mut self.input);
        parsed.unwrap_or_else(|_| {
            self.input = start;
            None
        })
    }

    fn param(&mut self) -> Result<&'static ParamSpec, ParseError<'a>> {
        let name = self.required("parameter name", word)?;
        catalog::find_param(name).ok_or(ParseError::UnknownParam(name))
    }

    fn finish(mut self) -> Result<(), ParseError<'a>> {
        let _: ModalResult<&str> = space0.parse_next(&mut self.input);
        if self.input.is_empty() {
            Ok(())
        } else {
            Err(ParseError::Trailing {
                at: offset(self.line, self.input),
            })
        }
    }
}

fn offset(line: &str, rest: &str) -> usize {
    line.len() - rest.len()
}

fn word<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<u32> {
    alt((preceded(alt(("0x", "0X")), hex_uint), dec_uint)).parse_next(input)
}

fn byte(input: &mut &str) -> ModalResult<u8> {
    number
        .verify_map(|value| u8::try_from(value).ok())
        .parse_next(input)
}

fn value(input: &mut &str) -> ModalResult<u32> {
    alt((number, word.verify_map(catalog::value))).parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ids::{AE_MODE, ON, SENSOR_STREAMING, TALGORITHMS, TSENSOR};

    fn parse_ok(line: &str) -> Command<'_> {
        parse(line).expect("command should parse")
    }

    #[test]
    fn parses_named_get_and_set() {
        match parse_ok("get ae_mode") {
            Command::Get(spec) => assert_eq!((spec.kind, spec.id), (TALGORITHMS, AE_MODE)),
            other => panic!("unexpected command: {other:?}"),
        }
        match parse_ok("SET streaming on\r\n") {
            Command::Set(spec, value) => {
                assert_eq!((spec.kind, spec.id, value), (TSENSOR, SENSOR_STREAMING, ON));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_raw_commands() {
        assert_eq!(
            parse_ok("cmd 0x09 0x79"),
            Command::Cmd {
                kind: 9,
                id: 0x79,
                value: None
            }
        );
        assert_eq!(
            parse_ok("cmd 9 124 0x200"),
            Command::Cmd {
                kind: 9,
                id: 124,
                value: Some(0x200)
            }
        );
    }

    #[test]
    fn optional_arguments_default() {
        assert_eq!(parse_ok("frame"), Command::Frame(DEFAULT_FRAME_COUNT));
        assert_eq!(parse_ok("  frame 30  "), Command::Frame(30));
        assert_eq!(parse_ok("context"), Command::Context(None));
        assert_eq!(parse_ok("context 1"), Command::Context(Some(1)));
        assert_eq!(parse_ok("help"), Command::Help(None));
        assert_eq!(parse_ok("help set"), Command::Help(Some("set")));
        assert_eq!(parse_ok("status"), Command::Status);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(parse("reboot"), Err(ParseError::UnknownCommand("reboot")));
        assert_eq!(parse("get nothing"), Err(ParseError::UnknownParam("nothing")));
        assert_eq!(
            parse("set ae_mode"),
            Err(ParseError::Expected {
                what: "value",
                at: 11
            })
        );
        assert_eq!(
            parse("cmd 300 1"),
            Err(ParseError::Expected {
                what: "command type",
                at: 4
            })
        );
        assert_eq!(parse("status now"), Err(ParseError::Trailing { at: 7 }));
        assert_eq!(
            parse("get $"),
            Err(ParseError::Expected {
                what: "parameter name",
                at: 4
            })
        );
        assert_eq!(
            parse("#get"),
            Err(ParseError::Expected {
                what: "command",
                at: 0
            })
        );
    }
}

//! Parser for the jig's line-oriented operator console.
//!
//! Words are matched case-insensitively and separated by spaces or tabs.
//! `winnow` combinators run directly over the input line so the parser stays
//! allocation-free.

use core::fmt;

use winnow::ascii::{Caseless, dec_uint, hex_uint, space0, space1};
use winnow::combinator::{alt, delimited, opt, preceded};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::literal;

use crate::valve::MeterType;

/// Console keywords, also used as help topics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    Start,
    Stop,
    Status,
    Meter,
    Respond,
    Run,
    Stats,
    Help,
}

impl Topic {
    pub const ALL: [Topic; 8] = [
        Topic::Start,
        Topic::Stop,
        Topic::Status,
        Topic::Meter,
        Topic::Respond,
        Topic::Run,
        Topic::Stats,
        Topic::Help,
    ];

    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Topic::Start => "start",
            Topic::Stop => "stop",
            Topic::Status => "status",
            Topic::Meter => "meter",
            Topic::Respond => "respond",
            Topic::Run => "run",
            Topic::Stats => "stats",
            Topic::Help => "help",
        }
    }
}

/// Parsed console command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    /// `None` reports the current meter family.
    Meter(Option<MeterType>),
    Respond(u16),
    /// Advance the bench clock by the given number of milliseconds.
    Run(u32),
    Stats {
        reset: bool,
    },
    Help(Option<Topic>),
}

/// Parse failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The line held nothing but whitespace.
    Empty,
    /// Input could not be matched; `offset` is the byte where matching
    /// stopped.
    Unrecognized { offset: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty command"),
            ParseError::Unrecognized { offset } => {
                write!(f, "unrecognized input at column {}", offset + 1)
            }
        }
    }
}

/// Parses one console line (a trailing CR/LF is ignored).
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    delimited(space0, command, space0)
        .parse(line)
        .map_err(|error| ParseError::Unrecognized {
            offset: error.offset(),
        })
}

fn keyword<'i>(word: &'static str) -> impl Parser<&'i str, &'i str, ErrMode<ContextError>> {
    literal(Caseless(word))
}

fn command(input: &mut &str) -> ModalResult<Command> {
    alt((
        keyword("start").value(Command::Start),
        keyword("stop").value(Command::Stop),
        keyword("status").value(Command::Status),
        preceded(keyword("stats"), opt(preceded(space1, keyword("reset"))))
            .map(|reset| Command::Stats {
                reset: reset.is_some(),
            }),
        preceded(keyword("meter"), opt(preceded(space1, meter_type))).map(Command::Meter),
        preceded((keyword("respond"), space1), response_code).map(Command::Respond),
        preceded((keyword("run"), space1), duration_ms).map(Command::Run),
        preceded(keyword("help"), opt(preceded(space1, topic))).map(Command::Help),
    ))
    .parse_next(input)
}

fn meter_type(input: &mut &str) -> ModalResult<MeterType> {
    alt((
        keyword("mechanical").value(MeterType::Mechanical),
        keyword("ultrasonic").value(MeterType::Ultrasonic),
    ))
    .parse_next(input)
}

fn topic(input: &mut &str) -> ModalResult<Topic> {
    alt((
        keyword("start").value(Topic::Start),
        keyword("stop").value(Topic::Stop),
        keyword("status").value(Topic::Status),
        keyword("stats").value(Topic::Stats),
        keyword("meter").value(Topic::Meter),
        keyword("respond").value(Topic::Respond),
        keyword("run").value(Topic::Run),
        keyword("help").value(Topic::Help),
    ))
    .parse_next(input)
}

/// `0x`-prefixed hexadecimal or plain decimal 16-bit code.
fn response_code(input: &mut &str) -> ModalResult<u16> {
    alt((
        preceded(keyword("0x"), hex_uint::<_, u16, _>),
        dec_uint::<_, u16, _>,
    ))
    .parse_next(input)
}

/// Integer with an optional `ms` (default) or `s` suffix.
fn duration_ms(input: &mut &str) -> ModalResult<u32> {
    (
        dec_uint::<_, u32, _>,
        opt(alt((
            keyword("ms").value(1_u32),
            keyword("s").value(1_000_u32),
        ))),
    )
        .verify_map(|(value, scale): (u32, Option<u32>)| value.checked_mul(scale.unwrap_or(1)))
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Command {
        parse(input).expect("command should parse")
    }

    #[test]
    fn parses_bare_commands_case_insensitively() {
        assert_eq!(parse_ok("start"), Command::Start);
        assert_eq!(parse_ok("  STOP \r\n"), Command::Stop);
        assert_eq!(parse_ok("Status"), Command::Status);
        assert_eq!(parse_ok("stats"), Command::Stats { reset: false });
        assert_eq!(parse_ok("stats reset"), Command::Stats { reset: true });
    }

    #[test]
    fn parses_meter_selection() {
        assert_eq!(parse_ok("meter"), Command::Meter(None));
        assert_eq!(
            parse_ok("meter ultrasonic"),
            Command::Meter(Some(MeterType::Ultrasonic))
        );
        assert_eq!(
            parse_ok("meter\tMechanical"),
            Command::Meter(Some(MeterType::Mechanical))
        );
    }

    #[test]
    fn parses_response_codes_in_hex_and_decimal() {
        assert_eq!(parse_ok("respond 0xC022"), Command::Respond(0xC022));
        assert_eq!(parse_ok("respond 0x2604"), Command::Respond(0x2604));
        assert_eq!(parse_ok("respond 8196"), Command::Respond(8196));
    }

    #[test]
    fn parses_durations_with_units() {
        assert_eq!(parse_ok("run 250"), Command::Run(250));
        assert_eq!(parse_ok("run 250ms"), Command::Run(250));
        assert_eq!(parse_ok("run 3s"), Command::Run(3_000));
    }

    #[test]
    fn parses_help_topics() {
        assert_eq!(parse_ok("help"), Command::Help(None));
        assert_eq!(parse_ok("help respond"), Command::Help(Some(Topic::Respond)));
        assert_eq!(parse_ok("help stats"), Command::Help(Some(Topic::Stats)));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   \n"), Err(ParseError::Empty));
        assert!(matches!(
            parse("startx"),
            Err(ParseError::Unrecognized { .. })
        ));
        assert!(matches!(
            parse("respond"),
            Err(ParseError::Unrecognized { .. })
        ));
        assert!(matches!(
            parse("meter gas"),
            Err(ParseError::Unrecognized { .. })
        ));
        assert!(matches!(
            parse("run 5000000000"),
            Err(ParseError::Unrecognized { .. })
        ));
    }
}

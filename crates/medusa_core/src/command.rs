//! Host command protocol.
//!
//! Commands arrive as text lines; keywords are case-insensitive and numeric
//! arguments accept decimal or `0x` hex. Every reaction is a `Response`
//! whose `Display` form is the exact line written back to the host.
//!
//! Binary uploads follow an `UPLOAD` command as a frame of 32-bit
//! little-endian words: start marker, payload length in words, payload,
//! end marker.

use crate::MedusaError;
use crate::bench::BenchStatus;
use crate::record::SolverRunRecord;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use medusa_common::Tile;

/// First word of an upload frame.
pub const FRAME_START: u32 = 0xDEAD_BEEF;

/// Last word of an upload frame.
pub const FRAME_END: u32 = 0xFFFF_FFFF;

/// Largest accepted upload payload, in words.
pub const MAX_FRAME_WORDS: usize = 32 * 1024;

/// Tiles a `RUN_TEST` batch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Single(Tile),
    Coupled,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Single(Tile::Right) => f.write_str("right"),
            RunMode::Single(Tile::Left) => f.write_str("left"),
            RunMode::Coupled => f.write_str("coupled"),
        }
    }
}

/// A parsed host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Status,
    HealthCheck,
    Reset,
    RunTest { runs: u32, mode: RunMode },
    Upload,
    Flash,
    PingPulp,
    AddOne(u32),
    Square(u32),
    Read(u32),
    Write(u32, u32),
    Loopback,
    SpiModes,
}

/// Why a command line was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The line holds no command.
    Empty,
    /// The keyword is not a known command.
    Unknown,
    /// An argument is missing or not a number.
    InvalidArgument,
}

/// Parses a decimal or `0x` hex number.
pub fn parse_number(text: &str) -> Option<u32> {
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

impl Command {
    /// Parses one command line.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut words = line.split_whitespace();
        let keyword = words.next().ok_or(ParseError::Empty)?.to_ascii_uppercase();
        let mut number = || {
            words
                .next()
                .and_then(parse_number)
                .ok_or(ParseError::InvalidArgument)
        };

        let command = match keyword.as_str() {
            "PING" => Command::Ping,
            "STATUS" => Command::Status,
            "HEALTH_CHECK" => Command::HealthCheck,
            "RESET" => Command::Reset,
            "RUN_TEST" => {
                let runs = number()?;
                if runs == 0 {
                    return Err(ParseError::InvalidArgument);
                }
                let mode = match line.split_whitespace().nth(2) {
                    None => RunMode::Single(Tile::Right),
                    Some(m) if m.eq_ignore_ascii_case("right") => RunMode::Single(Tile::Right),
                    Some(m) if m.eq_ignore_ascii_case("left") => RunMode::Single(Tile::Left),
                    Some(m) if m.eq_ignore_ascii_case("coupled") => RunMode::Coupled,
                    Some(_) => return Err(ParseError::InvalidArgument),
                };
                Command::RunTest { runs, mode }
            }
            "UPLOAD" => Command::Upload,
            "FLASH" => Command::Flash,
            "PINGPULP" => Command::PingPulp,
            "ADDONE" => Command::AddOne(number()?),
            "SQUARE" => Command::Square(number()?),
            "READ" => Command::Read(number()?),
            "WRITE" => {
                let address = number()?;
                Command::Write(address, number()?)
            }
            "LOOPBACK" => Command::Loopback,
            "SPI_MODES" => Command::SpiModes,
            _ => return Err(ParseError::Unknown),
        };
        Ok(command)
    }

    /// Protocol keyword, as echoed in `ACK:` lines.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Status => "STATUS",
            Command::HealthCheck => "HEALTH_CHECK",
            Command::Reset => "RESET",
            Command::RunTest { .. } => "RUN_TEST",
            Command::Upload => "UPLOAD",
            Command::Flash => "FLASH",
            Command::PingPulp => "PINGPULP",
            Command::AddOne(_) => "ADDONE",
            Command::Square(_) => "SQUARE",
            Command::Read(_) => "READ",
            Command::Write(..) => "WRITE",
            Command::Loopback => "LOOPBACK",
            Command::SpiModes => "SPI_MODES",
        }
    }

    /// Commands that are served while an upload is pending.
    pub fn allowed_while_busy(&self) -> bool {
        matches!(self, Command::Status | Command::Reset)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            Command::RunTest { runs, mode } => write!(f, " {} {}", runs, mode),
            Command::AddOne(n) | Command::Square(n) => write!(f, " {}", n),
            Command::Read(a) => write!(f, " 0x{:08X}", a),
            Command::Write(a, v) => write!(f, " 0x{:08X} 0x{:08X}", a, v),
            _ => Ok(()),
        }
    }
}

/// A line written back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Pong,
    Status(BenchStatus),
    ChipNotResponding,
    Ack(&'static str),
    HealthOk,
    Chip,
    Version,
    HealthCheckComplete(bool),
    Busy,
    UnknownCommand,
    Error(&'static str),
    Record(SolverRunRecord),
    Value(u32),
    Uploaded(usize),
    Loopback(bool),
    SpiMode(Option<u8>),
}

impl From<MedusaError> for Response {
    fn from(e: MedusaError) -> Self {
        Response::Error(e.code())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Pong => f.write_str("PONG"),
            Response::Status(s) => write!(f, "STATUS:{}", s),
            Response::ChipNotResponding => f.write_str("STATUS:ERROR:CHIP_NOT_RESPONDING"),
            Response::Ack(name) => write!(f, "ACK:{}", name),
            Response::HealthOk => f.write_str("HEALTH:OK"),
            Response::Chip => f.write_str("CHIP:MEDUSA"),
            Response::Version => f.write_str("VERSION:1.0"),
            Response::HealthCheckComplete(ok) => {
                write!(f, "HEALTH_CHECK_COMPLETE:{}", if *ok { "OK" } else { "ERROR" })
            }
            Response::Busy => f.write_str("ERROR:BUSY"),
            Response::UnknownCommand => f.write_str("ERROR:UNKNOWN_COMMAND"),
            Response::Error(code) => write!(f, "ERROR:{}", code),
            Response::Record(record) => {
                f.write_str("RESULT:")?;
                for (i, word) in record.to_words().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{:08X}", word)?;
                }
                Ok(())
            }
            Response::Value(v) => write!(f, "VALUE:0x{:08X}", v),
            Response::Uploaded(bytes) => write!(f, "UPLOAD:OK:{}", bytes),
            Response::Loopback(ok) => write!(f, "LOOPBACK:{}", if *ok { "PASS" } else { "FAIL" }),
            Response::SpiMode(Some(mode)) => write!(f, "SPI_MODE:{}", mode),
            Response::SpiMode(None) => f.write_str("SPI_MODE:NONE"),
        }
    }
}

/// Destination of response lines.
pub trait ResponseSink {
    fn emit(&mut self, response: Response);
}

impl ResponseSink for Vec<Response> {
    fn emit(&mut self, response: Response) {
        self.push(response);
    }
}

impl ResponseSink for Vec<String> {
    fn emit(&mut self, response: Response) {
        use alloc::string::ToString;
        self.push(response.to_string());
    }
}

/// Wraps `payload` in an upload frame, zero-padding the last word.
pub fn encode_frame(payload: &[u8]) -> Vec<u32> {
    let words = payload.len().div_ceil(4);
    let mut frame = Vec::with_capacity(words + 3);
    frame.push(FRAME_START);
    frame.push(words as u32);
    for chunk in payload.chunks(4) {
        let mut bytes = [0u8; 4];
        bytes[..chunk.len()].copy_from_slice(chunk);
        frame.push(u32::from_le_bytes(bytes));
    }
    frame.push(FRAME_END);
    frame
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Start,
    Length,
    Payload(usize),
    End,
}

/// Incremental decoder for an upload frame.
#[derive(Debug, Clone)]
pub struct FrameReceiver {
    state: FrameState,
    payload: Vec<u8>,
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReceiver {
    pub fn new() -> Self {
        Self {
            state: FrameState::Start,
            payload: Vec::new(),
        }
    }

    /// Feeds the next frame word.
    ///
    /// # Returns
    ///
    /// The payload bytes once the end marker arrives, `None` while more
    /// words are expected, or `BadFrame` on a wrong marker or an oversized
    /// length.
    pub fn push(&mut self, word: u32) -> Result<Option<Vec<u8>>, MedusaError> {
        match self.state {
            FrameState::Start => {
                if word != FRAME_START {
                    return Err(MedusaError::BadFrame);
                }
                self.state = FrameState::Length;
            }
            FrameState::Length => {
                let len = word as usize;
                if len > MAX_FRAME_WORDS {
                    return Err(MedusaError::BadFrame);
                }
                self.payload = Vec::with_capacity(4 * len);
                self.state = if len == 0 {
                    FrameState::End
                } else {
                    FrameState::Payload(len)
                };
            }
            FrameState::Payload(remaining) => {
                self.payload.extend_from_slice(&word.to_le_bytes());
                self.state = if remaining == 1 {
                    FrameState::End
                } else {
                    FrameState::Payload(remaining - 1)
                };
            }
            FrameState::End => {
                if word != FRAME_END {
                    return Err(MedusaError::BadFrame);
                }
                self.state = FrameState::Start;
                return Ok(Some(core::mem::take(&mut self.payload)));
            }
        }
        Ok(None)
    }
}

/// Decodes a complete upload frame.
pub fn decode_frame(words: &[u32]) -> Result<Vec<u8>, MedusaError> {
    let mut receiver = FrameReceiver::new();
    for (i, &word) in words.iter().enumerate() {
        if let Some(payload) = receiver.push(word)? {
            if i + 1 != words.len() {
                return Err(MedusaError::BadFrame);
            }
            return Ok(payload);
        }
    }
    Err(MedusaError::BadFrame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(Command::parse("ping"), Ok(Command::Ping));
        assert_eq!(Command::parse("  Health_Check \r"), Ok(Command::HealthCheck));
        assert_eq!(Command::parse(""), Err(ParseError::Empty));
        assert_eq!(Command::parse("FLY"), Err(ParseError::Unknown));
    }

    #[test]
    fn numbers_accept_decimal_and_hex() {
        assert_eq!(Command::parse("ADDONE 41"), Ok(Command::AddOne(41)));
        assert_eq!(
            Command::parse("write 0x1A000000 0xA5"),
            Ok(Command::Write(0x1A00_0000, 0xA5))
        );
        assert_eq!(Command::parse("READ"), Err(ParseError::InvalidArgument));
        assert_eq!(Command::parse("SQUARE 0xZZ"), Err(ParseError::InvalidArgument));
    }

    #[test]
    fn run_test_defaults_to_right_tile() {
        assert_eq!(
            Command::parse("RUN_TEST 5"),
            Ok(Command::RunTest {
                runs: 5,
                mode: RunMode::Single(Tile::Right)
            })
        );
        assert_eq!(
            Command::parse("run_test 2 COUPLED"),
            Ok(Command::RunTest {
                runs: 2,
                mode: RunMode::Coupled
            })
        );
        assert_eq!(Command::parse("RUN_TEST 0"), Err(ParseError::InvalidArgument));
        assert_eq!(Command::parse("RUN_TEST 3 up"), Err(ParseError::InvalidArgument));
    }

    #[test]
    fn commands_print_in_parseable_form() {
        for line in ["RUN_TEST 3 left", "WRITE 0x00080000 0x12345678", "SQUARE 12", "SPI_MODES"] {
            let command = Command::parse(line).expect("parses");
            assert_eq!(Command::parse(&command.to_string()), Ok(command));
        }
    }

    #[test]
    fn response_lines_match_protocol() {
        assert_eq!(Response::Status(BenchStatus::Busy).to_string(), "STATUS:BUSY");
        assert_eq!(Response::Ack("RUN_TEST").to_string(), "ACK:RUN_TEST");
        assert_eq!(
            Response::ChipNotResponding.to_string(),
            "STATUS:ERROR:CHIP_NOT_RESPONDING"
        );
        assert_eq!(Response::HealthCheckComplete(false).to_string(), "HEALTH_CHECK_COMPLETE:ERROR");
        assert_eq!(Response::Value(42).to_string(), "VALUE:0x0000002A");
        let record = SolverRunRecord {
            outputs: [0x1, 0xFFFF_0000],
            time_ticks: 0x200,
            attempts: 2,
        };
        assert_eq!(
            Response::Record(record).to_string(),
            "RESULT:00000001,FFFF0000,00000200,00000002"
        );
        assert_eq!(
            Response::from(MedusaError::RetriesExhausted { run: 0, attempts: 9 }).to_string(),
            "ERROR:RETRIES_EXHAUSTED"
        );
    }

    #[test]
    fn frame_wraps_and_unwraps_payload() {
        let payload = [1u8, 2, 3, 4, 5, 6];
        let frame = encode_frame(&payload);
        assert_eq!(frame, vec![FRAME_START, 2, 0x0403_0201, 0x0000_0605, FRAME_END]);
        assert_eq!(decode_frame(&frame), Ok(vec![1, 2, 3, 4, 5, 6, 0, 0]));
    }

    #[test]
    fn bad_frames_are_rejected() {
        assert_eq!(decode_frame(&[0x1234, 0, FRAME_END]), Err(MedusaError::BadFrame));
        assert_eq!(decode_frame(&[FRAME_START, 1, 7, 8]), Err(MedusaError::BadFrame));
        assert_eq!(decode_frame(&[FRAME_START, 2, 7]), Err(MedusaError::BadFrame));
        assert_eq!(
            decode_frame(&[FRAME_START, MAX_FRAME_WORDS as u32 + 1]),
            Err(MedusaError::BadFrame)
        );
        assert_eq!(decode_frame(&[FRAME_START, 0, FRAME_END]), Ok(vec![]));
    }
}

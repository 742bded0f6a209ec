//! Output renderers for disassembly listings

mod json;
mod text;

pub use self::json::*;
pub use self::text::*;

use crate::linfo::LineInfo;
use crate::{Address, DisasmError, TokenSink};
use clap::ValueEnum;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Supported output modes for disassembly listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputMode {
    /// Plain text listing (default)
    #[default]
    Plain,
    /// JSON array of instruction objects
    Json,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Plain => write!(f, "plain"),
            OutputMode::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(OutputMode::Plain),
            "json" => Ok(OutputMode::Json),
            _ => Err(format!("Unknown output mode: {}", s)),
        }
    }
}

impl OutputMode {
    /// Get a renderer for this mode writing to `out`
    pub fn renderer<'w, W: Write + 'w>(&self, out: W, pretty: bool) -> Box<dyn Renderer + 'w> {
        match self {
            OutputMode::Plain => Box::new(TextRenderer::new(out)),
            OutputMode::Json => Box::new(JsonRenderer::new(out).pretty(pretty)),
        }
    }
}

/// Per-instruction output contract shared by every mode.
///
/// The driver calls `begin_listing` once, then for each instruction
/// `begin_insn`, any number of `token`s from the decoder, and `end_insn`,
/// and finally `end_listing`.
pub trait Renderer: TokenSink {
    /// This renderer as the decoder's token sink.
    fn sink(&mut self) -> &mut dyn TokenSink;

    fn begin_listing(&mut self) -> Result<(), DisasmError>;

    /// Start the record for the instruction at `pc`, preceded by its
    /// source line annotation if there is one.
    fn begin_insn(
        &mut self,
        pc: Address,
        line: Option<&LineInfo>,
        linum: bool,
    ) -> Result<(), DisasmError>;

    /// Finish the current record, dumping `opcodes` if given.
    fn end_insn(&mut self, opcodes: Option<&[u8]>) -> Result<(), DisasmError>;

    /// Close the listing. Safe to call more than once.
    fn end_listing(&mut self) -> Result<(), DisasmError>;
}

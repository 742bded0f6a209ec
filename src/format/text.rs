//! Plain text renderer

use std::io::Write;

use super::Renderer;
use crate::linfo::LineInfo;
use crate::{Address, DisasmError, TokenSink};

/// Writes an objdump-style listing: `<pc>:\t<insn>`, one per line.
#[derive(Debug)]
pub struct TextRenderer<W: Write> {
    out: W,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn annotate(&mut self, line: &LineInfo, linum: bool) -> Result<(), DisasmError> {
        match &line.src {
            Some(src) => write!(self.out, "; {}", src.trim_start())?,
            None => write!(self.out, "; {}:{}", line.file, line.line_num)?,
        }
        if linum {
            write!(
                self.out,
                " [file:{} line_num:{} line_col:{}]",
                line.file, line.line_num, line.line_col
            )?;
        }
        writeln!(self.out)?;
        Ok(())
    }
}

impl<W: Write> TokenSink for TextRenderer<W> {
    fn token(&mut self, text: &str) -> Result<(), DisasmError> {
        self.out.write_all(text.as_bytes())?;
        Ok(())
    }
}

impl<W: Write> Renderer for TextRenderer<W> {
    fn sink(&mut self) -> &mut dyn TokenSink {
        self
    }

    fn begin_listing(&mut self) -> Result<(), DisasmError> {
        Ok(())
    }

    fn begin_insn(
        &mut self,
        pc: Address,
        line: Option<&LineInfo>,
        linum: bool,
    ) -> Result<(), DisasmError> {
        if let Some(line) = line {
            self.annotate(line, linum)?;
        }
        write!(self.out, "{:4x}:\t", pc)?;
        Ok(())
    }

    fn end_insn(&mut self, opcodes: Option<&[u8]>) -> Result<(), DisasmError> {
        if let Some(bytes) = opcodes {
            write!(self.out, "\n\t")?;
            for b in bytes {
                write!(self.out, "{:02x} ", b)?;
            }
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn end_listing(&mut self) -> Result<(), DisasmError> {
        self.out.flush()?;
        Ok(())
    }
}

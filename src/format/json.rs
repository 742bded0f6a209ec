//! JSON renderer

use std::io::Write;

use serde_json::{Map, Value};

use super::Renderer;
use crate::capture::OperandCapture;
use crate::linfo::LineInfo;
use crate::{Address, DisasmError, TokenSink};

/// Writes one top-level JSON array with an object per instruction.
///
/// Each object is built in memory and only written out once the
/// instruction is complete, so an aborted run never leaves half an object
/// behind.
#[derive(Debug)]
pub struct JsonRenderer<W: Write> {
    out: W,
    pretty: bool,
    opened: bool,
    closed: bool,
    records: usize,
    current: Map<String, Value>,
    capture: OperandCapture,
}

impl<W: Write> JsonRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            pretty: false,
            opened: false,
            closed: false,
            records: 0,
            current: Map::new(),
            capture: OperandCapture::new(),
        }
    }

    /// Indent the output for humans.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn annotate(&mut self, line: &LineInfo, linum: bool) {
        if let Some(src) = &line.src {
            self.current
                .insert("src".into(), Value::from(src.trim_start()));
        }
        if linum {
            self.current
                .insert("file".into(), Value::from(line.file.as_str()));
            if line.line_num != 0 {
                self.current.insert("line_num".into(), Value::from(line.line_num));
            }
            if line.line_col != 0 {
                self.current.insert("line_col".into(), Value::from(line.line_col));
            }
        }
    }

    fn write_record(&mut self, record: Value) -> Result<(), DisasmError> {
        if self.records > 0 {
            self.out.write_all(b",")?;
        }
        if self.pretty {
            let text = serde_json::to_string_pretty(&record)?;
            write!(self.out, "\n  {}", text.replace('\n', "\n  "))?;
        } else {
            serde_json::to_writer(&mut self.out, &record)?;
        }
        self.records += 1;
        Ok(())
    }
}

impl<W: Write> TokenSink for JsonRenderer<W> {
    fn token(&mut self, text: &str) -> Result<(), DisasmError> {
        self.capture.token(text);
        Ok(())
    }
}

impl<W: Write> Renderer for JsonRenderer<W> {
    fn sink(&mut self) -> &mut dyn TokenSink {
        self
    }

    fn begin_listing(&mut self) -> Result<(), DisasmError> {
        self.out.write_all(b"[")?;
        self.opened = true;
        Ok(())
    }

    fn begin_insn(
        &mut self,
        pc: Address,
        line: Option<&LineInfo>,
        linum: bool,
    ) -> Result<(), DisasmError> {
        self.current.clear();
        self.capture.begin();
        if let Some(line) = line {
            self.annotate(line, linum);
        }
        self.current
            .insert("pc".into(), Value::from(format!("0x{:x}", pc)));
        Ok(())
    }

    fn end_insn(&mut self, opcodes: Option<&[u8]>) -> Result<(), DisasmError> {
        let insn = self.capture.finish();
        self.current
            .insert("operation".into(), Value::from(insn.operation));
        let operands = match insn.operands {
            Some(ops) => Value::from(ops),
            None => Value::Null,
        };
        self.current.insert("operands".into(), operands);

        if let Some(bytes) = opcodes {
            let hex: Vec<Value> = bytes
                .iter()
                .map(|b| Value::from(format!("0x{:02x}", b)))
                .collect();
            self.current.insert("opcodes".into(), Value::Array(hex));
        }

        let record = Value::Object(std::mem::take(&mut self.current));
        self.write_record(record)
    }

    fn end_listing(&mut self) -> Result<(), DisasmError> {
        if !self.opened || self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.pretty && self.records > 0 {
            self.out.write_all(b"\n")?;
        }
        self.out.write_all(b"]\n")?;
        self.out.flush()?;
        Ok(())
    }
}

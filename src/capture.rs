//! Splits a decoder's token stream into an operation and its operands.
//!
//! Decoders render an instruction the way a disassembler prints it: the
//! mnemonic first, then each operand, with a lone `","` token between
//! operands. `OperandCapture` turns that stream back into fields.

/// Fields captured for one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedInsn {
    /// The first token with trailing spaces stripped
    pub operation: String,
    /// `None` when nothing followed the operation
    pub operands: Option<Vec<String>>,
}

/// Per-instruction token accumulator.
#[derive(Debug, Default)]
pub struct OperandCapture {
    operation: Option<String>,
    operands: Vec<String>,
}

impl OperandCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new instruction.
    pub fn begin(&mut self) {
        self.operation = None;
        self.operands.clear();
    }

    /// Number of tokens kept so far: 0 before the operation, 1 after it,
    /// and one more per operand.
    pub fn count(&self) -> usize {
        match self.operation {
            None => 0,
            Some(_) => 1 + self.operands.len(),
        }
    }

    /// Classify one token.
    pub fn token(&mut self, text: &str) {
        if self.operation.is_none() {
            self.operation = Some(text.trim_end_matches(' ').to_string());
        } else if text == "," {
            // separator between operands
        } else {
            self.operands.push(text.to_string());
        }
    }

    /// Take the captured fields, leaving the accumulator reset.
    pub fn finish(&mut self) -> CapturedInsn {
        let operation = self.operation.take().unwrap_or_default();
        let operands = if self.operands.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.operands))
        };
        CapturedInsn {
            operation,
            operands,
        }
    }
}

//! Source-line metadata and the cursor that merges it with the
//! instruction stream.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Address, DisasmError};

/// One source line attributed to a code address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInfo {
    /// First code address covered by this line
    pub address: Address,
    /// Source file name
    #[serde(default)]
    pub file: String,
    /// 1-based line number, 0 when unknown
    #[serde(default)]
    pub line_num: u32,
    /// 1-based column, 0 when unknown
    #[serde(default)]
    pub line_col: u32,
    /// Text of the source line, if available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

impl LineInfo {
    pub fn new(address: Address, file: impl Into<String>, line_num: u32) -> Self {
        Self {
            address,
            file: file.into(),
            line_num,
            line_col: 0,
            src: None,
        }
    }

    pub fn with_col(mut self, line_col: u32) -> Self {
        self.line_col = line_col;
        self
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }
}

/// Line entries for every function of a program, indexed by function.
///
/// Each function's entries are kept sorted by address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineTable {
    functions: Vec<Vec<LineInfo>>,
}

impl LineTable {
    pub fn new(functions: Vec<Vec<LineInfo>>) -> Self {
        let mut table = Self { functions };
        table.sort();
        table
    }

    /// Load a table from a JSON file holding an array of per-function
    /// entry arrays.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DisasmError> {
        let data = fs::read(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, DisasmError> {
        let mut table: LineTable = serde_json::from_slice(data)?;
        table.sort();
        Ok(table)
    }

    fn sort(&mut self) {
        for (idx, entries) in self.functions.iter_mut().enumerate() {
            if !entries.windows(2).all(|w| w[0].address <= w[1].address) {
                log::warn!("line info for function #{} is not sorted, sorting", idx);
                entries.sort_by_key(|e| e.address);
            }
        }
    }

    /// Entries for function `func_idx`, if present.
    pub fn function(&self, func_idx: usize) -> Option<&[LineInfo]> {
        self.functions.get(func_idx).map(Vec::as_slice)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.iter().all(Vec::is_empty)
    }
}

/// What a run needs to correlate its instructions with a line table.
#[derive(Debug, Clone, Copy)]
pub struct LineQuery<'t> {
    pub table: &'t LineTable,
    /// Address of the function's first byte; added to every pc
    pub func_base: Address,
    pub func_idx: usize,
}

/// Single-pass merge cursor over one function's line entries.
///
/// Queries must come with non-decreasing addresses. Each entry is handed
/// out at most once, to the first instruction at or after its address.
#[derive(Debug, Clone)]
pub struct LineCursor<'t> {
    entries: &'t [LineInfo],
    consumed: usize,
}

impl<'t> LineCursor<'t> {
    /// Cursor over function `func_idx`; yields nothing if the function is
    /// not in the table.
    pub fn new(table: &'t LineTable, func_idx: usize) -> Self {
        Self {
            entries: table.function(func_idx).unwrap_or(&[]),
            consumed: 0,
        }
    }

    /// Number of entries already handed out or passed over.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// The most specific unconsumed entry at or below `address`.
    ///
    /// When several unconsumed entries qualify, the last of them is returned
    /// and all are marked consumed.
    pub fn next_for(&mut self, address: Address) -> Option<&'t LineInfo> {
        let rest = &self.entries[self.consumed..];
        let first = rest.first()?;
        if address < first.address {
            return None;
        }

        let run = rest.iter().take_while(|e| e.address <= address).count();
        self.consumed += run;
        rest.get(run - 1)
    }
}

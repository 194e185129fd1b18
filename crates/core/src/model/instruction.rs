use std::fmt;

use serde::{Deserialize, Serialize};

/// A single disassembled instruction: mnemonic plus ordered operands.
///
/// Operands are kept as opaque strings; the hasher only looks at mnemonics,
/// but operands survive the JSON round-trip for debugging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub mnemonic: String,
    pub operands: Vec<String>,
}

impl Instruction {
    pub fn new(mnemonic: impl Into<String>, operands: Vec<String>) -> Self {
        Self { mnemonic: mnemonic.into(), operands }
    }

    /// Instruction without operands, the common shape for hashing tests.
    pub fn bare(mnemonic: impl Into<String>) -> Self {
        Self::new(mnemonic, Vec::new())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.join(", "))?;
        }
        Ok(())
    }
}

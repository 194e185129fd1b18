//! Core data model for function similarity search.
//!
//! This module contains:
//! - `Flowgraph`: one function's basic blocks, instructions, and CFG edges.
//! - `Instruction`: a mnemonic plus its ordered operand strings.
//! - `SimHash`: the 128-bit similarity hash produced for a flowgraph.
//! - The JSON exchange format used to move flowgraphs between processes.

mod flowgraph;
mod instruction;
mod json;
mod simhash;

pub use flowgraph::{Address, Direction, EdgePolicy, Flowgraph, FlowgraphError, FlowgraphResult};
pub use instruction::Instruction;
pub use json::{EdgeJson, FlowgraphJson, InstructionJson, NodeJson};
pub use simhash::{ParseSimHashError, SimHash, HASH_BITS};

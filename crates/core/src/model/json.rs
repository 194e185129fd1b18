use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{Address, EdgePolicy, Flowgraph, FlowgraphResult, Instruction};

/// Top-level JSON document for flowgraph exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowgraphJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeJson>,
    #[serde(default)]
    pub edges: Vec<EdgeJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeJson {
    pub address: Address,
    #[serde(default)]
    pub instructions: Vec<InstructionJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstructionJson {
    pub mnemonic: String,
    #[serde(default)]
    pub operands: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeJson {
    pub source: Address,
    pub destination: Address,
}

impl From<&Flowgraph> for FlowgraphJson {
    fn from(graph: &Flowgraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|address| NodeJson {
                address,
                instructions: graph
                    .instructions(address)
                    .iter()
                    .map(|insn| InstructionJson {
                        mnemonic: insn.mnemonic.clone(),
                        operands: insn.operands.clone(),
                    })
                    .collect(),
            })
            .collect();
        let edges = graph
            .edges()
            .map(|(source, destination)| EdgeJson { source, destination })
            .collect();
        Self { name: Some("CFG".to_string()), nodes, edges }
    }
}

impl FlowgraphJson {
    /// Build a graph from the document. Nodes are added before edges, so the
    /// policy only matters for edges that point at nodes the document omits.
    pub fn into_flowgraph(self, policy: EdgePolicy) -> FlowgraphResult<Flowgraph> {
        let mut graph = Flowgraph::with_policy(policy);
        for node in &self.nodes {
            graph.add_node(node.address);
        }
        for edge in &self.edges {
            graph.add_edge(edge.source, edge.destination)?;
        }
        for node in self.nodes {
            let instructions = node
                .instructions
                .into_iter()
                .map(|insn| Instruction::new(insn.mnemonic, insn.operands))
                .collect();
            graph.add_instructions(node.address, instructions)?;
        }
        Ok(graph)
    }
}

impl Flowgraph {
    pub fn to_json(&self) -> FlowgraphResult<String> {
        Ok(serde_json::to_string(&FlowgraphJson::from(self))?)
    }

    pub fn to_json_pretty(&self) -> FlowgraphResult<String> {
        Ok(serde_json::to_string_pretty(&FlowgraphJson::from(self))?)
    }

    /// Parse a graph using the default (auto-creating) edge policy.
    pub fn from_json(text: &str) -> FlowgraphResult<Self> {
        Self::from_json_with_policy(text, EdgePolicy::default())
    }

    pub fn from_json_with_policy(text: &str, policy: EdgePolicy) -> FlowgraphResult<Self> {
        let doc: FlowgraphJson = serde_json::from_str(text)?;
        doc.into_flowgraph(policy)
    }

    pub fn from_json_file(path: &Path) -> FlowgraphResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

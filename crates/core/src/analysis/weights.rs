use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use log::debug;
use thiserror::Error;

use crate::analysis::features::FeatureId;

#[derive(Debug, Error)]
pub enum WeightsError {
    #[error("Malformed weight entry on line {line}: {content:?} ({reason})")]
    Malformed { line: usize, content: String, reason: String },

    #[error("Weights IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WeightsResult<T> = Result<T, WeightsError>;

/// Learned per-feature weights. Features absent from the table fall back
/// to the hasher's default weight for their kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightTable {
    weights: HashMap<FeatureId, f64>,
}

impl WeightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the line format `<feature-id> <weight>`.
    pub fn parse(text: &str) -> WeightsResult<Self> {
        let mut table = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let malformed = |reason: String| WeightsError::Malformed {
                line: index + 1,
                content: raw.to_string(),
                reason,
            };
            let mut tokens = line.split_whitespace();
            let (Some(id), Some(weight), None) = (tokens.next(), tokens.next(), tokens.next())
            else {
                return Err(malformed("expected `<feature-id> <weight>`".to_string()));
            };
            let id: FeatureId = id.parse().map_err(malformed)?;
            let weight: f64 = weight.parse().map_err(|e| malformed(format!("{e}")))?;
            if !weight.is_finite() {
                return Err(malformed("weight must be a finite number".to_string()));
            }
            table.insert(id, weight);
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> WeightsResult<Self> {
        let text = fs::read_to_string(path)?;
        let table = Self::parse(&text)?;
        debug!("loaded {} feature weights from {}", table.len(), path.display());
        Ok(table)
    }

    /// Write the table sorted by feature id, one entry per line.
    pub fn save(&self, path: &Path) -> WeightsResult<()> {
        let mut entries: Vec<_> = self.weights.iter().collect();
        entries.sort_by_key(|(id, _)| **id);
        let mut out = String::new();
        for (id, weight) in entries {
            let _ = writeln!(out, "{id} {weight}");
        }
        fs::write(path, out)?;
        Ok(())
    }

    pub fn get(&self, id: FeatureId) -> Option<f64> {
        self.weights.get(&id).copied()
    }

    pub fn insert(&mut self, id: FeatureId, weight: f64) -> Option<f64> {
        self.weights.insert(id, weight)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

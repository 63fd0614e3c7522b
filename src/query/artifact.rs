use super::output::CompiledOutput;
use crate::error::ArtifactError;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};

/// Every compiled output of one query, in execution order. This is what gets
/// stored after a recompile and loaded by document-processing workers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub outputs: Vec<CompiledOutput>,
}

impl CompiledQuery {
    pub fn new(outputs: Vec<CompiledOutput>) -> Self {
        Self { outputs }
    }

    /// Saves the compiled query to a file using the bincode format.
    pub fn save(&self, path: &str) -> Result<(), ArtifactError> {
        let bytes = self.to_bytes()?;
        let mut file = fs::File::create(path)
            .map_err(|e| ArtifactError::Io(format!("Could not create file '{}': {}", path, e)))?;
        file.write_all(&bytes)
            .map_err(|e| ArtifactError::Io(format!("Could not write to file '{}': {}", path, e)))?;
        Ok(())
    }

    /// Loads a compiled query from a file.
    pub fn from_file(path: &str) -> Result<Self, ArtifactError> {
        let mut file = fs::File::open(path)
            .map_err(|e| ArtifactError::Io(format!("Could not open file '{}': {}", path, e)))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| ArtifactError::Io(format!("Could not read from file '{}': {}", path, e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        encode_to_vec(self, standard())
            .map_err(|e| ArtifactError::Serialization(format!("Serialization failed: {}", e)))
    }

    /// Deserializes a compiled query from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        decode_from_slice(bytes, standard())
            .map(|(query, _)| query) // bincode 2 returns a tuple (data, bytes_read)
            .map_err(|e| ArtifactError::Serialization(format!("Deserialization failed: {}", e)))
    }

    /// Exports the compiled query as pretty-printed JSON for inspection.
    pub fn to_json(&self) -> Result<String, ArtifactError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ArtifactError::Serialization(format!("JSON export failed: {}", e)))
    }

    pub fn output(&self, name: &str) -> Option<&CompiledOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

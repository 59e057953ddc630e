use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum DischargerError {
    #[error("Unknown block type(s): {}", .0.join(", "))]
    UnknownBlockTypes(Vec<String>),

    #[error("At least one block type is required")]
    NoBlockTypes,

    #[error("Nothing to translate: the summary has no blocks")]
    NoBlocks,

    #[error("Invalid locale: {0}")]
    InvalidLocale(String),

    #[error("Target locale must differ from source locale ({0})")]
    SameLocale(String),

    #[error("Block id appears more than once: {0}")]
    DuplicateBlockId(String),

    #[error("Block is not editable: {0}")]
    BlockNotEditable(String),

    #[error("Required block cannot be removed: {0}")]
    RequiredBlockRemoved(String),

    #[error("Model output does not match the schema: {0}")]
    InvalidOutput(String),

    #[error("Translated blocks do not match the originals: {0}")]
    StructureMismatch(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl DischargerError {
    /// Errors caused by the caller's input rather than the model or the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DischargerError::UnknownBlockTypes(_)
                | DischargerError::NoBlockTypes
                | DischargerError::NoBlocks
                | DischargerError::InvalidLocale(_)
                | DischargerError::SameLocale(_)
                | DischargerError::DuplicateBlockId(_)
                | DischargerError::BlockNotEditable(_)
                | DischargerError::RequiredBlockRemoved(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DischargerError>;

pub mod api_error;
pub mod block;
pub mod citation;
pub mod edit;
pub mod error;
pub mod generation;
pub mod llm;
pub mod model;
pub mod schema;
pub mod translation;

pub use api_error::{ErrorBody, ErrorKind, FieldIssue};
pub use block::{Block, BlockContent, BlockType, Citation, CitationSource};
pub use edit::{reconcile_blocks, BlockDraft};
pub use error::{DischargerError, Result};
pub use llm::{LlmClient, LlmError, MockLlmClient, StructuredRequest};
pub use model::{
    AccessRole, Document, Patient, PatientAccessKey, PatientSummary, Snippet, SummaryStatus,
    SummaryTranslation, UserProfile,
};

//! Discharge text → blocks.

use crate::block::{Block, BlockContent, BlockType, Citation, CitationSource};
use crate::error::{DischargerError, Result};
use crate::llm::{LlmClient, StructuredRequest};
use crate::schema::{blocks_schema, SchemaFlavor};
use serde::Deserialize;
use serde_json::Value;

pub const GENERATION_SCHEMA_NAME: &str = "discharge_blocks";

const SYSTEM_PROMPT: &str = r#"You turn hospital discharge summaries into clear, patient-friendly content blocks.

Rules:
- Produce at most one block per requested block type, and only when the discharge text contains supporting information for it.
- Use ONLY information that is explicitly present in the source text. Never infer, assume or fill in doses, dates, frequencies, symptoms or appointments that are not written down. Leave optional fields null when the text does not state them.
- Write titles and descriptions in plain language a patient without medical training understands.
- medication: list every medication mentioned, with its status (new, changed, continued or stopped).
- task: concrete things the patient must do after discharge.
- redFlag: warning symptoms and what to do when they occur; "emergency" means call emergency services.
- appointment: follow-up visits; use "toSchedule" when no date is fixed yet. Dates are YYYY-MM-DD, times HH:MM.
- text: any remaining important information, as short paragraphs.
- For every block, cite the exact sentence(s) of the source that support it. Use source "context" for the discharge text and "document" with the document id for attached documents."#;

/// An uploaded document whose text is offered to the model as extra context
#[derive(Debug, Clone)]
pub struct ContextDocument {
    pub id: String,
    pub name: String,
    pub text: String,
}

#[derive(Deserialize)]
struct GeneratedBlock {
    title: String,
    #[serde(flatten)]
    content: BlockContent,
    #[serde(default)]
    citations: Vec<Citation>,
}

/// Build the structured request for a generation call.
pub fn build_generation_request(
    text: &str,
    block_types: &[BlockType],
    documents: &[ContextDocument],
) -> Result<StructuredRequest> {
    let schema = blocks_schema(block_types, SchemaFlavor::Generation)?;

    let requested = block_types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        "Requested block types: {}\n\nDischarge summary:\n\"\"\"\n{}\n\"\"\"",
        requested,
        text.trim()
    );
    for doc in documents {
        prompt.push_str(&format!(
            "\n\nDocument {} ({}):\n\"\"\"\n{}\n\"\"\"",
            doc.id,
            doc.name,
            doc.text.trim()
        ));
    }

    Ok(StructuredRequest {
        system: SYSTEM_PROMPT.to_string(),
        prompt,
        payload: None,
        schema_name: GENERATION_SCHEMA_NAME.to_string(),
        schema,
    })
}

/// Turn the model's answer into blocks with server-assigned metadata.
///
/// Blocks of a type outside `requested` are a schema violation. A repeated
/// type keeps its first block. Citations pointing at unknown documents or
/// with empty excerpts are dropped.
pub fn blocks_from_output(
    output: &Value,
    requested: &[BlockType],
    document_ids: &[&str],
    now: &str,
) -> Result<Vec<Block>> {
    let items = output
        .get("blocks")
        .and_then(|b| b.as_array())
        .ok_or_else(|| DischargerError::InvalidOutput("missing 'blocks' array".to_string()))?;

    let mut blocks: Vec<Block> = Vec::new();
    for item in items {
        let type_name = item.get("type").and_then(|t| t.as_str()).unwrap_or("");
        let block_type = BlockType::parse(type_name)
            .filter(|t| requested.contains(t))
            .ok_or_else(|| {
                DischargerError::InvalidOutput(format!("unrequested block type '{}'", type_name))
            })?;

        if blocks.iter().any(|b| b.block_type() == block_type) {
            tracing::warn!(block_type = %block_type, "Model returned duplicate block type, keeping the first");
            continue;
        }

        let generated: GeneratedBlock = serde_json::from_value(item.clone())
            .map_err(|e| DischargerError::InvalidOutput(format!("{} block: {}", block_type, e)))?;

        let mut block = Block::new(generated.title, generated.content, now);
        block.citations = generated
            .citations
            .into_iter()
            .filter_map(|c| clean_citation(c, document_ids))
            .collect();
        blocks.push(block);
    }

    Ok(blocks)
}

fn clean_citation(mut citation: Citation, document_ids: &[&str]) -> Option<Citation> {
    if citation.excerpt.trim().is_empty() {
        return None;
    }
    match citation.source {
        CitationSource::Context => {
            citation.document_id = None;
            Some(citation)
        }
        CitationSource::Document => {
            let known = citation
                .document_id
                .as_deref()
                .is_some_and(|id| document_ids.contains(&id));
            known.then_some(citation)
        }
    }
}

/// Run the generation pipeline end to end.
pub async fn generate_blocks(
    client: &dyn LlmClient,
    text: &str,
    block_types: &[BlockType],
    documents: &[ContextDocument],
) -> Result<Vec<Block>> {
    let request = build_generation_request(text, block_types, documents)?;
    let output = client.complete_structured(&request).await?;

    let document_ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    let now = chrono::Utc::now().to_rfc3339();
    let blocks = blocks_from_output(&output, block_types, &document_ids, &now)?;

    tracing::info!(
        requested = block_types.len(),
        generated = blocks.len(),
        "Generated blocks"
    );
    Ok(blocks)
}

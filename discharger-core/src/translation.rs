//! Blocks → translated blocks.
//!
//! The model only ever contributes human-readable text. Ids, types, flags,
//! enums, dates, timestamps, versions and citations are copied from the
//! original blocks, so they survive translation unchanged whatever the
//! model returns.

use crate::block::{
    block_types_of, Appointment, Block, BlockContent, Medication, RedFlagSymptom, Task,
};
use crate::error::{DischargerError, Result};
use crate::llm::{LlmClient, StructuredRequest};
use crate::schema::{blocks_schema, SchemaFlavor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const TRANSLATION_SCHEMA_NAME: &str = "translated_blocks";

const SYSTEM_PROMPT: &str = r#"You are a medical translator producing patient-facing text.

Translate the content blocks you are given from the source language into the target language.

Keep EXACTLY as given (never translate or change):
- "id" and "type" of every block
- boolean flags, enum values (status, priority, severity), dates, times and numbers

Translate:
- titles, names, descriptions, instructions, dosage and frequency wording, actions, locations, purposes and free text

Medication names: write the translated or locally used name followed by the original name in parentheses, e.g. "Paracetamol (Acetaminophen)".
Return every block, in the same order, with the same number of list entries."#;

/// Block payload as sent to the model: structure plus text, no metadata.
#[derive(Debug, Serialize, Deserialize)]
struct TranslationBlock {
    id: String,
    title: String,
    #[serde(flatten)]
    content: BlockContent,
}

/// Check a locale tag: a 2-3 letter language, then optional subtags.
pub fn validate_locale(tag: &str) -> Result<()> {
    let mut parts = tag.split('-');
    let language = parts.next().unwrap_or("");
    let language_ok =
        (2..=3).contains(&language.len()) && language.chars().all(|c| c.is_ascii_alphabetic());
    let subtags_ok =
        parts.all(|p| (2..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()));

    if language_ok && subtags_ok {
        Ok(())
    } else {
        Err(DischargerError::InvalidLocale(tag.to_string()))
    }
}

/// Validate a locale tag and return it in canonical case.
///
/// Language lowercase, 4-letter script title case, 2-letter region uppercase,
/// everything else lowercase: `PT-br` becomes `pt-BR`, `ZH-hant-tw` becomes
/// `zh-Hant-TW`.
pub fn canonical_locale(tag: &str) -> Result<String> {
    let tag = tag.trim();
    validate_locale(tag)?;

    let canonical = tag
        .split('-')
        .enumerate()
        .map(|(i, part)| match (i, part.len()) {
            (0, _) => part.to_ascii_lowercase(),
            (_, 4) if part.chars().all(|c| c.is_ascii_alphabetic()) => {
                let mut chars = part.chars();
                let first = chars.next().map(|c| c.to_ascii_uppercase());
                first
                    .into_iter()
                    .chain(chars.map(|c| c.to_ascii_lowercase()))
                    .collect()
            }
            (_, 2) if part.chars().all(|c| c.is_ascii_alphabetic()) => part.to_ascii_uppercase(),
            _ => part.to_ascii_lowercase(),
        })
        .collect::<Vec<String>>()
        .join("-");
    Ok(canonical)
}

/// Build the structured request for a translation call.
///
/// The output schema is the union of the block types present in `blocks`.
pub fn build_translation_request(
    blocks: &[Block],
    source_locale: &str,
    target_locale: &str,
) -> Result<StructuredRequest> {
    validate_locale(source_locale)?;
    validate_locale(target_locale)?;
    if source_locale.eq_ignore_ascii_case(target_locale) {
        return Err(DischargerError::SameLocale(source_locale.to_string()));
    }
    if blocks.is_empty() {
        return Err(DischargerError::NoBlocks);
    }

    let schema = blocks_schema(&block_types_of(blocks), SchemaFlavor::Translation)?;
    let payload: Vec<TranslationBlock> = blocks
        .iter()
        .map(|b| TranslationBlock {
            id: b.id.clone(),
            title: b.title.clone(),
            content: b.content.clone(),
        })
        .collect();

    Ok(StructuredRequest {
        system: SYSTEM_PROMPT.to_string(),
        prompt: format!(
            "Source language: {}\nTarget language: {}\n\nBlocks:",
            source_locale, target_locale
        ),
        payload: Some(json!({ "blocks": payload })),
        schema_name: TRANSLATION_SCHEMA_NAME.to_string(),
        schema,
    })
}

/// Overlay the model's translated text onto the original blocks.
pub fn merge_translation(originals: &[Block], output: &Value) -> Result<Vec<Block>> {
    let items = output
        .get("blocks")
        .and_then(|b| b.as_array())
        .ok_or_else(|| DischargerError::InvalidOutput("missing 'blocks' array".to_string()))?;

    let translated: Vec<TranslationBlock> = items
        .iter()
        .map(|item| serde_json::from_value(item.clone()))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| DischargerError::InvalidOutput(e.to_string()))?;

    originals
        .iter()
        .map(|original| {
            let candidate = translated
                .iter()
                .find(|t| t.id == original.id)
                .ok_or_else(|| mismatch(format!("block {} is missing", original.id)))?;

            let mut merged = original.clone();
            merged.title = non_empty_or(&candidate.title, &original.title);
            merge_content(&mut merged.content, &candidate.content, &original.id)?;
            Ok(merged)
        })
        .collect()
}

/// Run the translation pipeline end to end.
pub async fn translate_blocks(
    client: &dyn LlmClient,
    blocks: &[Block],
    source_locale: &str,
    target_locale: &str,
) -> Result<Vec<Block>> {
    let request = build_translation_request(blocks, source_locale, target_locale)?;
    let output = client.complete_structured(&request).await?;
    let merged = merge_translation(blocks, &output)?;

    tracing::info!(
        source_locale = source_locale,
        target_locale = target_locale,
        blocks = merged.len(),
        "Translated blocks"
    );
    Ok(merged)
}

fn mismatch(message: String) -> DischargerError {
    DischargerError::StructureMismatch(message)
}

fn merge_content(target: &mut BlockContent, translated: &BlockContent, id: &str) -> Result<()> {
    match (target, translated) {
        (BlockContent::Medication(orig), BlockContent::Medication(tr)) => {
            merge_list(&mut orig.medications, &tr.medications, id, merge_medication)
        }
        (BlockContent::Task(orig), BlockContent::Task(tr)) => {
            merge_list(&mut orig.tasks, &tr.tasks, id, merge_task)
        }
        (BlockContent::RedFlag(orig), BlockContent::RedFlag(tr)) => {
            merge_list(&mut orig.symptoms, &tr.symptoms, id, merge_symptom)
        }
        (BlockContent::Appointment(orig), BlockContent::Appointment(tr)) => {
            merge_list(&mut orig.appointments, &tr.appointments, id, merge_appointment)
        }
        (BlockContent::Text(orig), BlockContent::Text(tr)) => {
            orig.content = non_empty_or(&tr.content, &orig.content);
            Ok(())
        }
        (orig, tr) => Err(mismatch(format!(
            "block {} changed type from {} to {}",
            id,
            orig.block_type(),
            tr.block_type()
        ))),
    }
}

fn merge_list<T>(originals: &mut [T], translated: &[T], id: &str, merge: fn(&mut T, &T)) -> Result<()> {
    if originals.len() != translated.len() {
        return Err(mismatch(format!(
            "block {} has {} entries, translation has {}",
            id,
            originals.len(),
            translated.len()
        )));
    }
    for (orig, tr) in originals.iter_mut().zip(translated) {
        merge(orig, tr);
    }
    Ok(())
}

fn merge_medication(orig: &mut Medication, tr: &Medication) {
    orig.name = with_original_name(&tr.name, &orig.name);
    orig.dosage = non_empty_or(&tr.dosage, &orig.dosage);
    orig.frequency = non_empty_or(&tr.frequency, &orig.frequency);
    merge_optional(&mut orig.duration, &tr.duration);
    merge_optional(&mut orig.instructions, &tr.instructions);
}

fn merge_task(orig: &mut Task, tr: &Task) {
    orig.title = non_empty_or(&tr.title, &orig.title);
    merge_optional(&mut orig.description, &tr.description);
}

fn merge_symptom(orig: &mut RedFlagSymptom, tr: &RedFlagSymptom) {
    orig.symptom = non_empty_or(&tr.symptom, &orig.symptom);
    orig.action = non_empty_or(&tr.action, &orig.action);
    merge_optional(&mut orig.description, &tr.description);
}

fn merge_appointment(orig: &mut Appointment, tr: &Appointment) {
    orig.title = non_empty_or(&tr.title, &orig.title);
    merge_optional(&mut orig.provider, &tr.provider);
    merge_optional(&mut orig.specialty, &tr.specialty);
    merge_optional(&mut orig.location, &tr.location);
    merge_optional(&mut orig.purpose, &tr.purpose);
}

/// Only fields the original has get translated; the model cannot add or remove them.
fn merge_optional(orig: &mut Option<String>, tr: &Option<String>) {
    if let (Some(o), Some(t)) = (orig.as_mut(), tr.as_deref())
        && !t.trim().is_empty()
    {
        *o = t.to_string();
    }
}

fn non_empty_or(translated: &str, original: &str) -> String {
    if translated.trim().is_empty() {
        original.to_string()
    } else {
        translated.to_string()
    }
}

/// "Translated (Original)", unless the original is already there or unchanged.
pub fn with_original_name(translated: &str, original: &str) -> String {
    let translated = translated.trim();
    if translated.is_empty() || translated.eq_ignore_ascii_case(original.trim()) {
        return original.to_string();
    }
    if translated
        .to_lowercase()
        .contains(&format!("({})", original.trim().to_lowercase()))
    {
        return translated.to_string();
    }
    format!("{} ({})", translated, original.trim())
}

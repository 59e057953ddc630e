//! JSON Schemas for block payloads.
//!
//! The LLM's structured output is constrained per call: only the block types
//! requested (generation) or present (translation) are allowed. Every object
//! schema is closed and lists all of its properties as required, with
//! optional values expressed as nullable, which is what strict
//! structured-output providers accept.

use crate::block::BlockType;
use crate::error::{DischargerError, Result};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Which shape a block item takes in the model's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFlavor {
    /// Model produces title + typed data (+ citations); metadata is assigned by the server.
    Generation,
    /// Model echoes id + type and returns translated title + data.
    Translation,
}

/// Payload schema per block type.
///
/// Data-driven: adding a block type means adding an entry here.
static DATA_SCHEMAS: LazyLock<HashMap<BlockType, Value>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert(
        BlockType::Medication,
        object([(
            "medications",
            array_of(object([
                ("name", string()),
                ("dosage", string()),
                ("frequency", string()),
                ("duration", nullable_string()),
                ("instructions", nullable_string()),
                ("status", enum_of(&["new", "changed", "continued", "stopped"])),
            ])),
        )]),
    );
    m.insert(
        BlockType::Task,
        object([(
            "tasks",
            array_of(object([
                ("title", string()),
                ("description", nullable_string()),
                ("dueDate", nullable_string()),
                ("priority", enum_of(&["low", "medium", "high"])),
                ("completed", json!({ "type": "boolean" })),
            ])),
        )]),
    );
    m.insert(
        BlockType::RedFlag,
        object([(
            "symptoms",
            array_of(object([
                ("symptom", string()),
                ("description", nullable_string()),
                ("severity", enum_of(&["urgent", "emergency"])),
                ("action", string()),
            ])),
        )]),
    );
    m.insert(
        BlockType::Appointment,
        object([(
            "appointments",
            array_of(object([
                ("title", string()),
                ("provider", nullable_string()),
                ("specialty", nullable_string()),
                ("date", nullable_string()),
                ("time", nullable_string()),
                ("location", nullable_string()),
                ("purpose", nullable_string()),
                ("status", enum_of(&["scheduled", "toSchedule"])),
            ])),
        )]),
    );
    m.insert(BlockType::Text, object([("content", string())]));
    m
});

/// Parse requested block type names.
///
/// Duplicates collapse (first occurrence wins the position). Unknown names
/// fail with every offending name listed.
pub fn parse_block_types<S: AsRef<str>>(names: &[S]) -> Result<Vec<BlockType>> {
    if names.is_empty() {
        return Err(DischargerError::NoBlockTypes);
    }

    let mut types = Vec::new();
    let mut unknown = Vec::new();
    for name in names {
        let name = name.as_ref();
        match BlockType::parse(name) {
            Some(t) if !types.contains(&t) => types.push(t),
            Some(_) => {}
            None => unknown.push(name.to_string()),
        }
    }

    if !unknown.is_empty() {
        return Err(DischargerError::UnknownBlockTypes(unknown));
    }
    Ok(types)
}

/// Schema of a block's `data` payload
pub fn data_schema(block_type: BlockType) -> Value {
    DATA_SCHEMAS
        .get(&block_type)
        .cloned()
        .unwrap_or_else(|| json!({ "type": "object" }))
}

/// Schema of one block in the model's output
pub fn block_item_schema(block_type: BlockType, flavor: SchemaFlavor) -> Value {
    let type_const = json!({ "type": "string", "const": block_type.as_str() });
    match flavor {
        SchemaFlavor::Generation => object([
            ("type", type_const),
            ("title", string()),
            ("data", data_schema(block_type)),
            ("citations", array_of(citation_schema())),
        ]),
        SchemaFlavor::Translation => object([
            ("id", string()),
            ("type", type_const),
            ("title", string()),
            ("data", data_schema(block_type)),
        ]),
    }
}

/// Schema of the full model output: `{"blocks": [item, ...]}`.
///
/// The item is the union of the given types' schemas; a single type
/// collapses to the plain object schema.
pub fn blocks_schema(types: &[BlockType], flavor: SchemaFlavor) -> Result<Value> {
    let items = match types {
        [] => return Err(DischargerError::NoBlockTypes),
        [only] => block_item_schema(*only, flavor),
        many => json!({
            "anyOf": many
                .iter()
                .map(|t| block_item_schema(*t, flavor))
                .collect::<Vec<_>>()
        }),
    };

    Ok(object([("blocks", array_of(items))]))
}

fn citation_schema() -> Value {
    object([
        ("source", enum_of(&["context", "document"])),
        ("documentId", nullable_string()),
        ("excerpt", string()),
    ])
}

fn object<const N: usize>(properties: [(&str, Value); N]) -> Value {
    let required: Vec<Value> = properties.iter().map(|(k, _)| json!(k)).collect();
    let mut props = Map::new();
    for (key, schema) in properties {
        props.insert(key.to_string(), schema);
    }
    json!({
        "type": "object",
        "properties": props,
        "required": required,
        "additionalProperties": false
    })
}

fn array_of(items: Value) -> Value {
    json!({ "type": "array", "items": items })
}

fn string() -> Value {
    json!({ "type": "string" })
}

fn nullable_string() -> Value {
    json!({ "type": ["string", "null"] })
}

fn enum_of(values: &[&str]) -> Value {
    json!({ "type": "string", "enum": values })
}

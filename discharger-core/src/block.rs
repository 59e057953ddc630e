use serde::{Deserialize, Serialize};

/// Discriminant of a block's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockType {
    Medication,
    Task,
    RedFlag,
    Appointment,
    Text,
}

impl BlockType {
    pub const ALL: [BlockType; 5] = [
        BlockType::Medication,
        BlockType::Task,
        BlockType::RedFlag,
        BlockType::Appointment,
        BlockType::Text,
    ];

    /// Wire name, as it appears in the `type` field of a block
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Medication => "medication",
            BlockType::Task => "task",
            BlockType::RedFlag => "redFlag",
            BlockType::Appointment => "appointment",
            BlockType::Text => "text",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of a block. Serialized as `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum BlockContent {
    Medication(MedicationData),
    Task(TaskData),
    RedFlag(RedFlagData),
    Appointment(AppointmentData),
    Text(TextData),
}

impl BlockContent {
    pub fn block_type(&self) -> BlockType {
        match self {
            BlockContent::Medication(_) => BlockType::Medication,
            BlockContent::Task(_) => BlockType::Task,
            BlockContent::RedFlag(_) => BlockType::RedFlag,
            BlockContent::Appointment(_) => BlockType::Appointment,
            BlockContent::Text(_) => BlockType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationData {
    pub medications: Vec<Medication>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    pub status: MedicationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MedicationStatus {
    New,
    Changed,
    Continued,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// YYYY-MM-DD
    #[serde(default)]
    pub due_date: Option<String>,
    pub priority: TaskPriority,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlagData {
    pub symptoms: Vec<RedFlagSymptom>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedFlagSymptom {
    pub symptom: String,
    #[serde(default)]
    pub description: Option<String>,
    pub severity: RedFlagSeverity,
    /// What the patient should do when the symptom appears
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RedFlagSeverity {
    Urgent,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentData {
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub title: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    /// YYYY-MM-DD
    #[serde(default)]
    pub date: Option<String>,
    /// HH:MM, 24h
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppointmentStatus {
    Scheduled,
    ToSchedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub content: String,
}

/// Where a cited excerpt comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CitationSource {
    /// The clinician-typed discharge text of the summary
    Context,
    Document,
}

/// An excerpt of source material supporting a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub source: CitationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub excerpt: String,
}

/// A unit of patient-facing content with server-owned metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub title: String,

    #[serde(flatten)]
    pub content: BlockContent,

    pub is_editable: bool,
    pub is_required: bool,
    pub created_at: String,
    pub updated_at: String,
    pub version: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

impl Block {
    /// Create a block with fresh metadata (new id, version 1, editable).
    pub fn new(title: impl Into<String>, content: BlockContent, now: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content,
            is_editable: true,
            is_required: false,
            created_at: now.to_string(),
            updated_at: now.to_string(),
            version: 1,
            citations: Vec::new(),
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.content.block_type()
    }

    /// True when the user-visible parts of two blocks differ
    pub fn content_differs(&self, other: &Block) -> bool {
        self.title != other.title || self.content != other.content
    }
}

/// Distinct block types in order of first appearance.
pub fn block_types_of(blocks: &[Block]) -> Vec<BlockType> {
    let mut types = Vec::new();
    for block in blocks {
        let t = block.block_type();
        if !types.contains(&t) {
            types.push(t);
        }
    }
    types
}

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::{CoreError, CoreErrorKind, TaskFlags};

pub type SchemaResult<T> = Result<T, CoreError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum FieldKind {
    Text,
    TextMap,
    Integer,
    Boolean,
}

#[derive(Clone, Copy, Debug)]
struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

const TASK_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "config",
        kind: FieldKind::Text,
        required: true,
    },
    FieldSpec {
        name: "input",
        kind: FieldKind::TextMap,
        required: true,
    },
    FieldSpec {
        name: "model",
        kind: FieldKind::Text,
        required: false,
    },
    FieldSpec {
        name: "redundancy",
        kind: FieldKind::Integer,
        required: false,
    },
    FieldSpec {
        name: "return_content_within_result_tag",
        kind: FieldKind::Boolean,
        required: false,
    },
    FieldSpec {
        name: "store_result_offchain",
        kind: FieldKind::Boolean,
        required: false,
    },
];

/// A task creation request after schema validation. Quorum fan-out builds
/// this directly; external callers go through [`validate_task_spec`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskSpec {
    pub config_ref: String,
    pub inputs: BTreeMap<String, String>,
    pub variant: Option<String>,
    pub redundancy: u32,
    pub flags: TaskFlags,
}

pub fn validate_task_spec(value: &Value) -> SchemaResult<TaskSpec> {
    let fields = value
        .as_object()
        .ok_or_else(|| schema_error("task spec must be an object"))?;

    for name in fields.keys() {
        if !TASK_FIELDS.iter().any(|spec| spec.name == name) {
            return Err(schema_error(format!("unknown field '{name}'")));
        }
    }
    for spec in TASK_FIELDS {
        match fields.get(spec.name) {
            None if spec.required => {
                return Err(schema_error(format!("missing required field '{}'", spec.name)));
            }
            Some(field) if !matches_kind(field, spec.kind) => {
                return Err(schema_error(format!(
                    "field '{}' must be a {}",
                    spec.name,
                    kind_name(spec.kind)
                )));
            }
            _ => {}
        }
    }

    let config_ref = fields["config"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| schema_error("field 'config' must be a string"))?;
    let inputs = text_map(&fields["input"]);
    let variant = fields
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string);
    let redundancy = match fields.get("redundancy").and_then(Value::as_u64) {
        Some(redundancy) if redundancy >= 1 && redundancy <= u32::MAX as u64 => redundancy as u32,
        Some(redundancy) => {
            return Err(schema_error(format!("redundancy {redundancy} out of range")));
        }
        None => 1,
    };
    let flags = TaskFlags {
        extract_result_tag: boolean_field(fields, "return_content_within_result_tag"),
        store_result_offchain: boolean_field(fields, "store_result_offchain"),
    };

    Ok(TaskSpec {
        config_ref,
        inputs,
        variant,
        redundancy,
        flags,
    })
}

fn matches_kind(field: &Value, kind: FieldKind) -> bool {
    match kind {
        FieldKind::Text => field.is_string(),
        FieldKind::TextMap => field
            .as_object()
            .is_some_and(|entries| entries.values().all(Value::is_string)),
        FieldKind::Integer => field.is_u64(),
        FieldKind::Boolean => field.is_boolean(),
    }
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "string",
        FieldKind::TextMap => "map of string to string",
        FieldKind::Integer => "non-negative integer",
        FieldKind::Boolean => "boolean",
    }
}

fn text_map(field: &Value) -> BTreeMap<String, String> {
    field
        .as_object()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|text| (key.clone(), text.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn boolean_field(fields: &serde_json::Map<String, Value>, name: &str) -> bool {
    fields.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn schema_error(message: impl Into<String>) -> CoreError {
    CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::Validation,
        message: message.into(),
    }
}

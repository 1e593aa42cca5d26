//! Artifact records attached to phases and tasks.
//!
//! An artifact is a typed, path-addressed record with an open metadata map.
//! Field writes that do not name one of the four direct fields (`type`,
//! `path`, `approved`, `created_at`) are routed into `metadata`, with dot
//! paths creating nested maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};

use super::{ValidationError, parse_scalar};

/// A typed artifact owned by a phase or task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    /// Artifact type; the value space is defined by the project type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Path relative to the project root. Never absolute, never escapes it.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
}

impl Artifact {
    pub fn new(kind: &str, path: &str) -> Self {
        Self {
            kind: kind.to_string(),
            path: path.to_string(),
            approved: None,
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Write a field by dot path.
    ///
    /// The four direct fields are written in place with type checking; any
    /// other leading component routes into `metadata`. A leading `metadata`
    /// component is stripped first, so `metadata.reviewer` and `reviewer`
    /// land in the same place.
    pub fn set_field(&mut self, field_path: &str, value: &str) -> Result<(), ValidationError> {
        let segments: Vec<&str> = field_path.split('.').collect();
        if segments.is_empty() || segments[0].is_empty() {
            return Err(ValidationError::new(field_path, "empty field path"));
        }

        match segments[0] {
            "type" if segments.len() == 1 => {
                self.kind = value.to_string();
                Ok(())
            }
            "path" if segments.len() == 1 => {
                validate_artifact_path(value).map_err(|m| ValidationError::new("path", &m))?;
                self.path = value.to_string();
                Ok(())
            }
            "approved" if segments.len() == 1 => {
                let parsed = value.parse::<bool>().map_err(|_| {
                    ValidationError::new("approved", &format!("expected true or false, got {value:?}"))
                })?;
                self.approved = Some(parsed);
                Ok(())
            }
            "created_at" if segments.len() == 1 => {
                let parsed = DateTime::parse_from_rfc3339(value).map_err(|e| {
                    ValidationError::new("created_at", &format!("invalid RFC 3339 timestamp: {e}"))
                })?;
                self.created_at = parsed.with_timezone(&Utc);
                Ok(())
            }
            "metadata" => {
                if segments.len() < 2 {
                    return Err(ValidationError::new(
                        field_path,
                        "metadata writes need a key, e.g. metadata.assessment",
                    ));
                }
                set_metadata_path(&mut self.metadata, &segments[1..], parse_scalar(value));
                Ok(())
            }
            _ => {
                set_metadata_path(&mut self.metadata, &segments, parse_scalar(value));
                Ok(())
            }
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approved.unwrap_or(false)
    }

    /// Read a metadata value by dot path, descending nested maps.
    pub fn metadata_value(&self, path: &str) -> Option<&serde_yaml::Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.metadata.get(first)?;
        for seg in segments {
            let key = serde_yaml::Value::from(seg);
            current = current.as_mapping()?.get(&key)?;
        }
        Some(current)
    }

    /// Metadata value rendered as a string, empty if absent.
    pub fn metadata_str(&self, path: &str) -> String {
        match self.metadata_value(path) {
            Some(serde_yaml::Value::String(s)) => s.clone(),
            Some(serde_yaml::Value::Bool(b)) => b.to_string(),
            Some(serde_yaml::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }
}

/// Write into a metadata map, creating intermediate mappings for dot paths.
pub fn set_metadata_path(
    metadata: &mut BTreeMap<String, serde_yaml::Value>,
    segments: &[&str],
    value: serde_yaml::Value,
) {
    if segments.len() == 1 {
        metadata.insert(segments[0].to_string(), value);
        return;
    }

    let entry = metadata
        .entry(segments[0].to_string())
        .or_insert_with(|| serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
    if !entry.is_mapping() {
        *entry = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }
    let mut current = entry;
    for (i, seg) in segments[1..].iter().enumerate() {
        let mapping = current.as_mapping_mut().expect("intermediate is a mapping");
        let key = serde_yaml::Value::from(*seg);
        let last = i == segments.len() - 2;
        if last {
            mapping.insert(key, value);
            return;
        }
        let next = mapping
            .entry(key)
            .or_insert_with(|| serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
        if !next.is_mapping() {
            *next = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        }
        current = next;
    }
}

/// Check that an artifact path is non-empty, relative, and stays inside the
/// project root.
pub fn validate_artifact_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("artifact path must not be empty".to_string());
    }
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(format!("artifact path must be relative: {path}"));
    }
    for component in p.components() {
        if matches!(component, Component::ParentDir) {
            return Err(format!("artifact path must not contain '..': {path}"));
        }
    }
    Ok(())
}

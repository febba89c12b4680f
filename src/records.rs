use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One raw record as the record store returns it: an id plus an untyped
/// field bag. Every field access downstream must tolerate absence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
    #[serde(rename = "createdTime", default)]
    pub created_time: String,
}

impl RawRecord {
    /// String field, trimmed; `None` if absent, non-string, or blank.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Linked-record id list. Accepts an array of strings or a single
    /// string; anything else yields an empty list.
    pub fn id_list(&self, name: &str) -> Vec<String> {
        match self.fields.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }

    /// First element of a rollup/array field, as a string.
    pub fn first_of_list(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Checkbox-style boolean: `true`, `"true"`, `"checked"`, or `1`.
    pub fn bool_field(&self, name: &str) -> bool {
        match self.fields.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => {
                let s = s.trim().to_ascii_lowercase();
                s == "true" || s == "checked" || s == "yes"
            }
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }
}

/// Collection table names in the record store and their snapshot file names.
pub const COLLECTIONS: &[(&str, &str)] = &[
    ("Stories", "stories.json"),
    ("Storytellers", "storytellers.json"),
    ("Themes", "themes.json"),
    ("Media", "media.json"),
    ("Quotes", "quotes.json"),
];

/// The raw input: one record list per entity kind. A missing collection is
/// simply empty — downstream stages degrade rather than abort.
#[derive(Debug, Clone, Default)]
pub struct Collections {
    pub stories: Vec<RawRecord>,
    pub storytellers: Vec<RawRecord>,
    pub themes: Vec<RawRecord>,
    pub media: Vec<RawRecord>,
    pub quotes: Vec<RawRecord>,
}

/// Id-keyed maps over the raw collections, for O(1) reference resolution.
pub struct Lookup<'a> {
    pub stories: HashMap<&'a str, &'a RawRecord>,
    pub storytellers: HashMap<&'a str, &'a RawRecord>,
    pub themes: HashMap<&'a str, &'a RawRecord>,
    pub media: HashMap<&'a str, &'a RawRecord>,
    pub quotes: HashMap<&'a str, &'a RawRecord>,
}

fn by_id(records: &[RawRecord]) -> HashMap<&str, &RawRecord> {
    records.iter().map(|r| (r.id.as_str(), r)).collect()
}

impl Collections {
    pub fn lookup(&self) -> Lookup<'_> {
        Lookup {
            stories: by_id(&self.stories),
            storytellers: by_id(&self.storytellers),
            themes: by_id(&self.themes),
            media: by_id(&self.media),
            quotes: by_id(&self.quotes),
        }
    }

    pub fn get_mut(&mut self, table: &str) -> &mut Vec<RawRecord> {
        match table {
            "Stories" => &mut self.stories,
            "Storytellers" => &mut self.storytellers,
            "Themes" => &mut self.themes,
            "Media" => &mut self.media,
            "Quotes" => &mut self.quotes,
            other => panic!("unknown collection {other}"),
        }
    }

    pub fn total_records(&self) -> usize {
        self.stories.len()
            + self.storytellers.len()
            + self.themes.len()
            + self.media.len()
            + self.quotes.len()
    }

    /// Load a snapshot directory (one JSON array per collection). Absent
    /// files degrade to empty collections; a file that exists but does not
    /// parse as a record array is the one fatal input error.
    pub fn from_snapshot(dir: &Path) -> Result<Self> {
        let mut out = Self::default();
        for (table, file) in COLLECTIONS {
            let path = dir.join(file);
            if !path.exists() {
                warn!("Snapshot missing {}; treating {} as empty", file, table);
                continue;
            }
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("read snapshot file {:?}", path))?;
            let records: Vec<RawRecord> = serde_json::from_str(&raw)
                .with_context(|| format!("parse snapshot file {:?}", path))?;
            *out.get_mut(table) = drop_unidentified(table, records);
        }
        Ok(out)
    }

    /// Write the raw collections back out as a snapshot directory.
    pub fn save_snapshot(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
        for (table, file) in COLLECTIONS {
            let records = match *table {
                "Stories" => &self.stories,
                "Storytellers" => &self.storytellers,
                "Themes" => &self.themes,
                "Media" => &self.media,
                _ => &self.quotes,
            };
            let path = dir.join(file);
            let json = serde_json::to_string_pretty(records)?;
            std::fs::write(&path, json).with_context(|| format!("write {:?}", path))?;
        }
        Ok(())
    }
}

/// A record without an id can never be referenced; drop it here so no later
/// stage has to handle the case.
pub fn drop_unidentified(table: &str, records: Vec<RawRecord>) -> Vec<RawRecord> {
    let before = records.len();
    let kept: Vec<RawRecord> = records.into_iter().filter(|r| !r.id.is_empty()).collect();
    if kept.len() < before {
        warn!("Dropped {} {} records without ids", before - kept.len(), table);
    }
    kept
}

// ── Tests ──

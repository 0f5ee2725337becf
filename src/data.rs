//! Outputs produced by stages.
//!
//! A [`Data`] is the result of running one link of a document pipeline. It is
//! mostly opaque to the engine: stages only care about its extension, which
//! decides what filters can consume it next, and its textual form.
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Hash32;
use crate::error::{Error, Result};

/// Payload of a [`Data`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text(String),
    /// Named sections, kept in order.
    Sections(Vec<(String, String)>),
    /// Structured results accumulated by a filter.
    KeyValue(KeyValue),
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Text(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Text(value.to_string())
    }
}

impl From<KeyValue> for Content {
    fn from(value: KeyValue) -> Self {
        Content::KeyValue(value)
    }
}

/// Key-value storage filled in by structured filters.
///
/// Entries are appended while the filter runs and the whole store can be
/// saved once it's finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    entries: BTreeMap<String, Value>,
}

impl KeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any earlier value under the same key.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }

    /// Writes the store as JSON into `dir` under `name`, creating the
    /// directory if needed.
    pub fn save(&self, dir: &Utf8Path, name: &str) -> Result<Utf8PathBuf> {
        let path = dir.join(name).with_extension("json");
        let json = self
            .to_json()
            .map_err(|e| Error::Serialize(name.to_string(), e))?;

        fs::create_dir_all(dir).map_err(|e| Error::Save(dir.to_owned(), e))?;
        fs::write(&path, json).map_err(|e| Error::Save(path.clone(), e))?;

        Ok(path)
    }
}

/// Output of a completed stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Data {
    key: String,
    ext: String,
    content: Content,
}

impl Data {
    pub fn new(key: impl Into<String>, ext: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            key: key.into(),
            ext: ext.into(),
            content: content.into(),
        }
    }

    /// Key of the stage which produced this data.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Extension including the leading dot, e.g. `.txt`. Empty when the
    /// document has no extension.
    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Textual form of the content. Sections are concatenated in order,
    /// key-value stores are rendered as JSON.
    pub fn text(&self) -> Cow<'_, str> {
        match &self.content {
            Content::Text(text) => Cow::Borrowed(text),
            Content::Sections(sections) => {
                Cow::Owned(sections.iter().map(|(_, s)| s.as_str()).collect())
            }
            Content::KeyValue(kv) => Cow::Owned(kv.to_json().unwrap_or_default()),
        }
    }

    /// Sections of the content. Plain text is a single section named "1".
    pub fn sections(&self) -> Cow<'_, [(String, String)]> {
        match &self.content {
            Content::Sections(sections) => Cow::Borrowed(sections),
            _ => Cow::Owned(vec![("1".to_string(), self.text().into_owned())]),
        }
    }

    pub fn key_value(&self) -> Option<&KeyValue> {
        match &self.content {
            Content::KeyValue(kv) => Some(kv),
            _ => None,
        }
    }

    pub fn hash(&self) -> Hash32 {
        Hash32::hash(self.text().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_from_sections() {
        let data = Data::new(
            "abc.txt",
            ".txt",
            Content::Sections(vec![
                ("1".into(), "these are ".into()),
                ("2".into(), "the contents".into()),
            ]),
        );

        assert_eq!(data.text(), "these are the contents");
        assert_eq!(data.sections().len(), 2);
        assert!(data.key_value().is_none());
    }

    #[test]
    fn test_text_is_single_section() {
        let data = Data::new("abc.txt", ".txt", "hello");
        let sections = data.sections();
        assert_eq!(sections.as_ref(), &[("1".to_string(), "hello".to_string())]);
    }

    #[test]
    fn test_key_value_append() {
        let mut kv = KeyValue::new();
        kv.append("a", 1).append("b", "two").append("a", 3);

        assert_eq!(kv.len(), 2);
        assert_eq!(kv.get("a"), Some(&Value::from(3)));

        let data = Data::new("x.txt|kvlines", ".json", kv);
        assert!(data.text().contains("\"two\""));
        assert!(data.key_value().is_some());
    }

    #[test]
    fn test_hash_follows_text() {
        let a = Data::new("a.txt", ".txt", "same");
        let b = Data::new("b.md", ".md", "same");
        assert_eq!(a.hash(), b.hash());
    }
}

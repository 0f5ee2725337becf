use std::sync::Arc;

use anyhow::{Context, anyhow};

use crate::core::Args;
use crate::data::{Content, Data, KeyValue};
use crate::filter::Filter;

pub(crate) fn all() -> Vec<Arc<dyn Filter>> {
    vec![
        Arc::new(Identity),
        Arc::new(ProcessText),
        Arc::new(OutputAbc),
        Arc::new(KeyValueLines),
    ]
}

/// Passes its input through unchanged.
pub struct Identity;

impl Filter for Identity {
    fn aliases(&self) -> &[&'static str] {
        &["dexy"]
    }

    fn process(&self, input: &Data, _: &Args) -> anyhow::Result<Content> {
        Ok(input.content().clone())
    }
}

/// Wraps the text of its input in a short note, optionally preceded by the
/// `prefix` string from its configuration.
pub struct ProcessText;

impl Filter for ProcessText {
    fn aliases(&self) -> &[&'static str] {
        &["processtext"]
    }

    fn output_extensions(&self) -> &[&'static str] {
        &[".txt"]
    }

    fn process(&self, input: &Data, config: &Args) -> anyhow::Result<Content> {
        let prefix = match config.get("prefix") {
            None => "",
            Some(value) => value
                .as_str()
                .ok_or_else(|| anyhow!("'prefix' has to be a string, got {value}"))?,
        };

        Ok(Content::Text(format!(
            "{prefix}Dexy processed the text '{}'",
            input.text()
        )))
    }
}

/// Identity which always produces `.abc`.
pub struct OutputAbc;

impl Filter for OutputAbc {
    fn aliases(&self) -> &[&'static str] {
        &["outputabc"]
    }

    fn output_extensions(&self) -> &[&'static str] {
        &[".abc"]
    }

    fn process(&self, input: &Data, _: &Args) -> anyhow::Result<Content> {
        Ok(input.content().clone())
    }
}

/// Reads `key: value` lines into key-value data. Blank lines and lines
/// starting with `#` are skipped.
pub struct KeyValueLines;

impl Filter for KeyValueLines {
    fn aliases(&self) -> &[&'static str] {
        &["kvlines"]
    }

    fn input_extensions(&self) -> &[&'static str] {
        &[".txt", ".yaml", ".kv"]
    }

    fn output_extensions(&self) -> &[&'static str] {
        &[".json"]
    }

    fn process(&self, input: &Data, _: &Args) -> anyhow::Result<Content> {
        let mut kv = KeyValue::new();

        for (number, line) in input.text().lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line
                .split_once(':')
                .with_context(|| format!("line {} has no ':' separator", number + 1))?;

            kv.append(key.trim(), value.trim());
        }

        Ok(Content::KeyValue(kv))
    }
}

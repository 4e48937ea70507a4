//! Field-name to topic-segment resolution.

use crate::config::TopicSettings;
use std::collections::HashMap;

/// Maps logical field names onto configured topic segments.
///
/// Lookup is case-insensitive and total: a field without a configured segment
/// resolves to itself, so topic building never fails. The map is rebuilt on
/// configuration changes and immutable during a publishing cycle.
#[derive(Debug, Clone)]
pub struct TopicMap {
    root: String,
    lowercase: bool,
    segments: HashMap<String, String>,
}

impl TopicMap {
    pub fn new(root: String, lowercase: bool, overrides: HashMap<String, String>) -> Self {
        let segments = overrides
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            root,
            lowercase,
            segments,
        }
    }

    pub fn from_settings(settings: &TopicSettings) -> Self {
        Self::new(
            settings.root.clone(),
            settings.lowercase,
            settings.overrides.clone(),
        )
    }

    /// Resolves a logical field name to its configured topic segment,
    /// falling back to the field name itself.
    pub fn resolve(&self, field: &str) -> String {
        match self.segments.get(&field.to_ascii_lowercase()) {
            Some(segment) => segment.clone(),
            None => field.to_string(),
        }
    }

    /// Joins the root prefix and the given segments into a full topic,
    /// applying global lowercasing when configured.
    pub fn join(&self, parts: &[&str]) -> String {
        let mut topic = String::from(&self.root);
        for part in parts {
            topic.push('/');
            topic.push_str(part);
        }
        if self.lowercase {
            topic.make_ascii_lowercase();
        }
        topic
    }
}

//! Tag to value mapping exchanged in every frame

use crate::tag::Tag;
use crate::LIST_DELIMITER;
use std::collections::BTreeMap;

/// A decoded protocol message. A single message may carry several tags, e.g.
/// an OK acknowledgement together with a roll result and option tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    fields: BTreeMap<Tag, String>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a message holding a single tag
    pub fn single(tag: Tag, value: impl Into<String>) -> Self {
        Self::new().with(tag, value)
    }

    /// Builder-style insert
    pub fn with(mut self, tag: Tag, value: impl Into<String>) -> Self {
        self.insert(tag, value);
        self
    }

    /// Builder-style insert of a list value, joined with the list delimiter
    pub fn with_list<S: AsRef<str>>(mut self, tag: Tag, items: &[S]) -> Self {
        self.insert_list(tag, items);
        self
    }

    pub fn insert(&mut self, tag: Tag, value: impl Into<String>) {
        self.fields.insert(tag, value.into());
    }

    pub fn insert_list<S: AsRef<str>>(&mut self, tag: Tag, items: &[S]) {
        let joined = items
            .iter()
            .map(|item| item.as_ref())
            .collect::<Vec<_>>()
            .join(&LIST_DELIMITER.to_string());
        self.fields.insert(tag, joined);
    }

    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.fields.get(&tag).map(String::as_str)
    }

    /// Splits a list value back into its items. An empty value is an empty list.
    pub fn get_list(&self, tag: Tag) -> Option<Vec<String>> {
        self.get(tag).map(|value| {
            if value.is_empty() {
                Vec::new()
            } else {
                value.split(LIST_DELIMITER).map(str::to_string).collect()
            }
        })
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.fields.contains_key(&tag)
    }

    /// Tags present in this message, in wire order
    pub fn tags(&self) -> Vec<Tag> {
        self.fields.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &str)> {
        self.fields.iter().map(|(tag, value)| (*tag, value.as_str()))
    }

    pub fn is_ack(&self) -> bool {
        self.contains(Tag::Ok) || self.contains(Tag::Fail)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

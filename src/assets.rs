use crate::config::{AssetOptions, Scalar};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ordered attribute list. Re-inserting a key updates it in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Sets `name` only when it is not present yet.
    pub fn insert_default(&mut self, name: &str, value: &str) {
        if !self.contains(name) {
            self.0.push((name.to_string(), value.to_string()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(k, _)| k == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn merge(&mut self, other: Attributes) {
        for (name, value) in other.0 {
            self.insert(name, value);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AttributesVisitor;

        impl<'de> Visitor<'de> for AttributesVisitor {
            type Value = Attributes;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of attribute names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Attributes, A::Error> {
                let mut attrs = Attributes::new();
                while let Some((name, value)) = access.next_entry::<String, Scalar>()? {
                    attrs.insert(name, value.to_text());
                }
                Ok(attrs)
            }
        }

        deserializer.deserialize_map(AttributesVisitor)
    }
}

/// A registered script, either a file reference or inline code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub identifier: String,
    pub source: String,
    pub attributes: Attributes,
    pub options: AssetOptions,
}

/// Per-request registry of scripts to emit into the page.
///
/// Both collections keep registration order. Hosts must use a fresh
/// collector (or [`AssetCollector::clear`]) for every page request.
#[derive(Debug, Default)]
pub struct AssetCollector {
    scripts: Vec<Asset>,
    inline_scripts: Vec<Asset>,
}

impl AssetCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_script(
        &mut self,
        identifier: impl Into<String>,
        source: impl Into<String>,
        attributes: Attributes,
        options: AssetOptions,
    ) {
        upsert(
            &mut self.scripts,
            identifier.into(),
            source.into(),
            attributes,
            options,
        );
    }

    pub fn add_inline_script(
        &mut self,
        identifier: impl Into<String>,
        code: impl Into<String>,
        attributes: Attributes,
        options: AssetOptions,
    ) {
        upsert(
            &mut self.inline_scripts,
            identifier.into(),
            code.into(),
            attributes,
            options,
        );
    }

    pub fn scripts(&self) -> &[Asset] {
        &self.scripts
    }

    pub fn inline_scripts(&self) -> &[Asset] {
        &self.inline_scripts
    }

    pub fn has_script(&self, identifier: &str) -> bool {
        self.scripts.iter().any(|a| a.identifier == identifier)
    }

    pub fn has_inline_script(&self, identifier: &str) -> bool {
        self.inline_scripts.iter().any(|a| a.identifier == identifier)
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.inline_scripts.is_empty()
    }

    pub fn clear(&mut self) {
        self.scripts.clear();
        self.inline_scripts.clear();
    }
}

fn upsert(
    assets: &mut Vec<Asset>,
    identifier: String,
    source: String,
    attributes: Attributes,
    options: AssetOptions,
) {
    if let Some(existing) = assets.iter_mut().find(|a| a.identifier == identifier) {
        existing.source = source;
        existing.attributes.merge(attributes);
        existing.options.merge(options);
        return;
    }
    assets.push(Asset {
        identifier,
        source,
        attributes,
        options,
    });
}

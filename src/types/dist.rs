//! Dist metadata.

use thiserror::Error;

use crate::codec::{Document, Table, Value};
use crate::config::Config;
use crate::host;
use crate::types::constraint::{ConstraintError, ConstraintList};

#[derive(Error, Debug)]
pub enum InfoError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` has the wrong type")]
    FieldType(&'static str),
    #[error("invalid character in {field} `{value}`")]
    InvalidChar { field: &'static str, value: String },
    #[error("invalid `{field}` entry: {source}")]
    Constraint {
        field: &'static str,
        source: ConstraintError,
    },
}

/// Metadata describing one artifact, as carried by its `dist.info`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DistInfo {
    pub name: String,
    pub version: String,
    pub arch: Option<String>,
    pub dist_type: Option<String>,
    pub depends: Option<ConstraintList>,
    pub conflicts: Option<ConstraintList>,
    pub provides: Option<ConstraintList>,
    pub url: Option<String>,
    pub desc: Option<String>,
    pub author: Option<String>,
    pub maintainer: Option<String>,
    pub license: Option<String>,
    pub message: Option<String>,
    /// Origin locator; populated by the manifest pipeline, never by authors.
    pub path: Option<String>,
    /// Deployment-relative installed paths; populated on deployment.
    pub files: Vec<String>,
    /// Back-reference to the providing dist for synthesized records.
    pub provided: Option<Box<DistInfo>>,
}

/// Split a `name-version` string at the first dash that starts the version,
/// recognized by its leading digit. Both halves may themselves carry dashes.
pub fn split_name_version(s: &str) -> Option<(&str, &str)> {
    let bytes = s.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'-' && bytes.get(i + 1).is_some_and(|c| c.is_ascii_digit()) && i > 0 {
            return Some((&s[..i], &s[i + 1..]));
        }
    }
    None
}

fn valid_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | ':' | '_' | '-'))
}

fn valid_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

impl DistInfo {
    /// `<name>-<version>` identifier.
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Architecture, defaulting to `Universal`.
    pub fn arch(&self) -> &str {
        self.arch.as_deref().unwrap_or(host::UNIVERSAL)
    }

    /// Type, defaulting to `source`.
    pub fn dist_type(&self) -> &str {
        self.dist_type.as_deref().unwrap_or(host::SOURCE)
    }

    pub fn depends_for(&self, cfg: &Config) -> Vec<String> {
        self.depends
            .as_ref()
            .map(|list| list.for_host(&cfg.arch, &cfg.dist_type))
            .unwrap_or_default()
    }

    pub fn conflicts_for(&self, cfg: &Config) -> Vec<String> {
        self.conflicts
            .as_ref()
            .map(|list| list.for_host(&cfg.arch, &cfg.dist_type))
            .unwrap_or_default()
    }

    pub fn provides_for(&self, cfg: &Config) -> Vec<String> {
        self.provides
            .as_ref()
            .map(|list| list.for_host(&cfg.arch, &cfg.dist_type))
            .unwrap_or_default()
    }

    /// Synthesize the record a `provides` entry stands for. It inherits this
    /// dist's arch and type, carries no dependencies of its own, and points
    /// back at its provider.
    pub fn provided_record(&self, name: &str, version: &str) -> DistInfo {
        DistInfo {
            name: name.to_string(),
            version: version.to_string(),
            arch: Some(self.arch().to_string()),
            dist_type: Some(self.dist_type().to_string()),
            provided: Some(Box::new(self.clone())),
            ..Default::default()
        }
    }

    /// Apply defaults and enforce the field rules. Called by the manifest
    /// pipeline before a record may enter a manifest.
    pub fn validate(&mut self) -> Result<(), InfoError> {
        if self.name.is_empty() {
            return Err(InfoError::MissingField("name"));
        }
        if self.version.is_empty() {
            return Err(InfoError::MissingField("version"));
        }
        if !valid_name(&self.name) {
            return Err(InfoError::InvalidChar {
                field: "name",
                value: self.name.clone(),
            });
        }
        if !valid_name(&self.version) {
            return Err(InfoError::InvalidChar {
                field: "version",
                value: self.version.clone(),
            });
        }
        if self.arch.is_none() {
            self.arch = Some(host::UNIVERSAL.to_string());
        }
        if self.dist_type.is_none() {
            self.dist_type = Some(host::SOURCE.to_string());
        }
        if !valid_word(self.arch()) {
            return Err(InfoError::InvalidChar {
                field: "arch",
                value: self.arch().to_string(),
            });
        }
        if !valid_word(self.dist_type()) {
            return Err(InfoError::InvalidChar {
                field: "type",
                value: self.dist_type().to_string(),
            });
        }
        for (field, list) in [
            ("depends", &self.depends),
            ("conflicts", &self.conflicts),
            ("provides", &self.provides),
        ] {
            if let Some(list) = list {
                list.validate()
                    .map_err(|source| InfoError::Constraint { field, source })?;
            }
        }
        Ok(())
    }

    /// Build from a parsed `dist.info` document.
    pub fn from_document(document: &Document) -> Result<Self, InfoError> {
        Self::from_pairs(&document.entries)
    }

    /// Build from one manifest entry.
    pub fn from_table(table: &Table) -> Result<Self, InfoError> {
        Self::from_pairs(&table.map)
    }

    fn from_pairs(pairs: &[(String, Value)]) -> Result<Self, InfoError> {
        fn string(value: &Value, field: &'static str) -> Result<String, InfoError> {
            value
                .as_str()
                .map(str::to_string)
                .ok_or(InfoError::FieldType(field))
        }

        fn list(value: &Value, field: &'static str) -> Result<ConstraintList, InfoError> {
            value
                .as_table()
                .map(|t| ConstraintList(t.clone()))
                .ok_or(InfoError::FieldType(field))
        }

        let mut info = DistInfo::default();
        for (key, value) in pairs {
            match key.as_str() {
                "name" => info.name = string(value, "name")?,
                "version" => info.version = string(value, "version")?,
                "arch" => info.arch = Some(string(value, "arch")?),
                "type" => info.dist_type = Some(string(value, "type")?),
                "depends" => info.depends = Some(list(value, "depends")?),
                "conflicts" => info.conflicts = Some(list(value, "conflicts")?),
                "provides" => info.provides = Some(list(value, "provides")?),
                "url" => info.url = Some(string(value, "url")?),
                "desc" => info.desc = Some(string(value, "desc")?),
                "author" => info.author = Some(string(value, "author")?),
                "maintainer" => info.maintainer = Some(string(value, "maintainer")?),
                "license" => info.license = Some(string(value, "license")?),
                "message" => info.message = Some(string(value, "message")?),
                "path" => info.path = Some(string(value, "path")?),
                "files" => {
                    let table = value.as_table().ok_or(InfoError::FieldType("files"))?;
                    info.files = table
                        .seq
                        .iter()
                        .map(|v| string(v, "files"))
                        .collect::<Result<_, _>>()?;
                }
                // author-supplied extras are carried by the file, not the model
                _ => {}
            }
        }
        if info.name.is_empty() {
            return Err(InfoError::MissingField("name"));
        }
        if info.version.is_empty() {
            return Err(InfoError::MissingField("version"));
        }
        Ok(info)
    }

    /// Serialize to a `dist.info` document.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::default();
        for (key, value) in self.to_pairs() {
            doc.push(key, value);
        }
        doc
    }

    /// Serialize to one manifest entry.
    pub fn to_table(&self) -> Table {
        Table {
            seq: Vec::new(),
            map: self
                .to_pairs()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    fn to_pairs(&self) -> Vec<(&'static str, Value)> {
        let mut pairs = vec![
            ("name", Value::Str(self.name.clone())),
            ("version", Value::Str(self.version.clone())),
        ];
        for (key, value) in [
            ("arch", &self.arch),
            ("type", &self.dist_type),
            ("desc", &self.desc),
            ("author", &self.author),
            ("maintainer", &self.maintainer),
            ("license", &self.license),
            ("url", &self.url),
            ("message", &self.message),
        ] {
            if let Some(value) = value {
                pairs.push((key, Value::Str(value.clone())));
            }
        }
        for (key, list) in [
            ("depends", &self.depends),
            ("conflicts", &self.conflicts),
            ("provides", &self.provides),
        ] {
            if let Some(list) = list {
                pairs.push((key, Value::Table(list.0.clone())));
            }
        }
        if let Some(path) = &self.path {
            pairs.push(("path", Value::Str(path.clone())));
        }
        if !self.files.is_empty() {
            pairs.push((
                "files",
                Value::Table(Table {
                    seq: self.files.iter().map(|f| Value::Str(f.clone())).collect(),
                    map: Vec::new(),
                }),
            ));
        }
        pairs
    }
}

//! Name constraints and host-keyed constraint lists.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use crate::codec::{Table, Value};
use crate::core::version;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("empty constraint")]
    Empty,
    #[error("invalid character `{1}` in constraint `{0}`")]
    InvalidChar(String, char),
    #[error("missing version after operator in `{0}`")]
    MissingVersion(String),
    #[error("constraint entries must be strings or nested tables")]
    EntryKind,
}

/// A comparison operator over versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ConstraintOp {
    fn as_str(&self) -> &'static str {
        match self {
            ConstraintOp::Eq => "==",
            ConstraintOp::Ne => "~=",
            ConstraintOp::Lt => "<",
            ConstraintOp::Le => "<=",
            ConstraintOp::Gt => ">",
            ConstraintOp::Ge => ">=",
        }
    }

    fn holds(&self, candidate: &str, reference: &str) -> bool {
        let order = version::compare(candidate, reference);
        match self {
            ConstraintOp::Eq => order == Ordering::Equal,
            ConstraintOp::Ne => order != Ordering::Equal,
            ConstraintOp::Lt => order == Ordering::Less,
            ConstraintOp::Le => order != Ordering::Greater,
            ConstraintOp::Gt => order == Ordering::Greater,
            ConstraintOp::Ge => order != Ordering::Less,
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | ':' | '_' | '-')
}

/// Parsed form of one constraint entry: a name plus zero or more
/// `(op, version)` pairs, all of which must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameConstraint {
    pub name: String,
    pub constraints: Vec<(ConstraintOp, String)>,
}

impl NameConstraint {
    /// Parse an entry such as `name`, `name >= 1.2`, or `name>=1.2<2`.
    pub fn parse(raw: &str) -> Result<Self, ConstraintError> {
        let mut chars = raw.trim().chars().peekable();

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if is_name_char(c) {
                name.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(ConstraintError::Empty);
        }

        let mut constraints = Vec::new();
        loop {
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            let Some(&c) = chars.peek() else { break };
            let op = match c {
                '=' => {
                    chars.next();
                    if chars.peek() == Some(&'=') {
                        chars.next();
                    }
                    ConstraintOp::Eq
                }
                '~' | '!' => {
                    chars.next();
                    if chars.next() != Some('=') {
                        return Err(ConstraintError::InvalidChar(raw.to_string(), c));
                    }
                    ConstraintOp::Ne
                }
                '<' => {
                    chars.next();
                    if chars.peek() == Some(&'=') {
                        chars.next();
                        ConstraintOp::Le
                    } else {
                        ConstraintOp::Lt
                    }
                }
                '>' => {
                    chars.next();
                    if chars.peek() == Some(&'=') {
                        chars.next();
                        ConstraintOp::Ge
                    } else {
                        ConstraintOp::Gt
                    }
                }
                other => return Err(ConstraintError::InvalidChar(raw.to_string(), other)),
            };
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            let mut reference = String::new();
            while let Some(&c) = chars.peek() {
                if is_name_char(c) {
                    reference.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if reference.is_empty() {
                return Err(ConstraintError::MissingVersion(raw.to_string()));
            }
            constraints.push((op, reference));
        }

        Ok(Self { name, constraints })
    }

    /// Whether `candidate` satisfies every `(op, version)` pair.
    pub fn admits(&self, candidate: &str) -> bool {
        self.constraints
            .iter()
            .all(|(op, reference)| op.holds(candidate, reference))
    }
}

impl fmt::Display for NameConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (op, reference) in &self.constraints {
            write!(f, " {} {}", op.as_str(), reference)?;
        }
        Ok(())
    }
}

/// A `depends`/`conflicts`/`provides` field.
///
/// Carries the raw table: a positional list of constraint strings,
/// optionally keyed by arch (then by type) to select a host variant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstraintList(pub Table);

impl ConstraintList {
    /// A flat list, for synthesized records and tests.
    pub fn plain<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConstraintList(Table {
            seq: entries.into_iter().map(|s| Value::Str(s.into())).collect(),
            map: Vec::new(),
        })
    }

    /// Entries applying on the given host: descend by arch key if present,
    /// then by type key, then take the positional entries of that level.
    pub fn for_host(&self, arch: &str, dist_type: &str) -> Vec<String> {
        let mut level = &self.0;
        if let Some(Value::Table(sub)) = level.get(arch) {
            level = sub;
        }
        if let Some(Value::Table(sub)) = level.get(dist_type) {
            level = sub;
        }
        level
            .seq
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Check every entry of every branch parses as a constraint.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        Self::validate_table(&self.0)
    }

    fn validate_table(table: &Table) -> Result<(), ConstraintError> {
        for value in table.seq.iter().chain(table.map.iter().map(|(_, v)| v)) {
            match value {
                Value::Str(s) => {
                    NameConstraint::parse(s)?;
                }
                Value::Table(sub) => Self::validate_table(sub)?,
                _ => return Err(ConstraintError::EntryKind),
            }
        }
        Ok(())
    }
}

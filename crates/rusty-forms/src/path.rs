// File: src/path.rs
// Purpose: Field paths (positional, user-facing) and stable paths (keyed, internal)

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::array::EntryKey;
use crate::error::FormError;

/// One step of a [`FieldPath`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Named member of an object, e.g. `email`
    Key(String),
    /// Position inside an array, e.g. `[2]`
    Index(usize),
}

/// Addressable location within a record, e.g. `witnesses[2].email`.
///
/// Parsing accepts both bracket (`witnesses[2].email`) and dotted
/// (`witnesses.2.email`) index notation. Display always uses brackets.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// The empty path, addressing the whole record
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path from its textual form
    pub fn parse(raw: &str) -> Result<Self, FormError> {
        let invalid = || FormError::InvalidPath(raw.to_string());
        let mut segments = Vec::new();
        let mut chars = raw.chars().peekable();
        let mut expect_name = true;

        while let Some(&c) = chars.peek() {
            match c {
                '[' => {
                    if expect_name {
                        return Err(invalid());
                    }
                    chars.next();
                    let mut digits = String::new();
                    while let Some(&d) = chars.peek() {
                        if d == ']' {
                            break;
                        }
                        digits.push(d);
                        chars.next();
                    }
                    if chars.next() != Some(']') || segments.is_empty() {
                        return Err(invalid());
                    }
                    let index = digits.parse::<usize>().map_err(|_| invalid())?;
                    segments.push(Segment::Index(index));
                    expect_name = false;
                }
                '.' => {
                    if expect_name {
                        return Err(invalid());
                    }
                    chars.next();
                    expect_name = true;
                }
                _ => {
                    if !expect_name {
                        return Err(invalid());
                    }
                    let mut name = String::new();
                    while let Some(&n) = chars.peek() {
                        if n == '.' || n == '[' {
                            break;
                        }
                        if !(n.is_ascii_alphanumeric() || n == '_') {
                            return Err(invalid());
                        }
                        name.push(n);
                        chars.next();
                    }
                    let segment = match name.parse::<usize>() {
                        Ok(index) if !segments.is_empty() => Segment::Index(index),
                        Ok(_) => return Err(invalid()),
                        Err(_) => Segment::Key(name),
                    };
                    segments.push(segment);
                    expect_name = false;
                }
            }
        }

        if segments.is_empty() || expect_name {
            return Err(invalid());
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a named segment
    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.segments.push(Segment::Key(name.into()));
        self
    }

    /// Append an index segment
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    /// The first `len` segments
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }

    /// Concatenate a relative path onto this one
    pub fn join(&self, relative: &FieldPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Self { segments }
    }

    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// True when one path contains the other. A write to either affects the other's value.
    pub fn is_related(&self, other: &FieldPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(name) if i == 0 => write!(f, "{}", name)?,
                Segment::Key(name) => write!(f, ".{}", name)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = FormError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One step of a [`StablePath`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Anchor {
    Key(String),
    /// Array entry by synthetic key rather than position
    Entry(EntryKey),
}

/// Position-independent twin of a [`FieldPath`].
///
/// Array indices are replaced by the entry's synthetic key, so a stable path keeps
/// naming the same entry when siblings are removed. Errors, metadata and async
/// subject keys are stored under stable paths and projected to positions at read time.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StablePath {
    anchors: Vec<Anchor>,
}

impl StablePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.anchors.push(Anchor::Key(name.into()));
        self
    }

    pub fn entry(mut self, key: EntryKey) -> Self {
        self.anchors.push(Anchor::Entry(key));
        self
    }

    pub(crate) fn push(&mut self, anchor: Anchor) {
        self.anchors.push(anchor);
    }

    pub fn starts_with(&self, prefix: &StablePath) -> bool {
        self.anchors.starts_with(&prefix.anchors)
    }

    pub fn is_related(&self, other: &StablePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// True when the path runs through the given array entry
    pub fn passes_through(&self, key: EntryKey) -> bool {
        self.anchors.contains(&Anchor::Entry(key))
    }
}

impl fmt::Display for StablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, anchor) in self.anchors.iter().enumerate() {
            match anchor {
                Anchor::Key(name) if i == 0 => write!(f, "{}", name)?,
                Anchor::Key(name) => write!(f, ".{}", name)?,
                Anchor::Entry(key) => write!(f, "[{}]", key)?,
            }
        }
        Ok(())
    }
}

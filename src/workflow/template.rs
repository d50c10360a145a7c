//! `${reference}` templates.
//!
//! Every interpolatable string in a workflow is parsed once, at load time,
//! into a [`Template`]: an ordered list of literal text and [`Reference`]
//! segments. The validators, the dependency graph builder and the runtime
//! resolver all walk this one representation.

use serde::{Deserialize, Serialize};

/// A single `${...}` reference.
///
/// `${fetch.output}` has head `fetch` and field `output`; `${topic}` has
/// head `topic` and no field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Trimmed text between `${` and `}`.
    pub raw: String,
    /// Segment before the first dot (or the whole reference).
    pub head: String,
    /// Segment after the first dot, if any.
    pub field: Option<String>,
}

impl Reference {
    pub fn parse(inner: &str) -> Self {
        let raw = inner.trim().to_string();
        match raw.split_once('.') {
            Some((head, field)) => Self {
                head: head.trim().to_string(),
                field: Some(field.trim().to_string()),
                raw,
            },
            None => Self {
                head: raw.clone(),
                field: None,
                raw,
            },
        }
    }

    /// True for `${name.field}` style references.
    pub fn is_dotted(&self) -> bool {
        self.field.is_some()
    }

    /// The original token, e.g. `${fetch.output}`.
    pub fn token(&self) -> String {
        format!("${{{}}}", self.raw)
    }
}

/// Part of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Ref(Reference),
}

/// A string with zero or more `${...}` references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = source;

        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                // Unterminated: the remainder is plain text.
                break;
            };
            let inner = &after[..end];
            text.push_str(&rest[..start]);
            if inner.trim().is_empty() {
                text.push_str(&rest[start..start + 2 + end + 1]);
            } else {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Ref(Reference::parse(inner)));
            }
            rest = &after[end + 1..];
        }

        text.push_str(rest);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Self {
            source: source.to_string(),
            segments,
        }
    }

    /// The unparsed source text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// References in order of appearance (duplicates included).
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Ref(r) => Some(r),
            Segment::Text(_) => None,
        })
    }

    pub fn has_references(&self) -> bool {
        self.references().next().is_some()
    }

    /// Substitute every reference through `resolve`.
    ///
    /// References the resolver cannot answer are left as their original
    /// `${...}` token.
    pub fn render<F>(&self, mut resolve: F) -> String
    where
        F: FnMut(&Reference) -> Option<String>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Ref(r) => match resolve(r) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&r.token()),
                },
            }
        }
        out
    }
}

impl From<String> for Template {
    fn from(source: String) -> Self {
        Template::parse(&source)
    }
}

impl From<&str> for Template {
    fn from(source: &str) -> Self {
        Template::parse(source)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.source
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

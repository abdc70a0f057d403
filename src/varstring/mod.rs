//! # VarString
//!
//! Tokenizer for nginx-variable interpolation strings found in annotation
//! values, e.g. `"$scheme://$http_host/login"`.
//!
//! Every user-supplied value that ends up in generated configuration must
//! pass through here first: literal text stays an opaque literal at render
//! time and only recognized variable names are substituted by the data
//! plane, which is what makes annotation values injection-safe.
//!
//! Tokenizing never fails. Malformed variable syntax (a bare `$`, an
//! unterminated `${`) degrades to literal text; we are deliberately more
//! permissive than the data plane's own templating.

use serde::de::{Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// One segment of a tokenized interpolation string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Opaque literal text, emitted verbatim
    Literal(String),
    /// A single proxy variable, stored without the sigil
    Var(String),
}

impl Segment {
    /// The wire form: variables carry their `$` sigil, literals do not.
    pub fn as_wire(&self) -> String {
        match self {
            Segment::Literal(s) => s.clone(),
            Segment::Var(name) => format!("${}", name),
        }
    }
}

/// An ordered sequence of literal and variable segments.
///
/// Invariant: concatenating the segments reproduces the original input,
/// except that `${name}` normalizes to `$name` (same variable, brace form
/// stripped).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VarString(Vec<Segment>);

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl VarString {
    /// Tokenize a raw annotation value.
    pub fn parse(input: &str) -> Self {
        let mut segments = Vec::new();
        if input.is_empty() {
            return Self(segments);
        }
        if !input.contains('$') {
            segments.push(Segment::Literal(input.to_string()));
            return Self(segments);
        }

        let mut literal = String::new();
        let mut chars = input.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            match chars.peek() {
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    while let Some(&nc) = chars.peek() {
                        if is_ident_char(nc) {
                            name.push(nc);
                            chars.next();
                        } else if nc == '}' {
                            chars.next();
                            closed = true;
                            break;
                        } else {
                            break;
                        }
                    }
                    if closed && !name.is_empty() {
                        segments.push(Segment::Var(name));
                    } else {
                        // unterminated or empty braces degrade to literal
                        literal.push_str("${");
                        literal.push_str(&name);
                        if closed {
                            literal.push('}');
                        }
                    }
                }
                Some(&nc) if is_ident_char(nc) => {
                    let mut name = String::new();
                    while let Some(&ic) = chars.peek() {
                        if !is_ident_char(ic) {
                            break;
                        }
                        name.push(ic);
                        chars.next();
                    }
                    segments.push(Segment::Var(name));
                }
                _ => {
                    // bare sigil: a one character literal
                    literal.push('$');
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Self(segments)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Reassemble the wire form (brace syntax normalized away).
    pub fn concat(&self) -> String {
        self.0.iter().map(Segment::as_wire).collect()
    }
}

impl From<Vec<Segment>> for VarString {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

// The policy document carries VarStrings as plain string lists; a leading
// sigil marks a variable. This matches what the data plane consumes.
impl Serialize for VarString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for segment in &self.0 {
            seq.serialize_element(&segment.as_wire())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for VarString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VarStringVisitor;

        impl<'de> Visitor<'de> for VarStringVisitor {
            type Value = VarString;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a sequence of strings")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut segments = Vec::new();
                while let Some(raw) = seq.next_element::<String>()? {
                    let segment = match raw.strip_prefix('$') {
                        Some(name) if !name.is_empty() && name.chars().all(is_ident_char) => {
                            Segment::Var(name.to_string())
                        }
                        _ => Segment::Literal(raw),
                    };
                    segments.push(segment);
                }
                Ok(VarString(segments))
            }
        }

        deserializer.deserialize_seq(VarStringVisitor)
    }
}

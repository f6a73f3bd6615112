//! Attribute references carried inside declared strings.
//!
//! A resource declaration can use an attribute of another resource that only
//! exists once that resource has been reconciled (a bucket's website endpoint,
//! a function's ARN). Such values are written as placeholders and substituted
//! after the referenced resource has been reconciled.
//!
//! # Format
//!
//! - `$${res:<resource>:<attribute>}` - attribute of a reconciled resource
//!
//! Single `$` characters pass through unchanged. Use `$$${` to produce a
//! literal `$${`.
//!
//! # Example
//!
//! ```
//! use sitestack_lib::placeholder::{parse, AttrRef, Segment};
//!
//! let segments = parse("arn:aws:s3:::$${res:site:name}/*").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("arn:aws:s3:::".to_string()),
//!     Segment::Ref(AttrRef::new("site", "name")),
//!     Segment::Literal("/*".to_string()),
//! ]);
//! ```

use thiserror::Error;

/// A reference to one attribute of one resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrRef {
  pub resource: String,
  pub attr: String,
}

impl AttrRef {
  pub fn new(resource: impl Into<String>, attr: impl Into<String>) -> Self {
    Self {
      resource: resource.into(),
      attr: attr.into(),
    }
  }

  /// Render this reference in placeholder form.
  pub fn to_placeholder(&self) -> String {
    format!("$${{res:{}:{}}}", self.resource, self.attr)
  }
}

impl std::fmt::Display for AttrRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}.{}", self.resource, self.attr)
  }
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Ref(AttrRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder type: {0}")]
  UnknownType(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("unresolved reference: {0}")]
  Unresolved(AttrRef),
}

/// Supplies attribute values of already reconciled resources.
pub trait Resolver {
  fn resolve(&self, reference: &AttrRef) -> Result<&str, PlaceholderError>;
}

/// Parse a string into literal and reference segments.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' || !matches!(chars.peek(), Some((_, '$'))) {
      literal.push(ch);
      continue;
    }

    // "$$"
    chars.next();
    match chars.peek() {
      Some((_, '$')) => {
        chars.next();
        if matches!(chars.peek(), Some((_, '{'))) {
          chars.next();
          literal.push_str("$${");
        } else {
          literal.push_str("$$$");
        }
      }
      Some((_, '{')) => {
        chars.next();
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }

        let mut content = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            closed = true;
            break;
          }
          content.push(c);
        }
        if !closed {
          return Err(PlaceholderError::Unclosed(pos));
        }

        segments.push(Segment::Ref(parse_content(&content)?));
      }
      _ => literal.push_str("$$"),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn parse_content(content: &str) -> Result<AttrRef, PlaceholderError> {
  let (kind, rest) = content
    .split_once(':')
    .ok_or_else(|| PlaceholderError::Malformed(format!("missing colon in '{content}'")))?;

  if kind != "res" {
    return Err(PlaceholderError::UnknownType(kind.to_string()));
  }

  let (resource, attr) = rest
    .split_once(':')
    .ok_or_else(|| PlaceholderError::Malformed(format!("missing attribute in '{content}'")))?;

  if resource.is_empty() || attr.is_empty() {
    return Err(PlaceholderError::Malformed(content.to_string()));
  }

  Ok(AttrRef::new(resource, attr))
}

/// Every reference contained in a string, in order of appearance.
pub fn references(input: &str) -> Result<Vec<AttrRef>, PlaceholderError> {
  Ok(
    parse(input)?
      .into_iter()
      .filter_map(|s| match s {
        Segment::Ref(r) => Some(r),
        Segment::Literal(_) => None,
      })
      .collect(),
  )
}

/// Returns true if the string still carries an unresolved reference.
pub fn has_references(input: &str) -> bool {
  matches!(references(input), Ok(refs) if !refs.is_empty())
}

/// If the whole string is exactly one reference, return it.
pub fn sole_reference(input: &str) -> Option<AttrRef> {
  match parse(input).ok()?.as_slice() {
    [Segment::Ref(r)] => Some(r.clone()),
    _ => None,
  }
}

/// Parse and substitute in one step.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut out = String::with_capacity(input.len());
  for segment in parse(input)? {
    match segment {
      Segment::Literal(s) => out.push_str(&s),
      Segment::Ref(r) => out.push_str(resolver.resolve(&r)?),
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  struct MapResolver(HashMap<AttrRef, String>);

  impl Resolver for MapResolver {
    fn resolve(&self, reference: &AttrRef) -> Result<&str, PlaceholderError> {
      self
        .0
        .get(reference)
        .map(String::as_str)
        .ok_or_else(|| PlaceholderError::Unresolved(reference.clone()))
    }
  }

  fn resolver(entries: &[(&str, &str, &str)]) -> MapResolver {
    MapResolver(
      entries
        .iter()
        .map(|(r, a, v)| (AttrRef::new(*r, *a), v.to_string()))
        .collect(),
    )
  }

  #[test]
  fn plain_text_is_one_literal() {
    assert_eq!(parse("index.html").unwrap(), vec![Segment::Literal("index.html".into())]);
    assert!(parse("").unwrap().is_empty());
  }

  #[test]
  fn single_dollar_passes_through() {
    assert_eq!(parse("$default").unwrap(), vec![Segment::Literal("$default".into())]);
  }

  #[test]
  fn reference_round_trips_through_placeholder_form() {
    let r = AttrRef::new("gateway", "api_endpoint");
    assert_eq!(sole_reference(&r.to_placeholder()), Some(r));
  }

  #[test]
  fn interpolated_references() {
    let refs = references("$${res:gateway:api_endpoint}/$${res:stage:name}").unwrap();
    assert_eq!(
      refs,
      vec![AttrRef::new("gateway", "api_endpoint"), AttrRef::new("stage", "name")]
    );
    assert_eq!(sole_reference("$${res:gateway:api_endpoint}/x"), None);
  }

  #[test]
  fn escape_produces_literal() {
    assert_eq!(parse("$$${res:a:b}").unwrap(), vec![Segment::Literal("$${res:a:b}".into())]);
    assert!(!has_references("$$${res:a:b}"));
  }

  #[test]
  fn malformed_placeholders_are_rejected() {
    assert_eq!(parse("$${res:a:b").unwrap_err(), PlaceholderError::Unclosed(0));
    assert!(matches!(parse("$${out}").unwrap_err(), PlaceholderError::Malformed(_)));
    assert!(matches!(parse("$${build:x:y}").unwrap_err(), PlaceholderError::UnknownType(_)));
    assert!(matches!(parse("$${res:only}").unwrap_err(), PlaceholderError::Malformed(_)));
  }

  #[test]
  fn substitute_resolves_all_references() {
    let r = resolver(&[
      ("gateway", "api_endpoint", "https://abc.execute-api.us-east-1.amazonaws.com"),
      ("stage", "name", "dev"),
    ]);
    let value = substitute("$${res:gateway:api_endpoint}/$${res:stage:name}", &r).unwrap();
    assert_eq!(value, "https://abc.execute-api.us-east-1.amazonaws.com/dev");
  }

  #[test]
  fn substitute_reports_unresolved() {
    let r = resolver(&[]);
    let err = substitute("http://$${res:site:website_endpoint}", &r).unwrap_err();
    assert_eq!(err, PlaceholderError::Unresolved(AttrRef::new("site", "website_endpoint")));
  }
}

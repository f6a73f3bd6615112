//! Access policy documents.
//!
//! Documents use the IAM JSON field names so that a stack file can carry a
//! policy exactly as it would be written for the cloud. [`EffectivePolicy`]
//! evaluates the combined statements that apply to one bucket, which lets the
//! public-read flag and an explicit public-read policy be compared by what they
//! grant rather than by how they were written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
  Allow,
  Deny,
}

/// A single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
  One(String),
  Many(Vec<String>),
}

impl OneOrMany {
  pub fn iter(&self) -> impl Iterator<Item = &str> {
    let items: &[String] = match self {
      OneOrMany::One(s) => std::slice::from_ref(s),
      OneOrMany::Many(v) => v,
    };
    items.iter().map(String::as_str)
  }
}

impl From<&str> for OneOrMany {
  fn from(s: &str) -> Self {
    OneOrMany::One(s.to_string())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Principal {
  /// `"*"`
  Any(String),
  /// `{ "Service": "lambda.amazonaws.com" }`, `{ "AWS": "*" }`
  Mapped(BTreeMap<String, OneOrMany>),
}

impl Principal {
  pub fn matches(&self, principal: &str) -> bool {
    match self {
      Principal::Any(p) => p == "*" || p == principal,
      Principal::Mapped(map) => map.values().flat_map(OneOrMany::iter).any(|p| p == "*" || p == principal),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
  #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
  pub sid: Option<String>,
  #[serde(rename = "Effect")]
  pub effect: Effect,
  #[serde(rename = "Principal", default, skip_serializing_if = "Option::is_none")]
  pub principal: Option<Principal>,
  #[serde(rename = "Action")]
  pub action: OneOrMany,
  #[serde(rename = "Resource", default, skip_serializing_if = "Option::is_none")]
  pub resource: Option<OneOrMany>,
}

impl Statement {
  fn matches(&self, principal: &str, action: &str, resource: &str) -> bool {
    let principal_ok = self.principal.as_ref().is_some_and(|p| p.matches(principal));
    let action_ok = self
      .action
      .iter()
      .any(|a| wildcard_match(&a.to_ascii_lowercase(), &action.to_ascii_lowercase()));
    let resource_ok = self.resource.as_ref().is_some_and(|r| r.iter().any(|p| wildcard_match(p, resource)));
    principal_ok && action_ok && resource_ok
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
  #[serde(rename = "Version", default = "default_version")]
  pub version: String,
  #[serde(rename = "Statement")]
  pub statement: Vec<Statement>,
}

fn default_version() -> String {
  POLICY_VERSION.to_string()
}

/// The statement granting anonymous read access to every object of a bucket.
pub fn public_read_statement(bucket: &str) -> Statement {
  Statement {
    sid: Some("PublicReadGetObject".to_string()),
    effect: Effect::Allow,
    principal: Some(Principal::Any("*".to_string())),
    action: OneOrMany::Many(vec!["s3:GetObject".to_string()]),
    resource: Some(OneOrMany::Many(vec![format!("arn:aws:s3:::{}/*", bucket)])),
  }
}

pub fn public_read_policy(bucket: &str) -> PolicyDocument {
  PolicyDocument {
    version: default_version(),
    statement: vec![public_read_statement(bucket)],
  }
}

/// The statements that together govern access to one bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectivePolicy {
  statements: Vec<Statement>,
}

impl EffectivePolicy {
  /// Combine the bucket's public-read flag with any attached policies.
  pub fn for_bucket<'a>(bucket: &str, public_read: bool, attached: impl IntoIterator<Item = &'a PolicyDocument>) -> Self {
    let mut statements = Vec::new();
    if public_read {
      statements.push(public_read_statement(bucket));
    }
    for doc in attached {
      statements.extend(doc.statement.iter().cloned());
    }
    Self { statements }
  }

  /// An explicit deny wins over any allow; with no matching allow the answer is no.
  pub fn allows(&self, principal: &str, action: &str, resource: &str) -> bool {
    let matching = || self.statements.iter().filter(|s| s.matches(principal, action, resource));
    if matching().any(|s| s.effect == Effect::Deny) {
      return false;
    }
    matching().any(|s| s.effect == Effect::Allow)
  }

  pub fn is_empty(&self) -> bool {
    self.statements.is_empty()
  }
}

/// Glob match supporting `*` (any run) and `?` (any single char).
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
  let p: Vec<char> = pattern.chars().collect();
  let v: Vec<char> = value.chars().collect();
  let (mut pi, mut vi) = (0, 0);
  let mut star: Option<(usize, usize)> = None;

  while vi < v.len() {
    if pi < p.len() && (p[pi] == '?' || p[pi] == v[vi]) {
      pi += 1;
      vi += 1;
    } else if pi < p.len() && p[pi] == '*' {
      star = Some((pi, vi));
      pi += 1;
    } else if let Some((sp, sv)) = star {
      pi = sp + 1;
      vi = sv + 1;
      star = Some((sp, sv + 1));
    } else {
      return false;
    }
  }

  p[pi..].iter().all(|c| *c == '*')
}

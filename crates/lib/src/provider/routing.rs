//! HTTP API route matching.
//!
//! Route keys are `$default` or `<METHOD> <path>`, where the method may be
//! `ANY` and path segments may be `{param}` or a trailing greedy `{proxy+}`.

/// Which function a request reaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
  pub route: String,
  pub route_key: String,
  pub integration_id: String,
  pub function: String,
}

/// Match a request against a route key.
///
/// Returns a priority when the key matches; higher wins. `$default` matches
/// everything with the lowest priority.
pub fn route_matches(route_key: &str, method: &str, path: &str) -> Option<u32> {
  if route_key == "$default" {
    return Some(0);
  }

  let (key_method, key_path) = route_key.split_once(' ')?;
  let method_score = if key_method.eq_ignore_ascii_case(method) {
    2
  } else if key_method == "ANY" {
    1
  } else {
    return None;
  };

  let key_segments: Vec<&str> = key_path.split('/').filter(|s| !s.is_empty()).collect();
  let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

  let mut score = 0;
  for (i, key_segment) in key_segments.iter().enumerate() {
    if key_segment.starts_with('{') && key_segment.ends_with("+}") {
      // Greedy match needs at least one remaining segment.
      return (segments.len() > i).then_some(10 + score * 4 + method_score);
    }
    let segment = segments.get(i)?;
    if key_segment.starts_with('{') && key_segment.ends_with('}') {
      score += 1;
    } else if key_segment == segment {
      score += 2;
    } else {
      return None;
    }
  }

  (segments.len() == key_segments.len()).then_some(1000 + score * 4 + method_score)
}

//! JSON path lookup shared by the variable resolver and condition evaluator
//!
//! Paths are dot separated, with array indices written either as a dot
//! segment (`items.0.name`) or in brackets (`items[0].name`).

use serde_json::Value;

/// A single segment of a parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Split a path into segments. Returns `None` for malformed bracket syntax.
pub fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let mut segments = Vec::new();

    if path.is_empty() {
        return Some(segments);
    }

    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }

        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }

        while !rest.is_empty() {
            let close = rest.find(']')?;

            if !rest.starts_with('[') {
                return None;
            }

            let index: usize = rest[1..close].trim().parse().ok()?;
            segments.push(PathSegment::Index(index));
            rest = &rest[close + 1..];
        }
    }

    Some(segments)
}

/// Look up a nested value. Numeric key segments also index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path)?;
    lookup_segments(value, &segments)
}

/// Look up a nested value from already parsed segments
pub fn lookup_segments<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = value;

    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(obj)) => obj.get(key)?,
            (PathSegment::Key(key), Value::Array(arr)) => arr.get(key.parse::<usize>().ok()?)?,
            (PathSegment::Index(index), Value::Array(arr)) => arr.get(*index)?,
            _ => return None,
        };
    }

    Some(current)
}

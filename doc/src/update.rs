//! Field-level document updates.

use serde_json::{Map, Value};

use crate::error::DocError;
use crate::filter::FieldPath;

/// One modification applied by [`crate::Collection::update_one`].
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Set the field, creating intermediate objects as needed.
    Set(FieldPath, Value),
    /// Remove the field if present.
    Unset(FieldPath),
    /// Add to an integer field. A missing field counts as 0.
    Inc(FieldPath, i64),
}

impl Update {
    pub fn set(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Update::Set(path.into(), value.into())
    }

    pub fn unset(path: impl Into<FieldPath>) -> Self {
        Update::Unset(path.into())
    }

    pub fn inc(path: impl Into<FieldPath>, delta: i64) -> Self {
        Update::Inc(path.into(), delta)
    }

    /// Apply the update in place. Returns whether the document changed.
    pub(crate) fn apply(&self, doc: &mut Map<String, Value>) -> Result<bool, DocError> {
        match self {
            Update::Set(path, value) => {
                let slot = parent_mut(doc, path, true)?;
                let Some((parent, last)) = slot else {
                    return Ok(false);
                };
                let changed = parent.get(last) != Some(value);
                parent.insert(last.to_string(), value.clone());
                Ok(changed)
            }
            Update::Unset(path) => match parent_mut(doc, path, false)? {
                Some((parent, last)) => Ok(parent.remove(last).is_some()),
                None => Ok(false),
            },
            Update::Inc(path, delta) => {
                let Some((parent, last)) = parent_mut(doc, path, true)? else {
                    return Ok(false);
                };
                let current = match parent.get(last) {
                    None | Some(Value::Null) => 0,
                    Some(v) => v.as_i64().ok_or_else(|| DocError::TypeMismatch(path_string(path)))?,
                };
                parent.insert(last.to_string(), Value::from(current + delta));
                Ok(*delta != 0)
            }
        }
    }
}

fn path_string(path: &FieldPath) -> String {
    path.segments().join(".")
}

/// Walk to the object holding the last path segment.
///
/// With `create`, missing intermediate objects are inserted; without it a
/// missing intermediate yields `None`.
fn parent_mut<'a, 'p>(
    doc: &'a mut Map<String, Value>,
    path: &'p FieldPath,
    create: bool,
) -> Result<Option<(&'a mut Map<String, Value>, &'p str)>, DocError> {
    let Some((last, init)) = path.segments().split_last() else {
        return Err(DocError::InvalidPath(String::new()));
    };
    let mut cur = doc;
    for seg in init {
        if !cur.contains_key(seg) {
            if !create {
                return Ok(None);
            }
            cur.insert(seg.clone(), Value::Object(Map::new()));
        }
        cur = match cur.get_mut(seg) {
            Some(Value::Object(obj)) => obj,
            _ => return Err(DocError::TypeMismatch(path_string(path))),
        };
    }
    Ok(Some((cur, last.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_set_creates_nested() {
        let mut d = doc(json!({}));
        assert!(Update::set(["borrowers", "al"], 1).apply(&mut d).unwrap());
        assert_eq!(Value::Object(d), json!({"borrowers": {"al": 1}}));
    }

    #[test]
    fn test_set_same_value_reports_unchanged() {
        let mut d = doc(json!({"title": "Dune"}));
        assert!(!Update::set("title", "Dune").apply(&mut d).unwrap());
    }

    #[test]
    fn test_inc_and_unset() {
        let mut d = doc(json!({"quantity": 2}));
        Update::inc("quantity", -1).apply(&mut d).unwrap();
        assert_eq!(d["quantity"], json!(1));

        Update::inc(["borrowing", "111"], 1).apply(&mut d).unwrap();
        assert_eq!(d["borrowing"]["111"], json!(1));

        assert!(Update::unset(["borrowing", "111"]).apply(&mut d).unwrap());
        assert!(!Update::unset(["borrowing", "111"]).apply(&mut d).unwrap());
        assert!(!Update::unset(["nothing", "here"]).apply(&mut d).unwrap());
    }

    #[test]
    fn test_inc_type_mismatch() {
        let mut d = doc(json!({"quantity": "two"}));
        assert!(matches!(
            Update::inc("quantity", 1).apply(&mut d),
            Err(DocError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_path_through_scalar_fails() {
        let mut d = doc(json!({"title": "Dune"}));
        assert!(matches!(
            Update::set(["title", "x"], 1).apply(&mut d),
            Err(DocError::TypeMismatch(_))
        ));
    }
}

//! Query predicates and value ordering.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// Path into a nested document, one segment per object level.
///
/// Segments are kept separate (no dotted strings) so keys such as
/// usernames may contain any character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Resolve the path against a document.
    pub fn lookup<'a>(&self, doc: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let mut cur = doc.get(first)?;
        for seg in rest {
            cur = cur.as_object()?.get(seg)?;
        }
        Some(cur)
    }
}

impl From<&str> for FieldPath {
    fn from(field: &str) -> Self {
        Self(vec![field.to_string()])
    }
}

impl<const N: usize> From<[&str; N]> for FieldPath {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

/// A document predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every inner filter matches. An empty list matches everything.
    All(Vec<Filter>),
    /// Field equals the value, or the field is an array containing it.
    Eq(FieldPath, Value),
    /// Field compares strictly greater than the value.
    Gt(FieldPath, Value),
    /// Field is missing, null, or an empty array/object.
    IsEmpty(FieldPath),
}

impl Filter {
    pub fn any() -> Self {
        Filter::All(Vec::new())
    }

    pub fn eq(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Filter::Eq(path.into(), value.into())
    }

    pub fn gt(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Filter::Gt(path.into(), value.into())
    }

    pub fn is_empty(path: impl Into<FieldPath>) -> Self {
        Filter::IsEmpty(path.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All(mut inner) => {
                inner.push(other);
                Filter::All(inner)
            }
            first => Filter::All(vec![first, other]),
        }
    }

    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        match self {
            Filter::All(inner) => inner.iter().all(|f| f.matches(doc)),
            Filter::Eq(path, want) => match path.lookup(doc) {
                Some(Value::Array(items)) if !want.is_array() => items.contains(want),
                Some(v) => compare_values(v, want) == Ordering::Equal,
                None => want.is_null(),
            },
            Filter::Gt(path, bound) => path
                .lookup(doc)
                .is_some_and(|v| same_kind(v, bound) && compare_values(v, bound) == Ordering::Greater),
            Filter::IsEmpty(path) => match path.lookup(doc) {
                None | Some(Value::Null) => true,
                Some(Value::Array(a)) => a.is_empty(),
                Some(Value::Object(o)) => o.is_empty(),
                Some(_) => false,
            },
        }
    }
}

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    rank(a) == rank(b)
}

/// Total order over JSON values, used for equality checks and native sort.
///
/// Values of different kinds order null < number < string < object < array
/// < bool. Numbers compare numerically, strings by bytes, arrays element by
/// element, objects by their sorted entries.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                    x.total_cmp(&y)
                }
            },
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xs: Vec<_> = x.iter().collect();
            let mut ys: Vec<_> = y.iter().collect();
            xs.sort_by(|a, b| a.0.cmp(b.0));
            ys.sort_by(|a, b| a.0.cmp(b.0));
            for ((lk, lv), (rk, rv)) in xs.iter().zip(ys.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

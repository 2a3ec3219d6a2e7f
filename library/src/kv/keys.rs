//! KV key layout for the key-value backend.
//!
//! ```text
//! book:{id}                                  -> hash of record fields
//! user:{id}                                  -> hash of record fields
//! {type}_id_counter                          -> entity id counter
//! {type}_ids                                 -> set of live ids
//! {field}:{type}_set                         -> hash value -> bucket key
//! {field}:{value}:{type}_set{n}              -> set of ids holding value
//! {field}:{type}_set:{type}_set_id_counter   -> bucket counter per field
//! user:{id}:loans                            -> hash book id -> count
//! user:{id}:rated                            -> set of rated book ids
//! book:{id}:borrowers                        -> set of user ids
//! book:{id}:ratings                          -> hash user id -> score
//! ```

use crate::error::EntityKind;

/// KV key for an entity record. Format: "{type}:{id}"
pub fn record_key(kind: EntityKind, id: u64) -> String {
    format!("{kind}:{id}")
}

/// KV key for the entity id counter. Format: "{type}_id_counter"
pub fn id_counter_key(kind: EntityKind) -> String {
    format!("{kind}_id_counter")
}

/// KV key for the set of live ids. Format: "{type}_ids"
pub fn ids_key(kind: EntityKind) -> String {
    format!("{kind}_ids")
}

/// KV key for a field's tracking map. Format: "{field}:{type}_set"
pub fn tracking_key(field: &str, kind: EntityKind) -> String {
    format!("{field}:{kind}_set")
}

/// KV key for a bucket. Format: "{field}:{value}:{type}_set{n}"
pub fn bucket_key(field: &str, value: &str, kind: EntityKind, n: i64) -> String {
    format!("{field}:{value}:{kind}_set{n}")
}

/// KV key for a field's bucket counter.
/// Format: "{field}:{type}_set:{type}_set_id_counter"
pub fn bucket_counter_key(field: &str, kind: EntityKind) -> String {
    format!("{}:{kind}_set_id_counter", tracking_key(field, kind))
}

/// Format: "user:{id}:loans"
pub fn loans_key(user_id: u64) -> String {
    format!("user:{user_id}:loans")
}

/// Format: "user:{id}:rated"
pub fn rated_key(user_id: u64) -> String {
    format!("user:{user_id}:rated")
}

/// Format: "book:{id}:borrowers"
pub fn borrowers_key(book_id: u64) -> String {
    format!("book:{book_id}:borrowers")
}

/// Format: "book:{id}:ratings"
pub fn ratings_key(book_id: u64) -> String {
    format!("book:{book_id}:ratings")
}

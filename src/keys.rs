//! Request key helpers.
//!
//! Callers own key construction and must encode every argument that
//! changes the result. These helpers do it through `serde_json`, so keys
//! for one logical request family share a `"{name}:"` prefix usable with
//! [`crate::Orchestrator::invalidate_by_prefix`].

use serde::Serialize;

/// Build `"{name}:{json(args)}"`.
///
/// ```rust
/// use serde_json::json;
///
/// let key = flightdeck::request_key("companies", &json!({"page": 2, "q": "acme"})).unwrap();
/// assert_eq!(key, r#"companies:{"page":2,"q":"acme"}"#);
/// assert!(key.starts_with(&flightdeck::key_prefix("companies")));
/// ```
///
/// # Errors
/// Returns error if `args` cannot be serialized to JSON.
pub fn request_key<A>(name: &str, args: &A) -> Result<String, serde_json::Error>
where
    A: Serialize + ?Sized,
{
    let encoded = serde_json::to_string(args)?;
    Ok(format!("{}:{}", name, encoded))
}

/// Prefix shared by every [`request_key`] built with `name`.
pub fn key_prefix(name: &str) -> String {
    format!("{}:", name)
}

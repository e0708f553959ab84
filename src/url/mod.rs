//! URL handling
//!
//! Every component identifies a URL by its normalized key and groups keys by
//! domain. Both functions are pure.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::domain_of;
pub use normalize::normalize;

/// Normalizes `url` and returns the key together with its domain
///
/// Returns `None` when the URL normalizes to an empty key or has no domain.
pub fn key_and_domain(url: &str) -> Option<(String, String)> {
    let key = normalize(url);
    if key.is_empty() {
        return None;
    }
    let domain = domain_of(&key)?;
    Some((key, domain))
}

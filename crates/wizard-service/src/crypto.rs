//! Shared-secret comparison.

/// Constant-time string comparison to prevent timing attacks.
///
/// Used for every shared secret the service checks (identity gateway key,
/// reset job secret).
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

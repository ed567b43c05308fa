//! Row id generation.

use uuid::Uuid;

/// Create a prefixed row id, e.g. `log-7f2a…` or `topic-91bd…`.
///
/// The prefix keeps ids self-describing in event payloads and graph node
/// references without a separate type column.
pub fn create_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix_and_are_unique() {
        let a = create_id("log");
        let b = create_id("log");
        assert!(a.starts_with("log-"));
        assert_ne!(a, b);
    }
}

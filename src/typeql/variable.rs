//! Scratch variable allocation for TypeQL statements.

/// Hands out unique scratch variable names (`v0`, `v1`, ...).
///
/// Each dealer owns its counter, so independent conversions never share
/// state. Names are unique until [`VariableDealer::reset`] is called, after
/// which the sequence starts over from `v0`.
#[derive(Debug, Default, Clone)]
pub struct VariableDealer {
    next_idx: usize,
}

impl VariableDealer {
    /// Creates a dealer starting at `v0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh variable name, without the `$` prefix.
    pub fn next(&mut self) -> String {
        let name = format!("v{}", self.next_idx);
        self.next_idx += 1;
        name
    }

    /// Restarts the sequence so names are deterministic again.
    pub fn reset(&mut self) {
        self.next_idx = 0;
    }

    /// Number of names handed out since the last reset.
    pub fn issued(&self) -> usize {
        self.next_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique_until_reset() {
        let mut dealer = VariableDealer::new();
        let names: HashSet<String> = (0..100).map(|_| dealer.next()).collect();
        assert_eq!(names.len(), 100);
        assert_eq!(dealer.issued(), 100);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut dealer = VariableDealer::new();
        let first = vec![dealer.next(), dealer.next()];
        dealer.reset();
        let second = vec![dealer.next(), dealer.next()];
        assert_eq!(first, second);
        assert_eq!(first, vec!["v0".to_string(), "v1".to_string()]);
    }
}

//! Ordered fallback chains
//!
//! A chain is a list of named providers tried in priority order; the first
//! one that yields a value wins.

pub struct Candidate<'a, T> {
    name: &'a str,
    provide: Box<dyn Fn() -> Option<T> + 'a>,
}

impl<'a, T> Candidate<'a, T> {
    pub fn new(name: &'a str, provide: impl Fn() -> Option<T> + 'a) -> Self {
        Self {
            name,
            provide: Box::new(provide),
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }
}

/// Try each candidate in order and return the first present value with its name
pub fn first_available<'a, T>(candidates: &[Candidate<'a, T>]) -> Option<(&'a str, T)> {
    candidates
        .iter()
        .find_map(|c| (c.provide)().map(|value| (c.name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_first_present_wins_and_later_are_not_called() {
        let calls = Cell::new(0);
        let candidates = vec![
            Candidate::new("a", || {
                calls.set(calls.get() + 1);
                None
            }),
            Candidate::new("b", || {
                calls.set(calls.get() + 1);
                Some(2)
            }),
            Candidate::new("c", || {
                calls.set(calls.get() + 1);
                Some(3)
            }),
        ];

        assert_eq!(first_available(&candidates), Some(("b", 2)));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_empty_chain() {
        let candidates: Vec<Candidate<'_, u8>> = Vec::new();
        assert_eq!(first_available(&candidates), None);
    }
}

//! Operator precedence table used to reassociate binary operators.
use std::collections::HashMap;

use unicode_general_category::{get_general_category, GeneralCategory};

/// Name → binding strength. Unknown operators bind at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precedence {
    table: HashMap<Box<str>, u8>,
}

impl Default for Precedence {
    fn default() -> Self {
        Self::empty()
            .with("*", 4)
            .with("mul", 4)
            .with("/", 4)
            .with("div", 4)
            .with("+", 3)
            .with("add", 3)
            .with("-", 3)
            .with("sub", 3)
    }
}

impl Precedence {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn with(mut self, name: impl AsRef<str>, level: u8) -> Self {
        self.insert(name, level);
        self
    }

    pub fn insert(&mut self, name: impl AsRef<str>, level: u8) {
        self.table.insert(Box::from(name.as_ref()), level);
    }

    /// Level of `op`. Names missing from the table fall back to their first
    /// character, but only when that character is Unicode punctuation, so
    /// `-=` binds like `-` while `+=` does not (`+` is a math symbol).
    pub fn of(&self, op: &str) -> u8 {
        if let Some(&level) = self.table.get(op) {
            return level;
        }

        let Some(first) = op.chars().next() else {
            return 0;
        };
        if is_punctuation(first) {
            let mut buf = [0; 4];
            if let Some(&level) = self.table.get(&*first.encode_utf8(&mut buf)) {
                return level;
            }
        }

        0
    }
}

fn is_punctuation(c: char) -> bool {
    use GeneralCategory::*;
    matches!(
        get_general_category(c),
        ConnectorPunctuation
            | DashPunctuation
            | OpenPunctuation
            | ClosePunctuation
            | InitialPunctuation
            | FinalPunctuation
            | OtherPunctuation
    )
}

//! Per-password character-class features

use serde::{Deserialize, Serialize};

/// Character classification counts derived purely from the password string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Features {
    /// Length in characters (not bytes)
    pub length: u32,
    pub upper_case: u32,
    pub lower_case: u32,
    /// ASCII digits
    pub numbers: u32,
    /// Anything that is not alphanumeric
    pub special_chars: u32,
    /// a, e, i, o, u in either case
    pub vowels: u32,
}

impl Features {
    pub fn extract(password: &str) -> Self {
        let mut f = Features::default();
        for c in password.chars() {
            f.length += 1;
            if c.is_uppercase() {
                f.upper_case += 1;
            }
            if c.is_lowercase() {
                f.lower_case += 1;
            }
            if c.is_ascii_digit() {
                f.numbers += 1;
            }
            if !c.is_alphanumeric() {
                f.special_chars += 1;
            }
            if is_vowel(c) {
                f.vowels += 1;
            }
        }
        f
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

#![forbid(unsafe_code)]

// Room short code generation from a cryptographically secure source.

use rand::seq::IndexedRandom;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";

/// Generates compact, unpredictable room identifiers of a fixed length.
#[derive(Debug, Clone, Copy)]
pub struct ShortCodeGenerator {
    length: usize,
}

impl ShortCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    pub fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| *ALPHABET.choose(&mut rng).expect("alphabet is non-empty") as char)
            .collect()
    }
}

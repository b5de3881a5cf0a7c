//! Session code generation
//!
//! Codes are short and meant to be read aloud or typed, so the
//! alphabet drops the easily-confused characters (I, O, 0, 1).

use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a human-shareable session code of the given length
pub fn generate(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

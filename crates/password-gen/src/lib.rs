use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, rng};
use thiserror::Error;

const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{}<>?/";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const MIN_LENGTH: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("password length must be at least {MIN_LENGTH}, got {0}")]
    TooShort(usize),
}

/// Generates a password of `length` that contains at least one uppercase
/// letter, one lowercase letter, one digit, and one symbol from the fixed
/// set `!@#$%^&*()-_=+[]{}<>?/`; the remainder is filled uniformly from the
/// union of all four classes and the whole result is shuffled with a
/// cryptographically secure RNG.
///
/// # Errors
/// Returns [`GenerationError::TooShort`] if `length` is below 8.
pub fn generate_secure_password(length: usize) -> Result<String, GenerationError> {
    if length < MIN_LENGTH {
        return Err(GenerationError::TooShort(length));
    }

    let mut r = rng();
    let mut chars: Vec<u8> = Vec::with_capacity(length);

    chars.push(*UPPER.choose(&mut r).expect("UPPER is non-empty"));
    chars.push(*LOWER.choose(&mut r).expect("LOWER is non-empty"));
    chars.push(*DIGITS.choose(&mut r).expect("DIGITS is non-empty"));
    chars.push(*SYMBOLS.choose(&mut r).expect("SYMBOLS is non-empty"));

    let universe: Vec<u8> = UPPER
        .iter()
        .chain(LOWER.iter())
        .chain(DIGITS.iter())
        .chain(SYMBOLS.iter())
        .copied()
        .collect();

    for _ in chars.len()..length {
        let idx = r.random_range(0..universe.len());
        chars.push(universe[idx]);
    }

    chars.shuffle(&mut r);

    Ok(String::from_utf8(chars).expect("all characters are ASCII"))
}

/// Returns `true` if `password` contains at least one character from each
/// of the four required classes. Does not check length.
#[must_use]
pub fn has_all_character_classes(password: &str) -> bool {
    let bytes = password.as_bytes();
    let has_upper = bytes.iter().any(|b| UPPER.contains(b));
    let has_lower = bytes.iter().any(|b| LOWER.contains(b));
    let has_digit = bytes.iter().any(|b| DIGITS.contains(b));
    let has_symbol = bytes.iter().any(|b| SYMBOLS.contains(b));
    has_upper && has_lower && has_digit && has_symbol
}

//! Random string helpers.

use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_from(charset: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(charset[rng.random_range(0..charset.len())]))
        .collect()
}

/// `len` random ASCII letters and digits.
#[must_use]
pub fn random_alphabet_and_number(len: usize) -> String {
    random_from(ALPHANUMERIC, len)
}

/// `len` random ASCII letters.
#[must_use]
pub fn random_alphabet(len: usize) -> String {
    random_from(ALPHABET, len)
}

/// `len` random decimal digits.
#[must_use]
pub fn random_number(len: usize) -> String {
    random_from(DIGITS, len)
}

// Credvault: Password Generator
//
// Draws every character uniformly from lowercase, uppercase, digits and ASCII
// punctuation using the operating system CSPRNG. Candidates that miss any of
// the four classes are discarded and redrawn as a whole.

use rand::rngs::OsRng;
use rand::{Rng, TryRngCore};
use zeroize::Zeroizing;

use super::EnclaveError;

pub const DEFAULT_LENGTH: usize = 16;
pub const MIN_LENGTH: usize = 8;
pub const MAX_LENGTH: usize = 1024;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const PUNCTUATION: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Generate a random password of `length` characters containing at least one
/// lowercase letter, uppercase letter, digit and punctuation character.
pub fn generate_password(length: usize) -> Result<Zeroizing<String>, EnclaveError> {
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
        return Err(EnclaveError::InvalidLength {
            requested: length,
            min: MIN_LENGTH,
            max: MAX_LENGTH,
        });
    }

    let alphabet: Vec<u8> = [LOWERCASE, UPPERCASE, DIGITS, PUNCTUATION].concat();
    let mut rng = OsRng.unwrap_err();

    loop {
        let candidate: Zeroizing<String> = Zeroizing::new(
            (0..length)
                .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
                .collect(),
        );

        if satisfies_policy(&candidate) {
            return Ok(candidate);
        }
    }
}

/// Whether `password` contains all four character classes.
pub fn satisfies_policy(password: &str) -> bool {
    let has = |class: &[u8]| password.bytes().any(|b| class.contains(&b));
    has(LOWERCASE) && has(UPPERCASE) && has(DIGITS) && has(PUNCTUATION)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_length() {
        let password = generate_password(DEFAULT_LENGTH).unwrap();
        assert_eq!(password.chars().count(), 16);
    }

    #[test]
    fn test_every_generated_password_meets_policy() {
        for length in [MIN_LENGTH, 9, 12, 16, 32, 64] {
            for _ in 0..200 {
                let password = generate_password(length).unwrap();
                assert_eq!(password.len(), length);
                assert!(
                    satisfies_policy(&password),
                    "Generated password must contain all four classes"
                );
            }
        }
    }

    #[test]
    fn test_only_alphabet_characters() {
        let password = generate_password(MAX_LENGTH).unwrap();
        assert!(password
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b.is_ascii_whitespace()));
    }

    #[test]
    fn test_too_short_rejected() {
        let result = generate_password(MIN_LENGTH - 1);
        assert!(matches!(
            result,
            Err(EnclaveError::InvalidLength { requested: 7, .. })
        ));
    }

    #[test]
    fn test_too_long_rejected() {
        assert!(generate_password(MAX_LENGTH + 1).is_err());
    }

    #[test]
    fn test_consecutive_passwords_differ() {
        let a = generate_password(DEFAULT_LENGTH).unwrap();
        let b = generate_password(DEFAULT_LENGTH).unwrap();
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_policy_check() {
        assert!(satisfies_policy("aA1!"));
        assert!(!satisfies_policy("aA1a"));
        assert!(!satisfies_policy("AA1!"));
        assert!(!satisfies_policy("aa1!"));
        assert!(!satisfies_policy("aA!!"));
        assert!(!satisfies_policy(""));
    }

    #[test]
    fn test_punctuation_set_is_ascii_punctuation() {
        assert_eq!(PUNCTUATION.len(), 32);
        assert!(PUNCTUATION.iter().all(|b| b.is_ascii_punctuation()));
    }
}

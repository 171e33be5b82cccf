//! Keystore password generation.

use rand::Rng;
use rand::distr::Alphanumeric;
use secrecy::SecretString;

/// Length of a generated keystore password
pub const PASSWORD_LENGTH: usize = 12;

/// Generate a random password of `len` characters from `[A-Za-z0-9]`.
#[must_use]
pub fn generate_password(len: usize) -> SecretString {
    let password: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    SecretString::from(password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_length_and_alphabet() {
        let password = generate_password(PASSWORD_LENGTH);
        let value = password.expose_secret();
        assert_eq!(value.len(), 12);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_passwords_differ_between_calls() {
        let a = generate_password(PASSWORD_LENGTH);
        let b = generate_password(PASSWORD_LENGTH);
        assert_ne!(a.expose_secret(), b.expose_secret());
    }

    #[test]
    fn test_zero_length() {
        assert!(generate_password(0).expose_secret().is_empty());
    }
}

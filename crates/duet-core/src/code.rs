use rand::Rng;

/// Length of every invite code.
pub const CODE_LENGTH: usize = 8;

/// Upper-case letters and digits minus the look-alikes `0`, `O`, `1` and `I`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Source of candidate invite codes. Uniqueness is the store's job.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Uniform draw from a fixed alphabet using the thread-local CSPRNG
/// (ChaCha, seeded and periodically reseeded from the OS).
pub struct RandomCodes {
    alphabet: &'static [u8],
}

impl RandomCodes {
    pub fn new() -> Self {
        Self::with_alphabet(CODE_ALPHABET)
    }

    pub fn with_alphabet(alphabet: &'static [u8]) -> Self {
        assert!(!alphabet.is_empty(), "code alphabet must not be empty");
        Self { alphabet }
    }
}

impl Default for RandomCodes {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for RandomCodes {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..CODE_LENGTH)
            .map(|_| self.alphabet[rng.random_range(0..self.alphabet.len())] as char)
            .collect()
    }
}

/// Canonical form of a code typed by a person: surrounding whitespace dropped,
/// letters upper-cased.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

//! Room code generation.

use rand::Rng;

/// Letters and digits that cannot be confused when read aloud or typed:
/// no `0`/`O`, `1`/`I`/`L`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Produces candidate room codes. The registry retries until one is free.
pub trait CodeGenerator: Send {
    fn generate(&mut self, len: usize) -> String;
}

/// Uniformly random codes from [`CODE_ALPHABET`].
#[derive(Debug, Default)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn generate(&mut self, len: usize) -> String {
        let mut rng = rand::rng();
        (0..len)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// Hands out a fixed sequence of codes, then repeats the last one.
#[derive(Debug, Clone)]
pub struct SequenceCodes {
    codes: Vec<String>,
    next: usize,
}

impl SequenceCodes {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
            next: 0,
        }
    }
}

impl CodeGenerator for SequenceCodes {
    fn generate(&mut self, _len: usize) -> String {
        let index = self.next.min(self.codes.len().saturating_sub(1));
        self.next += 1;
        self.codes.get(index).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_codes_use_alphabet_and_length() {
        let mut codes = RandomCodes;
        for _ in 0..50 {
            let code = codes.generate(5);
            assert_eq!(code.len(), 5);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)), "{code}");
        }
    }

    #[test]
    fn test_sequence_codes_repeat_last() {
        let mut codes = SequenceCodes::new(["ABCDE", "FGHJK"]);
        assert_eq!(codes.generate(5), "ABCDE");
        assert_eq!(codes.generate(5), "FGHJK");
        assert_eq!(codes.generate(5), "FGHJK");
    }
}

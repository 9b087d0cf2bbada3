//! Pure round rules: guess matching, scoring, masking, letter reveal.
//!
//! Nothing here touches room state or timers, so every rule is tested in
//! isolation below.

use rand::Rng;
use rand::seq::IndexedRandom;

/// Trims and lowercases a guess or secret word for comparison.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Minimum guess length for the "word contains guess" rule.
pub const MIN_PARTIAL_GUESS: usize = 3;

/// Returns `true` if `guess` counts as a correct answer for `word`.
///
/// Both sides are normalized, then the guess matches if it equals the
/// word, contains the word, or is at least [`MIN_PARTIAL_GUESS`]
/// characters long and contained in the word.
///
/// The last rule is deliberately lenient: `"ele"` matches `"elephant"`.
pub fn is_match(guess: &str, word: &str) -> bool {
    let guess = normalize(guess);
    let word = normalize(word);
    if guess.is_empty() || word.is_empty() {
        return false;
    }
    guess == word
        || guess.contains(&word)
        || (guess.chars().count() >= MIN_PARTIAL_GUESS && word.contains(&guess))
}

/// Inputs to [`guess_score`].
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput {
    pub base: u32,
    pub time_bonus: u32,
    /// Revealable letters in the word (spaces excluded).
    pub letters: usize,
    /// Letters auto-revealed at guess time.
    pub revealed: usize,
    pub remaining_secs: u32,
    pub round_secs: u32,
}

/// Points for a correct guess.
///
/// `max(1, floor(base × (1 − revealed/letters))) + floor(bonus × remaining/round)`
pub fn guess_score(input: ScoreInput) -> u32 {
    let letters = input.letters.max(1) as u64;
    let hidden = letters.saturating_sub(input.revealed as u64);
    let base = (u64::from(input.base) * hidden / letters).max(1);

    let bonus = if input.round_secs == 0 {
        0
    } else {
        let remaining = input.remaining_secs.min(input.round_secs);
        u64::from(input.time_bonus) * u64::from(remaining) / u64::from(input.round_secs)
    };

    (base + bonus) as u32
}

/// Number of positions that can ever be revealed.
pub fn revealable_letters(word: &str) -> usize {
    word.chars().filter(|c| !c.is_whitespace()).count()
}

/// The word as guessers see it: hidden letters become `_`, spaces stay.
pub fn mask(word: &str, revealed: &[bool]) -> String {
    word.chars()
        .enumerate()
        .map(|(i, c)| {
            if c.is_whitespace() || revealed.get(i).copied().unwrap_or(false) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Reveals one hidden, non-space position chosen uniformly at random.
///
/// Returns the index revealed, or `None` if nothing is left to reveal.
pub fn reveal_one<R: Rng + ?Sized>(word: &str, revealed: &mut [bool], rng: &mut R) -> Option<usize> {
    let hidden: Vec<usize> = word
        .chars()
        .enumerate()
        .filter(|(i, c)| !c.is_whitespace() && !revealed.get(*i).copied().unwrap_or(true))
        .map(|(i, _)| i)
        .collect();
    let index = *hidden.choose(rng)?;
    revealed[index] = true;
    Some(index)
}

/// Picks a secret word, avoiding `used` while any unused word remains.
pub fn pick_word<'a, R: Rng + ?Sized>(
    words: &'a [String],
    used: &[String],
    rng: &mut R,
) -> Option<&'a String> {
    let fresh: Vec<&String> = words.iter().filter(|w| !used.contains(w)).collect();
    match fresh.choose(rng) {
        Some(word) => Some(*word),
        None => words.choose(rng),
    }
}

//! Fuzzy answer matching: normalization, bigram similarity, and pace rules.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Words that carry no identifying information in track titles. They appear
/// in dash suffixes ("- Remastered 2011") and as stray tokens, and are removed
/// during normalization in both positions.
const NOISE_WORDS: &[&str] = &[
    "remastered",
    "remaster",
    "remix",
    "live",
    "acoustic",
    "radio",
    "single",
    "album",
    "version",
    "edit",
    "mix",
    "deluxe",
    "bonus",
    "original",
    "mono",
    "stereo",
    "anniversary",
    "edition",
    "feat",
    "featuring",
    "ft",
    "with",
];

/// Maximum number of letters collapsed out of a dotted acronym (`p.i.m.p`).
const MAX_ACRONYM_LETTERS: usize = 6;

/// Default per-field acceptance threshold for the Dice similarity.
const SIMILARITY_THRESHOLD: f64 = 0.75;
/// Stricter threshold applied when the shorter normalized operand is short
/// enough that bigram similarity gets noisy.
const SHORT_SIMILARITY_THRESHOLD: f64 = 0.85;
/// Normalized length at or below which the stricter threshold applies.
const SHORT_OPERAND_LEN: usize = 5;

/// Minimum shorter/longer length ratio for the artist containment rule.
const CONTAINMENT_MIN_RATIO: f64 = 0.5;

/// Scoring class for a round submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuessOutcome {
    /// Both the title and the artist were accepted.
    Both,
    /// Exactly one of the two fields was accepted.
    One,
    /// Neither field was accepted (also used for non-submissions).
    None,
}

/// Outcome of scoring a single submission against the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerScore {
    pub outcome: GuessOutcome,
    pub song_correct: bool,
    pub artist_correct: bool,
}

/// Normalize a title or artist name for comparison.
///
/// The transformation order matters: bracketed spans and dash suffixes are
/// removed before acronym collapsing so `"P.I.M.P. (Radio Edit) - Remastered
/// 2003"` reduces to `"pimp"`.
pub fn normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let stripped = strip_bracketed(&lowered);
    let truncated = truncate_noise_suffix(&stripped);
    let collapsed = collapse_acronyms(truncated);

    let mut spaced = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        if c == '.' {
            continue;
        }
        if c.is_alphanumeric() || c == '_' || c == ' ' {
            spaced.push(c);
        } else {
            spaced.push(' ');
        }
    }

    spaced
        .split_whitespace()
        .filter(|word| !NOISE_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sørensen-Dice coefficient over character bigrams of the normalized inputs.
///
/// Returns 1.0 for exact (normalized) equality and 0.0 when either normalized
/// operand is empty.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let left = bigrams(&a);
    let mut right = bigrams(&b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let total = left.len() + right.len();
    let mut shared = 0usize;
    for gram in left {
        if let Some(index) = right.iter().position(|other| *other == gram) {
            right.swap_remove(index);
            shared += 1;
        }
    }

    (2 * shared) as f64 / total as f64
}

/// Whether a submitted title is accepted for the given track name.
pub fn title_matches(guess: &str, track_name: &str) -> bool {
    let guess_norm = normalize(guess);
    let track_norm = normalize(track_name);
    if guess_norm.is_empty() || track_norm.is_empty() {
        return false;
    }
    similarity(guess, track_name) >= field_threshold(&guess_norm, &track_norm)
}

/// Whether a submitted artist is accepted for any of the track's artists.
///
/// Beyond the similarity threshold, containment of one normalized name inside
/// the other counts when the length ratio is at least [`CONTAINMENT_MIN_RATIO`]
/// ("queen" inside "the queen" style credits).
pub fn artist_matches(guess: &str, artists: &[String]) -> bool {
    let guess_norm = normalize(guess);
    if guess_norm.is_empty() {
        return false;
    }

    artists.iter().any(|artist| {
        let artist_norm = normalize(artist);
        if artist_norm.is_empty() {
            return false;
        }
        if similarity(guess, artist) >= field_threshold(&guess_norm, &artist_norm) {
            return true;
        }
        contains_with_ratio(&guess_norm, &artist_norm)
    })
}

/// Score a submission against the track's name and artist list.
pub fn score_answer(
    title_guess: &str,
    artist_guess: &str,
    track_name: &str,
    artists: &[String],
) -> AnswerScore {
    let song_correct = title_matches(title_guess, track_name);
    let artist_correct = artist_matches(artist_guess, artists);

    let outcome = match (song_correct, artist_correct) {
        (true, true) => GuessOutcome::Both,
        (false, false) => GuessOutcome::None,
        _ => GuessOutcome::One,
    };

    AnswerScore {
        outcome,
        song_correct,
        artist_correct,
    }
}

/// Pace adjustment for a scoring class.
pub fn pace_delta(outcome: GuessOutcome) -> i8 {
    match outcome {
        GuessOutcome::Both => 1,
        GuessOutcome::One => 0,
        GuessOutcome::None => -3,
    }
}

/// Apply a pace delta, clamping the result to the valid [0, 10] range.
pub fn apply_pace_delta(pace: u8, delta: i8) -> u8 {
    (i16::from(pace) + i16::from(delta)).clamp(0, 10) as u8
}

/// Pace gap at which a player is eliminated after round `round`.
///
/// The threshold tightens by one point every six rounds and never drops
/// below one.
pub fn elimination_threshold(round: u32) -> u8 {
    let relaxed = 10u32.saturating_sub((round.saturating_sub(1)) / 6);
    relaxed.max(1) as u8
}

/// Whether an elimination check runs after the given round.
pub fn is_elimination_round(round: u32) -> bool {
    round > 0 && round % 6 == 0
}

fn field_threshold(a: &str, b: &str) -> f64 {
    let shorter = a.chars().count().min(b.chars().count());
    if shorter <= SHORT_OPERAND_LEN {
        SHORT_SIMILARITY_THRESHOLD
    } else {
        SIMILARITY_THRESHOLD
    }
}

fn contains_with_ratio(a: &str, b: &str) -> bool {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if !longer.contains(shorter) {
        return false;
    }
    let ratio = shorter.chars().count() as f64 / longer.chars().count() as f64;
    ratio >= CONTAINMENT_MIN_RATIO
}

/// Remove parenthesized and bracketed spans, including the delimiters.
fn strip_bracketed(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut paren_depth = 0usize;
    let mut bracket_depth = 0usize;

    for c in input.chars() {
        match c {
            '(' => paren_depth += 1,
            ')' => paren_depth = paren_depth.saturating_sub(1),
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            _ if paren_depth == 0 && bracket_depth == 0 => result.push(c),
            _ => {}
        }
    }

    result
}

/// Truncate at the first dash whose following word is a noise word.
fn truncate_noise_suffix(input: &str) -> &str {
    for (index, c) in input.char_indices() {
        if c != '-' && c != '\u{2013}' && c != '\u{2014}' {
            continue;
        }
        let rest = input[index + c.len_utf8()..].trim_start();
        let next_word: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric())
            .collect();
        if NOISE_WORDS.contains(&next_word.as_str()) {
            return &input[..index];
        }
    }
    input
}

/// Collapse dotted acronyms of up to [`MAX_ACRONYM_LETTERS`] letters.
///
/// `p.i.m.p` and `p.i.m.p.` both become `pimp`; longer dotted runs are left
/// for the plain dot-dropping pass.
fn collapse_acronyms(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut result = String::with_capacity(input.len());
    let mut i = 0usize;

    while i < chars.len() {
        if let Some((letters, consumed)) = acronym_at(&chars, i) {
            result.extend(letters);
            i += consumed;
        } else {
            result.push(chars[i]);
            i += 1;
        }
    }

    result
}

/// Detect a `x.y.z` run starting at `start`, returning its letters and the
/// number of chars consumed.
fn acronym_at(chars: &[char], start: usize) -> Option<(Vec<char>, usize)> {
    if start > 0 && chars[start - 1].is_alphanumeric() {
        return None;
    }

    let mut letters = Vec::new();
    let mut i = start;
    while i + 1 < chars.len()
        && chars[i].is_alphabetic()
        && chars[i + 1] == '.'
        && letters.len() < MAX_ACRONYM_LETTERS
    {
        letters.push(chars[i]);
        i += 2;
    }

    // At least two dotted letters make an acronym; a final bare letter
    // (as in `a.b.c`) belongs to it.
    if letters.len() < 2 {
        return None;
    }
    if i < chars.len()
        && chars[i].is_alphabetic()
        && letters.len() < MAX_ACRONYM_LETTERS
        && (i + 1 >= chars.len() || !chars[i + 1].is_alphanumeric())
    {
        letters.push(chars[i]);
        i += 1;
    }

    Some((letters, i - start))
}

/// Character bigrams of a string, as a multiset.
fn bigrams(input: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = input.chars().collect();
    chars.windows(2).map(|pair| (pair[0], pair[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artists(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn normalize_collapses_acronym_title() {
        assert_eq!(normalize("P.I.M.P. (Radio Edit) - Remastered 2003"), "pimp");
    }

    #[test]
    fn normalize_strips_brackets_and_dash_suffixes() {
        assert_eq!(
            normalize("Bohemian Rhapsody - Remastered 2011"),
            "bohemian rhapsody"
        );
        assert_eq!(normalize("Hello [Live at Wembley]"), "hello");
        assert_eq!(
            normalize("Smells Like Teen Spirit (Remastered)"),
            "smells like teen spirit"
        );
    }

    #[test]
    fn normalize_keeps_meaningful_dashes() {
        assert_eq!(normalize("Twenty-One"), "twenty one");
    }

    #[test]
    fn normalize_removes_noise_tokens_anywhere() {
        assert_eq!(normalize("Creep Acoustic"), "creep");
        assert_eq!(normalize("Thriller feat. Vincent Price"), "thriller vincent price");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "P.I.M.P. (Radio Edit) - Remastered 2003",
            "Bohemian Rhapsody - Remastered 2011",
            "  weird   spacing\tand-dash ",
            "AC/DC",
            "",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let pairs = [
            ("Bohemian Rhapsody", "bohemian rapsody"),
            ("Hello", "Yellow"),
            ("night", "nacht"),
            ("abc", "xyz"),
        ];
        for (a, b) in pairs {
            let forward = similarity(a, b);
            let backward = similarity(b, a);
            assert_eq!(forward, backward);
            assert!((0.0..=1.0).contains(&forward));
        }
    }

    #[test]
    fn similarity_of_equal_inputs_is_one() {
        assert_eq!(similarity("Bohemian Rhapsody", "Bohemian Rhapsody"), 1.0);
        assert_eq!(
            similarity("Bohemian Rhapsody", "Bohemian Rhapsody - Remastered 2011"),
            1.0
        );
    }

    #[test]
    fn similarity_of_empty_operand_is_zero() {
        assert_eq!(similarity("", "Hello"), 0.0);
        assert_eq!(similarity("Hello", "(Live)"), 0.0);
    }

    #[test]
    fn scores_both_fields_for_close_guesses() {
        let score = score_answer(
            "Bohemian Rhapsody",
            "queen",
            "Bohemian Rhapsody - Remastered 2011",
            &artists(&["Queen"]),
        );
        assert_eq!(score.outcome, GuessOutcome::Both);
        assert!(score.song_correct);
        assert!(score.artist_correct);
        assert_eq!(pace_delta(score.outcome), 1);
    }

    #[test]
    fn scores_none_for_nonsense() {
        let score = score_answer("xxxxx", "yyyyy", "Hello", &artists(&["Adele"]));
        assert_eq!(score.outcome, GuessOutcome::None);
        assert!(!score.song_correct);
        assert!(!score.artist_correct);
    }

    #[test]
    fn scores_one_for_single_field() {
        let score = score_answer(
            "Bohemian Rhapsody",
            "The Beatles",
            "Bohemian Rhapsody",
            &artists(&["Queen"]),
        );
        assert_eq!(score.outcome, GuessOutcome::One);
        assert!(score.song_correct);
        assert!(!score.artist_correct);
    }

    #[test]
    fn short_titles_need_the_stricter_threshold() {
        // "hells" vs "hello" shares 3 of 8 bigrams: similarity 0.75. Enough
        // for a long title, but operands this short require 0.85.
        assert!(similarity("hells", "Hello") >= SIMILARITY_THRESHOLD);
        assert!(similarity("hells", "Hello") < SHORT_SIMILARITY_THRESHOLD);
        assert!(!title_matches("hells", "Hello"));
        assert!(title_matches("Hello", "Hello"));
    }

    #[test]
    fn artist_containment_accepts_partial_credits() {
        // "queen" is contained in "the queen" and long enough relative to it.
        assert!(artist_matches("queen", &artists(&["The Queen"])));
        // Containment with a length ratio below one half is rejected.
        assert!(!artist_matches("queen", &artists(&["Queen Official Orchestra"])));
    }

    #[test]
    fn any_listed_artist_counts() {
        let listed = artists(&["David Bowie", "Queen"]);
        assert!(artist_matches("queen", &listed));
        assert!(artist_matches("david bowie", &listed));
        assert!(!artist_matches("abba", &listed));
    }

    #[test]
    fn pace_clamps_at_both_ends() {
        assert_eq!(apply_pace_delta(2, pace_delta(GuessOutcome::None)), 0);
        assert_eq!(apply_pace_delta(10, pace_delta(GuessOutcome::Both)), 10);
        assert_eq!(apply_pace_delta(5, pace_delta(GuessOutcome::One)), 5);
        assert_eq!(apply_pace_delta(0, pace_delta(GuessOutcome::None)), 0);
    }

    #[test]
    fn elimination_threshold_tightens_every_six_rounds() {
        assert_eq!(elimination_threshold(1), 10);
        assert_eq!(elimination_threshold(6), 10);
        assert_eq!(elimination_threshold(7), 9);
        assert_eq!(elimination_threshold(12), 9);
        assert_eq!(elimination_threshold(18), 8);
        assert_eq!(elimination_threshold(60), 1);
        assert_eq!(elimination_threshold(600), 1);
    }

    #[test]
    fn elimination_rounds_are_multiples_of_six() {
        assert!(!is_elimination_round(0));
        assert!(!is_elimination_round(5));
        assert!(is_elimination_round(6));
        assert!(!is_elimination_round(7));
        assert!(is_elimination_round(12));
    }
}

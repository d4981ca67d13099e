use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("word regex"));
static SENTENCE_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("sentence regex"));

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "because", "as", "what", "when", "where", "how",
    "who", "whom", "which", "this", "that", "these", "those", "am", "is", "are", "was", "were",
    "be", "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "i",
    "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "my", "your", "his",
    "its", "our", "their", "mine", "yours", "hers", "ours", "theirs", "in", "on", "at", "to",
    "from", "by", "for", "with", "about", "against", "between", "into", "through", "during",
    "before", "after", "above", "below", "under", "over",
];

const TOP_KEYWORDS: usize = 20;
const WORDS_PER_MINUTE: usize = 200;
const THIN_CONTENT_WORDS: usize = 300;

/// A frequent non-stop-word term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub word: String,
    pub count: usize,
    /// Percentage of filtered terms, two decimals
    pub density: f64,
}

/// Readability and keyword metrics for a page's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetrics {
    pub word_count: usize,
    pub sentence_count: usize,
    /// Flesch Reading Ease, 0..=100
    pub readability_score: f64,
    pub flesch_kincaid_grade: f64,
    pub gunning_fog_index: f64,
    pub reading_time_minutes: usize,
    pub keywords: Vec<Keyword>,
    pub is_thin_content: bool,
}

impl ContentMetrics {
    /// The result for text with no words or no sentences
    pub fn empty() -> Self {
        Self {
            word_count: 0,
            sentence_count: 0,
            readability_score: 0.0,
            flesch_kincaid_grade: 0.0,
            gunning_fog_index: 0.0,
            reading_time_minutes: 0,
            keywords: Vec::new(),
            is_thin_content: true,
        }
    }
}

/// Stateless readability and keyword scoring over plain text
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentAnalyzer;

impl ContentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Scores `text`
    ///
    /// # Examples
    ///
    /// ```
    /// use newt_walker::ContentAnalyzer;
    ///
    /// let metrics = ContentAnalyzer::new().analyze("");
    /// assert_eq!(metrics.word_count, 0);
    /// assert!(metrics.is_thin_content);
    /// ```
    pub fn analyze(&self, text: &str) -> ContentMetrics {
        if text.trim().is_empty() {
            return ContentMetrics::empty();
        }

        let lowered = text.to_lowercase();
        let words: Vec<&str> = WORD_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
        let word_count = words.len();
        let sentence_count = count_sentences(text);

        if word_count == 0 || sentence_count == 0 {
            return ContentMetrics::empty();
        }

        let syllables: Vec<usize> = words.iter().map(|w| count_syllables(w)).collect();
        let syllable_count: usize = syllables.iter().sum();
        let complex_words = syllables.iter().filter(|&&s| s >= 3).count();

        let words_f = word_count as f64;
        let words_per_sentence = words_f / sentence_count as f64;
        let syllables_per_word = syllable_count as f64 / words_f;

        let flesch = 206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word;
        let grade = 0.39 * words_per_sentence + 11.8 * syllables_per_word - 15.59;
        let fog = 0.4 * (words_per_sentence + 100.0 * (complex_words as f64 / words_f));

        ContentMetrics {
            word_count,
            sentence_count,
            readability_score: round_to(flesch.clamp(0.0, 100.0), 1),
            flesch_kincaid_grade: round_to(grade.max(0.0), 1),
            gunning_fog_index: round_to(fog.max(0.0), 1),
            reading_time_minutes: (word_count + WORDS_PER_MINUTE - 1) / WORDS_PER_MINUTE,
            keywords: extract_keywords(&words),
            is_thin_content: word_count < THIN_CONTENT_WORDS,
        }
    }
}

/// Non-empty pieces between runs of `.`, `!` or `?` followed by whitespace
/// or the end of the text
fn count_sentences(text: &str) -> usize {
    SENTENCE_SPLIT_RE
        .split(text)
        .filter(|s| !s.trim().is_empty())
        .count()
}

/// Vowel-group syllable estimate; always at least one
pub fn count_syllables(word: &str) -> usize {
    let word = word.to_lowercase();
    if word.chars().count() <= 3 {
        return 1;
    }

    let stem = word.strip_suffix('e').unwrap_or(&word);
    let mut count = 0;
    let mut prev_vowel = false;
    for c in stem.chars() {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }
    count.max(1)
}

/// Top terms by frequency; ties keep first-seen order
fn extract_keywords(words: &[&str]) -> Vec<Keyword> {
    let filtered: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| {
            !STOP_WORDS.contains(w)
                && w.chars().count() > 2
                && !w.chars().all(|c| c.is_numeric())
        })
        .collect();

    if filtered.is_empty() {
        return Vec::new();
    }

    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, word) in filtered.iter().enumerate() {
        counts.entry(*word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let total = filtered.len() as f64;
    ranked
        .into_iter()
        .take(TOP_KEYWORDS)
        .map(|(word, count, _)| Keyword {
            word: word.to_string(),
            count,
            density: round_to(count as f64 / total * 100.0, 2),
        })
        .collect()
}

/// Rounds to `decimals` places, ties to even
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_ties_to_even() {
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
        assert_eq!(round_to(0.25, 1), 0.2);
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
        assert_eq!(round_to(41.26, 1), 41.3);
    }

    fn long_text(sentences: usize) -> String {
        "The quick brown fox jumps over the lazy dog near the quiet river bank. "
            .repeat(sentences)
    }

    #[test]
    fn test_empty_input() {
        let analyzer = ContentAnalyzer::new();
        assert_eq!(analyzer.analyze(""), ContentMetrics::empty());
        assert_eq!(analyzer.analyze("   \n\t "), ContentMetrics::empty());
    }

    #[test]
    fn test_punctuation_only_has_no_words() {
        let metrics = ContentAnalyzer::new().analyze("... !!! ???");
        assert_eq!(metrics, ContentMetrics::empty());
    }

    #[test]
    fn test_long_text_is_not_thin() {
        let metrics = ContentAnalyzer::new().analyze(&long_text(30));
        assert_eq!(metrics.word_count, 420);
        assert_eq!(metrics.sentence_count, 30);
        assert!(!metrics.is_thin_content);
        assert!((0.0..=100.0).contains(&metrics.readability_score));
        assert_eq!(metrics.reading_time_minutes, 3);
    }

    #[test]
    fn test_short_text_is_thin() {
        let metrics = ContentAnalyzer::new().analyze("Hello world. This is short!");
        assert_eq!(metrics.word_count, 5);
        assert_eq!(metrics.sentence_count, 2);
        assert!(metrics.is_thin_content);
        assert_eq!(metrics.reading_time_minutes, 1);
    }

    #[test]
    fn test_sentence_split_requires_whitespace_or_end() {
        assert_eq!(count_sentences("Version 2.5 is out. Get it now"), 2);
        assert_eq!(count_sentences("One! Two? Three..."), 3);
    }

    #[test]
    fn test_syllables_at_least_one() {
        for word in ["a", "the", "rhythm", "bcdfg", "xyz", "strengths", "queue"] {
            assert!(count_syllables(word) >= 1, "{}", word);
        }
        assert_eq!(count_syllables("cat"), 1);
        assert_eq!(count_syllables("make"), 1);
        assert_eq!(count_syllables("banana"), 3);
        assert_eq!(count_syllables("readability"), 5);
    }

    #[test]
    fn test_keywords_filter_and_rank() {
        let metrics = ContentAnalyzer::new()
            .analyze("Rust crawler. The rust crawler is fast. Rust is 2024 ok.");
        let words: Vec<&str> = metrics.keywords.iter().map(|k| k.word.as_str()).collect();
        assert_eq!(words, vec!["rust", "crawler", "fast"]);
        assert_eq!(metrics.keywords[0].count, 3);
        assert_eq!(metrics.keywords[0].density, 50.0);
        assert_eq!(metrics.keywords[2].density, 16.67);
    }

    #[test]
    fn test_keywords_capped_at_twenty() {
        let text: String = (0..40)
            .map(|i| format!("keyword{} ", i))
            .collect::<String>()
            + ".";
        let metrics = ContentAnalyzer::new().analyze(&text);
        assert_eq!(metrics.keywords.len(), 20);
        assert_eq!(metrics.keywords[0].word, "keyword0");
    }

    #[test]
    fn test_scores_are_floored() {
        let text = "Incomprehensibility characteristically institutionalization \
                    internationalization interdisciplinary.";
        let metrics = ContentAnalyzer::new().analyze(text);
        assert_eq!(metrics.readability_score, 0.0);
        assert!(metrics.flesch_kincaid_grade > 0.0);
        assert!(metrics.gunning_fog_index > 0.0);
    }
}

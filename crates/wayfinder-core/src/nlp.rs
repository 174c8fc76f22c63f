//! English tokenization with stop-word and alphabetic flags.
//!
//! The [`Tokenizer`] trait is the seam the documentor uses to strip noise
//! from session text. [`EnglishTokenizer`] is the built-in implementation:
//! it splits on word boundaries, keeps punctuation runs as their own
//! tokens, and flags each token against a fixed English stop-word list.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Words (lowercase) that carry no routing signal.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "amount",
    "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "back", "be", "became", "because", "become", "becomes", "becoming",
    "been", "before", "beforehand", "behind", "being", "below", "beside", "besides", "between",
    "beyond", "both", "but", "by", "can", "cannot", "could", "did", "do", "does", "doing", "done",
    "down", "due", "during", "each", "either", "else", "elsewhere", "enough", "etc", "even",
    "ever", "every", "everyone", "everything", "everywhere", "except", "few", "for", "former",
    "formerly", "from", "further", "get", "give", "go", "had", "has", "have", "he", "hence",
    "her", "here", "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him",
    "himself", "his", "how", "however", "i", "if", "in", "indeed", "into", "is", "it", "its",
    "itself", "just", "keep", "last", "latter", "latterly", "least", "less", "made", "many",
    "may", "me", "meanwhile", "might", "mine", "more", "moreover", "most", "mostly", "much",
    "must", "my", "myself", "namely", "neither", "never", "nevertheless", "next", "no", "nobody",
    "none", "noone", "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on",
    "once", "only", "onto", "or", "other", "others", "otherwise", "our", "ours", "ourselves",
    "out", "over", "own", "per", "perhaps", "please", "put", "quite", "rather", "re", "really",
    "same", "say", "see", "seem", "seemed", "seeming", "seems", "several", "she", "should",
    "since", "so", "some", "somehow", "someone", "something", "sometime", "sometimes",
    "somewhere", "still", "such", "than", "that", "the", "their", "theirs", "them", "themselves",
    "then", "thence", "there", "thereafter", "thereby", "therefore", "therein", "thereupon",
    "these", "they", "this", "those", "though", "through", "throughout", "thru", "thus", "to",
    "together", "too", "toward", "towards", "under", "until", "up", "upon", "us", "used",
    "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence",
    "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever",
    "whether", "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

static STOP_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|[^\w\s]+").expect("static token pattern"));

/// Whether `word` (any case) is an English stop word.
pub fn is_stop_word(word: &str) -> bool {
    STOP_SET.contains(word.to_lowercase().as_str())
}

/// One token of input text, borrowed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub is_stop: bool,
    /// Every character is alphabetic.
    pub is_alpha: bool,
}

/// Splits text into flagged tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize<'a>(&self, text: &'a str) -> Vec<Token<'a>>;

    /// Tokens that are alphabetic and not stop words, in input order.
    fn content_words(&self, text: &str) -> Vec<String> {
        self.tokenize(text)
            .into_iter()
            .filter(|t| t.is_alpha && !t.is_stop)
            .map(|t| t.text.to_string())
            .collect()
    }
}

/// Regex-based English tokenizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishTokenizer;

impl Tokenizer for EnglishTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Vec<Token<'a>> {
        TOKEN_PATTERN
            .find_iter(text)
            .map(|m| {
                let word = m.as_str();
                Token {
                    text: word,
                    is_stop: is_stop_word(word),
                    is_alpha: word.chars().all(char::is_alphabetic),
                }
            })
            .collect()
    }
}

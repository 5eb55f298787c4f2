//! Word segmentation for fuzzy comparison.
//!
//! Japanese has no spaces between words. Names are split by a morphological
//! analyzer over the embedded IPADIC dictionary, and noun-only mode keeps the
//! tokens tagged 名詞. When the dictionary cannot be loaded, text is split at
//! script boundaries instead (kanji, hiragana, katakana, latin, digits) and
//! hiragana runs stand in for particles.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, OnceLock};

use lindera::dictionary::{load_dictionary_from_kind, DictionaryKind};
use lindera::mode::Mode;
use lindera::tokenizer::Tokenizer;
use tracing::{debug, warn};

use super::normalize::normalize_text;

/// Script class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenClass {
    Kanji,
    Hiragana,
    Katakana,
    Latin,
    Digit,
    Symbol,
}

impl TokenClass {
    fn of(c: char) -> Self {
        match c {
            '々' | '〆' | 'ヶ' => Self::Kanji,
            '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}' => {
                Self::Kanji
            }
            '\u{3041}'..='\u{309F}' => Self::Hiragana,
            'ー' | '\u{30A1}'..='\u{30FA}' | '\u{30FD}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' => {
                Self::Katakana
            }
            c if c.is_ascii_digit() || c.is_numeric() => Self::Digit,
            c if c.is_alphabetic() => Self::Latin,
            _ => Self::Symbol,
        }
    }

    /// Class of the first character; `Symbol` for empty text.
    pub fn of_text(text: &str) -> Self {
        text.chars().next().map(Self::of).unwrap_or(Self::Symbol)
    }

    /// Whether the class can carry a noun.
    pub fn is_nominal(&self) -> bool {
        !matches!(self, Self::Hiragana | Self::Symbol)
    }
}

/// Single katakana used as a genitive particle in place names (三ノ塔, 駒ケ岳).
fn is_connective(surface: &str) -> bool {
    matches!(surface, "ノ" | "ケ" | "ヶ" | "ガ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub surface: String,
    pub class: TokenClass,
    /// Kept by noun-only decomposition.
    pub nominal: bool,
}

impl Token {
    fn from_script(surface: String, class: TokenClass) -> Self {
        let nominal = class.is_nominal() && !is_connective(&surface);
        Self {
            surface,
            class,
            nominal,
        }
    }
}

/// Splits normalized text into tokens.
pub trait Segmenter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<Token>;
}

/// Script-boundary segmenter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptSegmenter;

impl Segmenter for ScriptSegmenter {
    fn segment(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut current_class: Option<TokenClass> = None;

        for c in text.chars() {
            if c.is_whitespace() {
                flush(&mut tokens, &mut current, current_class.take());
                continue;
            }
            let class = TokenClass::of(c);
            // Symbols never merge with neighbours
            if current_class != Some(class) || class == TokenClass::Symbol {
                flush(&mut tokens, &mut current, current_class.take());
                current_class = Some(class);
            }
            current.push(c);
        }
        flush(&mut tokens, &mut current, current_class);
        tokens
    }
}

fn flush(tokens: &mut Vec<Token>, current: &mut String, class: Option<TokenClass>) {
    if let Some(class) = class {
        if !current.is_empty() {
            tokens.push(Token::from_script(std::mem::take(current), class));
        }
    }
    current.clear();
}

/// Part-of-speech tags that count as nouns. Unknown words are mostly proper
/// nouns (peaks, huts, passes) missing from the dictionary.
const NOUN_TAGS: [&str; 2] = ["名詞", "UNK"];

static IPADIC_TOKENIZER: OnceLock<Option<Mutex<Tokenizer>>> = OnceLock::new();

fn ipadic_tokenizer() -> Option<&'static Mutex<Tokenizer>> {
    IPADIC_TOKENIZER
        .get_or_init(|| match load_dictionary_from_kind(DictionaryKind::IPADIC) {
            Ok(dictionary) => {
                let segmenter = lindera::segmenter::Segmenter::new(Mode::Normal, dictionary, None);
                debug!("Loaded IPADIC dictionary");
                Some(Mutex::new(Tokenizer::new(segmenter)))
            }
            Err(e) => {
                warn!("Failed to load IPADIC dictionary: {}", e);
                None
            }
        })
        .as_ref()
}

/// Morphological segmenter over the embedded IPADIC dictionary.
///
/// The dictionary is loaded once per process and shared.
#[derive(Clone, Copy)]
pub struct MorphologicalSegmenter {
    tokenizer: &'static Mutex<Tokenizer>,
}

impl MorphologicalSegmenter {
    /// `None` when the dictionary cannot be loaded.
    pub fn load() -> Option<Self> {
        ipadic_tokenizer().map(|tokenizer| Self { tokenizer })
    }
}

impl std::fmt::Debug for MorphologicalSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MorphologicalSegmenter").finish_non_exhaustive()
    }
}

impl Segmenter for MorphologicalSegmenter {
    fn segment(&self, text: &str) -> Vec<Token> {
        let Ok(tokenizer) = self.tokenizer.lock() else {
            return ScriptSegmenter.segment(text);
        };
        let mut tokens = match tokenizer.tokenize(text) {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!("Morphological analysis failed for '{}': {}", text, e);
                return ScriptSegmenter.segment(text);
            }
        };

        let mut segmented = Vec::with_capacity(tokens.len());
        for token in tokens.iter_mut() {
            let surface = token.text.to_string();
            if surface.trim().is_empty() {
                continue;
            }
            let pos = token
                .details()
                .first()
                .map(|tag| tag.to_string())
                .unwrap_or_default();
            let nominal = NOUN_TAGS.contains(&pos.as_str()) && !is_connective(&surface);
            segmented.push(Token {
                class: TokenClass::of_text(&surface),
                surface,
                nominal,
            });
        }
        segmented
    }
}

/// Morphological segmenter when the dictionary loads, script segmentation otherwise.
pub fn default_segmenter() -> Box<dyn Segmenter> {
    match MorphologicalSegmenter::load() {
        Some(segmenter) => Box::new(segmenter),
        None => {
            warn!("Falling back to script-boundary segmentation");
            Box::new(ScriptSegmenter)
        }
    }
}

/// Bounded memo of decomposed strings, owned by one reconciler.
#[derive(Debug)]
pub struct TokenCache {
    capacity: usize,
    entries: HashMap<(String, bool), String>,
    order: VecDeque<(String, bool)>,
}

impl TokenCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, key: &(String, bool)) -> Option<&String> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: (String, bool), value: String) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }
}

/// Normalizes and segments text into a space-joined token string.
pub struct Decomposer {
    segmenter: Box<dyn Segmenter>,
    cache: TokenCache,
}

impl Decomposer {
    pub fn new(segmenter: Box<dyn Segmenter>, cache_capacity: usize) -> Self {
        Self {
            segmenter,
            cache: TokenCache::new(cache_capacity),
        }
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Space-joined tokens of the normalized text.
    ///
    /// With `noun_only`, only nominal tokens are kept. When nothing survives,
    /// the normalized text itself is returned.
    pub fn decompose(&mut self, text: &str, noun_only: bool) -> String {
        let key = (text.to_string(), noun_only);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let normalized = normalize_text(text);
        let tokens: Vec<String> = self
            .segmenter
            .segment(&normalized)
            .into_iter()
            .filter(|t| !noun_only || t.nominal)
            .map(|t| t.surface)
            .collect();

        let decomposed = if tokens.is_empty() {
            if !normalized.is_empty() {
                debug!("No tokens left for '{}', using normalized text", normalized);
            }
            normalized
        } else {
            tokens.join(" ")
        };

        self.cache.insert(key, decomposed.clone());
        decomposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surfaces(text: &str) -> Vec<String> {
        ScriptSegmenter
            .segment(text)
            .into_iter()
            .map(|t| t.surface)
            .collect()
    }

    #[test]
    fn test_splits_at_script_boundaries() {
        assert_eq!(surfaces("三条の湯コース"), vec!["三条", "の", "湯", "コース"]);
        assert_eq!(surfaces("鴨沢コース"), vec!["鴨沢", "コース"]);
        assert_eq!(surfaces("3合目から山頂"), vec!["3", "合目", "から", "山頂"]);
    }

    #[test]
    fn test_iteration_marks_stay_in_kanji_run() {
        assert_eq!(surfaces("燕岳々頂"), vec!["燕岳々頂"]);
        assert_eq!(surfaces("丹沢・大山"), vec!["丹沢", "・", "大山"]);
    }

    #[test]
    fn test_noun_only_drops_particles() {
        let mut decomposer = Decomposer::new(Box::new(ScriptSegmenter), 16);
        assert_eq!(decomposer.decompose("三条の湯", true), "三条 湯");
        assert_eq!(decomposer.decompose("三条の湯", false), "三条 の 湯");
    }

    #[test]
    fn test_falls_back_to_normalized_text() {
        let mut decomposer = Decomposer::new(Box::new(ScriptSegmenter), 16);
        assert_eq!(decomposer.decompose("から", true), "から");
        assert_eq!(decomposer.decompose("", true), "");
    }

    #[test]
    fn test_noun_only_drops_katakana_connective() {
        let mut decomposer = Decomposer::new(Box::new(ScriptSegmenter), 16);
        assert_eq!(decomposer.decompose("三ノ塔", true), "三 塔");
        assert_eq!(decomposer.decompose("三ノ塔", false), "三 ノ 塔");
    }

    fn morphological() -> Decomposer {
        let segmenter = MorphologicalSegmenter::load().expect("embedded IPADIC loads");
        Decomposer::new(Box::new(segmenter), 64)
    }

    #[test]
    fn test_morphological_splits_kanji_compounds() {
        let mut decomposer = morphological();
        let whole = decomposer.decompose("雲取山付近", true);
        let tokens: Vec<&str> = whole.split(' ').collect();
        assert!(tokens.len() > 1, "expected a split, got '{}'", whole);
        assert_eq!(tokens.last(), Some(&"付近"));

        let peak = decomposer.decompose("雲取山", true);
        assert_eq!(super::super::token_set_ratio(&peak, &whole), 1.0);
    }

    #[test]
    fn test_morphological_noun_filter_uses_part_of_speech() {
        let mut decomposer = morphological();
        let all = decomposer.decompose("三条の湯コース", false);
        let nouns = decomposer.decompose("三条の湯コース", true);
        assert!(all.split(' ').any(|t| t == "の"));
        assert!(!nouns.split(' ').any(|t| t == "の"));
        assert!(nouns.split(' ').any(|t| t == "コース"));

        let tower = decomposer.decompose("三ノ塔", true);
        assert!(!tower.split(' ').any(|t| t == "ノ"), "got '{}'", tower);
    }

    #[test]
    fn test_default_segmenter_is_morphological() {
        let tokens = default_segmenter().segment("登山道の崩落");
        let particle = tokens.iter().find(|t| t.surface == "の");
        assert!(particle.is_some_and(|t| !t.nominal));
        assert!(tokens.iter().any(|t| t.surface == "崩落" && t.nominal));
    }

    #[test]
    fn test_cache_is_bounded() {
        let mut decomposer = Decomposer::new(Box::new(ScriptSegmenter), 2);
        decomposer.decompose("雲取山", true);
        decomposer.decompose("大岳山", true);
        decomposer.decompose("御前山", true);
        assert_eq!(decomposer.cache().len(), 2);
        // Evicted entries are recomputed identically
        assert_eq!(decomposer.decompose("雲取山", true), "雲取山");
    }
}

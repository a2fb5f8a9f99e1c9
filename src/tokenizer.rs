//! CJK-aware tokenization for indexing and querying.
//!
//! FTS5's unicode61 tokenizer handles Latin scripts fine but cannot segment
//! CJK. Chinese runs go through jieba in search mode; kana and hangul runs
//! fall back to the union of unigrams and consecutive bigrams. Both the index
//! side ([`Tokenizer::fts_text`]) and the query side ([`Tokenizer::tokenize`])
//! use the same pipeline, so pre-segmented index content and segmented queries
//! always agree.

use jieba_rs::Jieba;
use std::sync::OnceLock;

/// Hard cap on tokens emitted per input.
pub const MAX_TOKENS: usize = 30;

/// Common Chinese function words dropped from token output.
const STOPWORDS: &[&str] = &[
    "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "一个",
    "上", "也", "很", "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好",
    "这", "那", "它", "他", "她", "们", "吗", "吧", "呢",
];

/// Tokenizer handle owning the lazily-initialized jieba segmenter.
///
/// jieba's dictionary load is deliberately deferred to the first CJK input so
/// pure-Latin workloads never pay for it.
pub struct Tokenizer {
    jieba: OnceLock<Jieba>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            jieba: OnceLock::new(),
        }
    }

    fn jieba(&self) -> &Jieba {
        self.jieba.get_or_init(Jieba::new)
    }

    /// Tokenize text into a deduplicated list of at most [`MAX_TOKENS`] tokens.
    ///
    /// Pipeline: sanitize punctuation to spaces, emit Latin/numeric words of
    /// length > 1, segment CJK runs, drop stopwords, dedup preserving first
    /// occurrence.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let sanitized: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        let mut tokens: Vec<String> = Vec::new();
        for word in sanitized.split_whitespace() {
            for run in split_script_runs(word) {
                match run {
                    ScriptRun::Latin(s) => {
                        if s.chars().count() > 1 {
                            tokens.push(s.to_lowercase());
                        }
                    }
                    ScriptRun::Cjk(s) => self.segment_cjk(s, &mut tokens),
                }
            }
        }

        tokens.retain(|t| !STOPWORDS.contains(&t.as_str()));

        let mut seen = std::collections::HashSet::new();
        tokens.retain(|t| seen.insert(t.clone()));
        tokens.truncate(MAX_TOKENS);
        tokens
    }

    /// Indexing entry point: the token list joined with single spaces, so the
    /// FTS table's own word tokenizer sees pre-segmented tokens.
    pub fn fts_text(&self, text: &str) -> String {
        self.tokenize(text).join(" ")
    }

    /// Segment one CJK run. Chinese ideographs go through jieba search-mode
    /// segmentation; kana/hangul use the unigram + bigram union.
    fn segment_cjk(&self, run: &str, out: &mut Vec<String>) {
        if run.chars().any(is_cjk_ideograph) {
            for word in self.jieba().cut_for_search(run, false) {
                let trimmed = word.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            }
        } else {
            unigrams_and_bigrams(run, out);
        }
    }
}

/// A maximal same-script run inside one whitespace-delimited word.
enum ScriptRun<'a> {
    Latin(&'a str),
    Cjk(&'a str),
}

/// Split a word into alternating Latin and CJK runs ("alice是谁" → ["alice", "是谁"]).
fn split_script_runs(word: &str) -> Vec<ScriptRun<'_>> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut current_cjk: Option<bool> = None;

    for (i, c) in word.char_indices() {
        let cjk = is_cjk(c);
        match current_cjk {
            Some(prev) if prev != cjk => {
                runs.push(make_run(&word[start..i], prev));
                start = i;
                current_cjk = Some(cjk);
            }
            Some(_) => {}
            None => current_cjk = Some(cjk),
        }
    }
    if start < word.len() {
        if let Some(cjk) = current_cjk {
            runs.push(make_run(&word[start..], cjk));
        }
    }
    runs
}

fn make_run(s: &str, cjk: bool) -> ScriptRun<'_> {
    if cjk {
        ScriptRun::Cjk(s)
    } else {
        ScriptRun::Latin(s)
    }
}

/// The union of unigrams and consecutive bigrams over a run.
fn unigrams_and_bigrams(run: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = run.chars().collect();
    for c in &chars {
        out.push(c.to_string());
    }
    for pair in chars.windows(2) {
        out.push(pair.iter().collect());
    }
}

pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'   // CJK Unified Basic
        | '\u{3400}'..='\u{4DBF}' // CJK Extension A
        | '\u{F900}'..='\u{FAFF}' // CJK Compatibility
        | '\u{3040}'..='\u{30FF}' // Hiragana + Katakana
        | '\u{AC00}'..='\u{D7AF}' // Hangul
    )
}

fn is_cjk_ideograph(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
    )
}

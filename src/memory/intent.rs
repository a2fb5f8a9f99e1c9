//! Query-intent classification and final result weighting.
//!
//! A lightweight bilingual heuristic sorts queries into four buckets, each
//! mapped to a retrieval strategy. The local reranker then folds priority,
//! recency, and vitality into the fused scores. An external cross-encoder,
//! when configured, replaces scores before the local pass — see the tool
//! layer; failures there degrade to this local path.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::memory::search::SearchHit;
use crate::tokenizer::Tokenizer;

/// The four query-intent buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Factual,
    Temporal,
    Causal,
    Exploratory,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Temporal => "temporal",
            Self::Causal => "causal",
            Self::Exploratory => "exploratory",
        }
    }
}

/// Classification outcome: the winning intent and a bounded confidence.
#[derive(Debug, Clone, Serialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
}

/// Retrieval strategy derived from an intent.
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub boost_recent: bool,
    pub boost_priority: bool,
    pub limit: usize,
}

struct IntentPatterns {
    factual: Vec<Regex>,
    temporal: Vec<Regex>,
    causal: Vec<Regex>,
    exploratory: Vec<Regex>,
    anchored: Vec<(Regex, Intent)>,
}

fn patterns() -> &'static IntentPatterns {
    static PATTERNS: OnceLock<IntentPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |s: &str| Regex::new(s).expect("valid intent regex");
        IntentPatterns {
            factual: vec![
                re(r"(?i)\b(what|who|where|which|whose)\b"),
                re(r"(?i)\b(define|definition|meaning)\b"),
                re(r"是什么|是谁|在哪|哪个|叫什么|多少"),
            ],
            temporal: vec![
                re(r"(?i)\b(when|yesterday|today|tomorrow|recently|lately)\b"),
                re(r"(?i)\b(last|next)\s+(week|month|year|time)\b"),
                re(r"(?i)\b\d+\s+(days?|weeks?|months?|years?)\s+ago\b"),
                re(r"\d{4}[-/年]\d{1,2}"),
                re(r"什么时候|何时|昨天|今天|明天|最近|上周|上个月|去年"),
            ],
            causal: vec![
                re(r"(?i)\b(why|because|cause[ds]?|reason|due\s+to|led\s+to|result\s+of)\b"),
                re(r"为什么|为何|因为|原因|导致|由于"),
            ],
            exploratory: vec![
                re(r"(?i)\b(tell\s+me\s+about|overview|explore|summarize|summary)\b"),
                re(r"(?i)\b(everything|all)\s+about\b"),
                re(r"(?i)\brelated\s+to\b"),
                re(r"介绍|了解|总结|相关|关于|有关"),
            ],
            anchored: vec![
                (re(r"(?i)^(what|who|where|which)\b|^是什么|^谁"), Intent::Factual),
                (re(r"(?i)^when\b|^什么时候|^何时"), Intent::Temporal),
                (re(r"(?i)^why\b|^为什么|^为何"), Intent::Causal),
                (re(r"(?i)^tell\s+me\s+about\b|^介绍"), Intent::Exploratory),
            ],
        }
    })
}

/// Score the query against every bucket and pick the winner.
///
/// Pattern hits score 1.0, anchored forms add 0.5. A short query (≤ 3 tokens)
/// with no pattern hits biases to factual. Confidence is
/// `min(0.95, max/total)`, or 0.5 when nothing matched.
pub fn classify(tokenizer: &Tokenizer, query: &str) -> IntentClassification {
    let p = patterns();
    let buckets = [
        (Intent::Factual, &p.factual),
        (Intent::Temporal, &p.temporal),
        (Intent::Causal, &p.causal),
        (Intent::Exploratory, &p.exploratory),
    ];

    let mut scores = [0.0f64; 4];
    for (i, (_, regexes)) in buckets.iter().enumerate() {
        for regex in regexes.iter() {
            if regex.is_match(query) {
                scores[i] += 1.0;
            }
        }
    }
    for (regex, intent) in &p.anchored {
        if regex.is_match(query) {
            let i = buckets.iter().position(|(b, _)| b == intent).expect("bucket");
            scores[i] += 0.5;
        }
    }

    let total: f64 = scores.iter().sum();
    if total == 0.0 {
        if tokenizer.tokenize(query).len() <= 3 {
            return IntentClassification {
                intent: Intent::Factual,
                confidence: 0.5,
            };
        }
        return IntentClassification {
            intent: Intent::Exploratory,
            confidence: 0.5,
        };
    }

    let (best, max_score) = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .expect("four buckets");

    IntentClassification {
        intent: buckets[best].0,
        confidence: (max_score / total).min(0.95),
    }
}

/// The fixed intent → strategy table.
pub fn strategy(intent: Intent) -> Strategy {
    match intent {
        Intent::Factual => Strategy {
            boost_recent: false,
            boost_priority: true,
            limit: 5,
        },
        Intent::Temporal => Strategy {
            boost_recent: true,
            boost_priority: false,
            limit: 10,
        },
        Intent::Causal => Strategy {
            boost_recent: false,
            boost_priority: false,
            limit: 10,
        },
        Intent::Exploratory => Strategy {
            boost_recent: false,
            boost_priority: false,
            limit: 15,
        },
    }
}

/// Local reranking pass: fold priority, recency, and vitality into the
/// scores, then sort and truncate to the strategy's limit.
pub fn rerank_local(mut hits: Vec<SearchHit>, strategy: &Strategy) -> Vec<SearchHit> {
    let now = chrono::Utc::now();

    for hit in &mut hits {
        let mut score = hit.score;

        if strategy.boost_priority {
            let multiplier = match hit.memory.priority {
                0 => 4.0,
                1 => 3.0,
                2 => 2.0,
                _ => 1.0,
            };
            score *= multiplier;
        }

        if strategy.boost_recent {
            if let Ok(updated) = chrono::DateTime::parse_from_rfc3339(&hit.memory.updated_at) {
                let days = (now - updated.with_timezone(&chrono::Utc)).num_seconds() as f64
                    / 86_400.0;
                score *= (1.0 / (1.0 + 0.1 * days.max(0.0))).max(0.1);
            }
        }

        score *= hit.memory.vitality.max(0.1);
        hit.score = score;
    }

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(strategy.limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{Memory, MemoryType};

    fn tok() -> Tokenizer {
        Tokenizer::new()
    }

    fn hit(priority: u8, vitality: f64, updated_days_ago: i64, score: f64) -> SearchHit {
        let updated =
            (chrono::Utc::now() - chrono::Duration::days(updated_days_ago)).to_rfc3339();
        SearchHit {
            memory: Memory {
                id: uuid::Uuid::new_v4().to_string(),
                agent_id: "default".into(),
                content: "test".into(),
                memory_type: MemoryType::Knowledge,
                priority,
                emotion_val: 0.0,
                vitality,
                stability: 90.0,
                access_count: 0,
                last_accessed: None,
                created_at: updated.clone(),
                updated_at: updated,
                source: None,
                hash: "0".repeat(16),
            },
            score,
            match_reason: "bm25".into(),
        }
    }

    #[test]
    fn question_words_classify_factual() {
        let c = classify(&tok(), "what is the user's favorite color");
        assert_eq!(c.intent, Intent::Factual);
        assert!(c.confidence > 0.5);
    }

    #[test]
    fn time_words_classify_temporal() {
        assert_eq!(classify(&tok(), "when did we deploy last week").intent, Intent::Temporal);
        assert_eq!(classify(&tok(), "最近发生了什么").intent, Intent::Temporal);
    }

    #[test]
    fn causal_markers_classify_causal() {
        assert_eq!(classify(&tok(), "why did the build fail").intent, Intent::Causal);
        assert_eq!(classify(&tok(), "为什么测试失败了").intent, Intent::Causal);
    }

    #[test]
    fn exploratory_phrases_classify_exploratory() {
        assert_eq!(
            classify(&tok(), "tell me about the migration project").intent,
            Intent::Exploratory
        );
    }

    #[test]
    fn short_unmatched_query_biases_factual() {
        let c = classify(&tok(), "favorite color");
        assert_eq!(c.intent, Intent::Factual);
        assert!((c.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_bounded() {
        let c = classify(&tok(), "why why because reason cause");
        assert!(c.confidence <= 0.95);
    }

    #[test]
    fn strategy_table_matches_intents() {
        assert!(strategy(Intent::Factual).boost_priority);
        assert!(!strategy(Intent::Factual).boost_recent);
        assert_eq!(strategy(Intent::Factual).limit, 5);

        assert!(strategy(Intent::Temporal).boost_recent);
        assert_eq!(strategy(Intent::Temporal).limit, 10);

        assert_eq!(strategy(Intent::Exploratory).limit, 15);
    }

    #[test]
    fn priority_boost_reorders() {
        let hits = vec![hit(3, 1.0, 0, 1.0), hit(0, 1.0, 0, 1.0)];
        let low_priority_id = hits[0].memory.id.clone();

        let ranked = rerank_local(hits, &strategy(Intent::Factual));
        assert_ne!(ranked[0].memory.id, low_priority_id, "P0 outranks P3");
        assert!((ranked[0].score - 4.0).abs() < 1e-9);
    }

    #[test]
    fn recency_boost_favors_fresh() {
        let hits = vec![hit(2, 1.0, 100, 1.0), hit(2, 1.0, 0, 1.0)];
        let stale_id = hits[0].memory.id.clone();

        let ranked = rerank_local(hits, &strategy(Intent::Temporal));
        assert_ne!(ranked[0].memory.id, stale_id);
        // 100 days → 1/(1+10) ≈ 0.09 clamps to the 0.1 floor
        assert!(ranked[1].score >= 0.1 * 0.1);
    }

    #[test]
    fn vitality_always_weighs_in() {
        let hits = vec![hit(2, 0.2, 0, 1.0), hit(2, 1.0, 0, 1.0)];
        let faded_id = hits[0].memory.id.clone();

        let ranked = rerank_local(hits, &strategy(Intent::Causal));
        assert_ne!(ranked[0].memory.id, faded_id);
        // Floor: vitality below 0.1 still multiplies by 0.1
        let floored = rerank_local(vec![hit(2, 0.01, 0, 1.0)], &strategy(Intent::Causal));
        assert!((floored[0].score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn limit_truncates() {
        let hits: Vec<SearchHit> = (0..20).map(|i| hit(2, 1.0, 0, i as f64)).collect();
        let ranked = rerank_local(hits, &strategy(Intent::Factual));
        assert_eq!(ranked.len(), 5);
    }
}

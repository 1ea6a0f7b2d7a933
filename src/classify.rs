//! Rule-based classification of process output lines.
//!
//! The category comes from the first matching rule of an ordered table; tags
//! come from an unordered table where every matching rule contributes. Both
//! tables are fixed at compile time, so classification is a pure function of
//! the input text.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::terminal::text::strip_ansi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Error,
    Warning,
    Success,
    Info,
    Debug,
    Command,
    Output,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Error,
        Category::Warning,
        Category::Success,
        Category::Info,
        Category::Debug,
        Category::Command,
        Category::Output,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Error => "error",
            Category::Warning => "warning",
            Category::Success => "success",
            Category::Info => "info",
            Category::Debug => "debug",
            Category::Command => "command",
            Category::Output => "output",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub severity: u8,
    pub tags: Vec<&'static str>,
}

struct CategoryRule {
    pattern: Regex,
    category: Category,
    severity: u8,
}

struct TagRule {
    pattern: Regex,
    tag: &'static str,
}

fn rule(pattern: &str) -> Regex {
    // Literal patterns only; the tests below compile every one of them.
    Regex::new(pattern)
        .unwrap_or_else(|error| panic!("invalid classifier pattern {pattern}: {error}"))
}

static CATEGORY_RULES: Lazy<Vec<CategoryRule>> = Lazy::new(|| {
    [
        (
            r"(?i)\b(fatal|critical|panic(ked)?|traceback|segmentation fault)\b",
            Category::Error,
            10,
        ),
        (
            r"(?i)\b(error|errors|exception|failed|failure|cannot|unable to|denied)\b",
            Category::Error,
            8,
        ),
        (
            r"(?i)\b(warn|warning|warnings|deprecated|deprecation)\b",
            Category::Warning,
            5,
        ),
        (r"(?i)^\s*\[?(info)\b", Category::Info, 3),
        (r"(?i)^\s*\[?(debug|trace|verbose)\b", Category::Debug, 1),
        (
            r"(?i)\b(success|successful|successfully|completed?|done|ready|finished|started)\b|running on",
            Category::Success,
            2,
        ),
        (r"(?i)\b(info|notice)\b", Category::Info, 3),
        (r"(?i)\b(debug|trace)\b", Category::Debug, 1),
        (r"^\s*(\$|>>>|>|#)\s+\S", Category::Command, 0),
    ]
    .into_iter()
    .map(|(pattern, category, severity)| CategoryRule {
        pattern: rule(pattern),
        category,
        severity,
    })
    .collect()
});

static TAG_RULES: Lazy<Vec<TagRule>> = Lazy::new(|| {
    [
        (
            r"(?i)\b(memory|vram|ram|oom|out of memory|[0-9.]+\s*(gb|mb|gib|mib))\b",
            "memory",
        ),
        (
            r"(?i)\b(https?://\S+|localhost|127\.0\.0\.1|0\.0\.0\.0|port|socket|connection|connected|api)\b",
            "network",
        ),
        (r"(?i)\b(loading|loaded|load)\b", "loading"),
        (
            r"(?i)\b(model|models|checkpoint|weights|safetensors|gguf|ggml|tokenizer)\b",
            "model",
        ),
        (r"(?i)\b(cuda|gpu|rocm|mps|cudnn|nvidia)\b", "gpu"),
        (r"(?i)(\b\d{1,3}%|\bit/s\b|\b\d+/\d+\b)", "progress"),
        (r"(?i)\b(audio|voice|pitch|sample rate|wav|mp3)\b", "audio"),
    ]
    .into_iter()
    .map(|(pattern, tag)| TagRule {
        pattern: rule(pattern),
        tag,
    })
    .collect()
});

/// Classifies one line of output. Embedded colour sequences are ignored.
pub fn classify(text: &str) -> Classification {
    let plain = strip_ansi(text);
    let (category, severity) = CATEGORY_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(&plain))
        .map(|rule| (rule.category, rule.severity))
        .unwrap_or((Category::Output, 0));
    let tags = TAG_RULES
        .iter()
        .filter(|rule| rule.pattern.is_match(&plain))
        .map(|rule| rule.tag)
        .collect();
    Classification {
        category,
        severity,
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, Category, TAG_RULES};

    #[test]
    fn error_lines_rank_above_warnings() {
        let result = classify("ERROR: disk full");
        assert_eq!(result.category, Category::Error);
        assert_eq!(result.severity, 8);

        let result = classify("Warning: error budget nearly spent");
        assert_eq!(result.category, Category::Error);
    }

    #[test]
    fn fatal_keywords_get_maximum_severity() {
        let result = classify("Traceback (most recent call last):");
        assert_eq!(result.category, Category::Error);
        assert_eq!(result.severity, 10);
    }

    #[test]
    fn level_prefixes_pick_info_and_debug() {
        assert_eq!(classify("INFO: booting").category, Category::Info);
        assert_eq!(classify("INFO: booting").severity, 3);
        assert_eq!(classify("[DEBUG] tick 42").category, Category::Debug);
        assert_eq!(classify("DEBUG: tick").severity, 1);
    }

    #[test]
    fn completion_words_are_success() {
        let result = classify("done");
        assert_eq!(result.category, Category::Success);
        assert_eq!(result.severity, 2);
        assert_eq!(
            classify("Running on local URL:  http://127.0.0.1:7860").category,
            Category::Success
        );
    }

    #[test]
    fn command_echo_is_detected() {
        let result = classify("$ python server.py --listen");
        assert_eq!(result.category, Category::Command);
        assert_eq!(result.severity, 0);
    }

    #[test]
    fn unmatched_lines_default_to_output() {
        let result = classify("the quick brown fox");
        assert_eq!(result.category, Category::Output);
        assert_eq!(result.severity, 0);
        assert!(result.tags.is_empty());
    }

    #[test]
    fn tags_are_collected_independently() {
        let result = classify("Loading model weights to CUDA, 6.2 GB free");
        assert!(result.tags.contains(&"loading"));
        assert!(result.tags.contains(&"model"));
        assert!(result.tags.contains(&"gpu"));
        assert!(result.tags.contains(&"memory"));
        assert!(!result.tags.contains(&"audio"));
    }

    #[test]
    fn ansi_sequences_do_not_hide_keywords() {
        let result = classify("\u{1b}[31mERROR\u{1b}[0m: connection refused");
        assert_eq!(result.category, Category::Error);
        assert!(result.tags.contains(&"network"));
    }

    #[test]
    fn classification_is_deterministic() {
        let inputs = [
            "ERROR: disk full",
            "42/100 [00:03<00:05, 12.1it/s]",
            "",
            "WARNING: deprecated flag --gpu",
            "plain text",
        ];
        for input in inputs {
            let first = classify(input);
            for _ in 0..5 {
                assert_eq!(classify(input), first);
            }
        }
    }

    #[test]
    fn tag_rules_name_each_tag_once() {
        let mut tags = TAG_RULES.iter().map(|rule| rule.tag).collect::<Vec<&str>>();
        let total = tags.len();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), total);
    }
}

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::nlu::corpus::EntityCorpus;
use crate::nlu::NluError;

pub const AMOUNT_LABEL: &str = "AMOUNT";

/// A labelled span of user text.
///
/// `start` and `end` are UTF-8 byte offsets into the original input, forming
/// the half-open range `start..end`. They are serialized as-is, so clients
/// working in characters or UTF-16 units must convert before slicing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub label: String,
    pub value: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug)]
struct CompiledPattern {
    label: String,
    regex: Regex,
}

/// Regex-then-keyword entity extractor.
///
/// Regex patterns claim spans first, in corpus order; keyword patterns only
/// fill spans nobody has claimed yet. Accepted entities never overlap.
#[derive(Clone, Debug)]
pub struct EntityExtractor {
    regex_patterns: Vec<CompiledPattern>,
    keyword_patterns: Vec<CompiledPattern>,
}

impl EntityExtractor {
    pub fn from_corpus(corpus: &EntityCorpus) -> Result<Self, NluError> {
        let regex_patterns = corpus
            .regex_patterns
            .iter()
            .map(|spec| {
                let regex = build_regex(&spec.label, &spec.pattern, &spec.flags)?;
                Ok(CompiledPattern { label: spec.label.clone(), regex })
            })
            .collect::<Result<Vec<_>, NluError>>()?;

        let keyword_patterns = corpus
            .patterns
            .iter()
            .map(|spec| {
                let words = spec
                    .pattern
                    .iter()
                    .map(|token| token.lower.trim())
                    .filter(|token| !token.is_empty())
                    .map(regex::escape)
                    .collect::<Vec<_>>();
                if words.is_empty() {
                    return Err(NluError::InvalidCorpus(format!(
                        "keyword pattern `{}` has no tokens",
                        spec.label
                    )));
                }
                let source = format!(r"\b{}\b", words.join(r"\s+"));
                let regex = build_regex(&spec.label, &source, "i")?;
                Ok(CompiledPattern { label: spec.label.clone(), regex })
            })
            .collect::<Result<Vec<_>, NluError>>()?;

        Ok(Self { regex_patterns, keyword_patterns })
    }

    pub fn extract(&self, text: &str) -> Vec<Entity> {
        let mut reserved: Vec<(usize, usize)> = Vec::new();
        let mut entities = Vec::new();

        for pattern in &self.regex_patterns {
            for captures in pattern.regex.captures_iter(text) {
                let Some(whole) = captures.get(0) else { continue };
                if !reserve(&mut reserved, whole.start(), whole.end()) {
                    continue;
                }

                let raw = captures.get(1).map_or(whole.as_str(), |group| group.as_str());
                let value = if pattern.label == AMOUNT_LABEL {
                    normalize_amount(raw)
                } else {
                    raw.to_owned()
                };

                entities.push(Entity {
                    label: pattern.label.clone(),
                    value,
                    start: whole.start(),
                    end: whole.end(),
                });
            }
        }

        for pattern in &self.keyword_patterns {
            for found in pattern.regex.find_iter(text) {
                if reserve(&mut reserved, found.start(), found.end()) {
                    entities.push(Entity {
                        label: pattern.label.clone(),
                        value: found.as_str().to_owned(),
                        start: found.start(),
                        end: found.end(),
                    });
                }
            }
        }

        entities
    }
}

fn build_regex(label: &str, pattern: &str, flags: &str) -> Result<Regex, NluError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.trim().chars() {
        match flag.to_ascii_lowercase() {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(NluError::UnsupportedFlag { label: label.to_owned(), flag: other })
            }
        };
    }
    builder
        .build()
        .map_err(|source| NluError::InvalidPattern { label: label.to_owned(), source })
}

fn reserve(reserved: &mut Vec<(usize, usize)>, start: usize, end: usize) -> bool {
    let overlaps =
        reserved.iter().any(|&(taken_start, taken_end)| start < taken_end && taken_start < end);
    if overlaps {
        return false;
    }
    reserved.push((start, end));
    true
}

/// `"12,500"` becomes `"12500"`, `"5k"` becomes `"5000"`, `"99.90"` becomes `"99"`.
fn normalize_amount(raw: &str) -> String {
    let cleaned = raw.replace(',', "");
    let cleaned = cleaned.trim();
    let (number, multiplier) = match cleaned.strip_suffix(&['k', 'K'][..]) {
        Some(number) => (number, 1000.0),
        None => (cleaned, 1.0),
    };

    match number.parse::<f64>() {
        Ok(value) if (value * multiplier).is_finite() => {
            format!("{}", (value * multiplier).trunc() as i64)
        }
        _ => cleaned.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_amount, Entity, EntityExtractor};
    use crate::nlu::corpus::{EntityCorpus, KeywordPatternSpec, RegexPatternSpec, TokenMatcher};
    use crate::nlu::NluError;

    fn builtin() -> EntityExtractor {
        let corpus = EntityCorpus::builtin().expect("builtin entity corpus");
        EntityExtractor::from_corpus(&corpus).expect("compile builtin patterns")
    }

    fn find<'a>(entities: &'a [Entity], label: &str) -> Option<&'a Entity> {
        entities.iter().find(|entity| entity.label == label)
    }

    fn assert_disjoint(entities: &[Entity]) {
        for (index, left) in entities.iter().enumerate() {
            for right in &entities[index + 1..] {
                assert!(
                    left.end <= right.start || right.end <= left.start,
                    "{left:?} overlaps {right:?}"
                );
            }
        }
    }

    #[test]
    fn shorthand_amount_is_expanded() {
        let entities = builtin().extract("Transfer 5k from my savings");

        let amount = find(&entities, "AMOUNT").expect("amount entity");
        assert_eq!(amount.value, "5000");
        assert_eq!((amount.start, amount.end), (9, 11));

        let account_type = find(&entities, "ACCOUNT_TYPE").expect("account type entity");
        assert_eq!(account_type.value, "savings");
        assert_disjoint(&entities);
    }

    #[test]
    fn structured_patterns_claim_spans_before_amounts() {
        let entities = builtin().extract("Move funds to account ending 4321");

        let ending = find(&entities, "ACCOUNT_ENDING").expect("account ending entity");
        assert_eq!(ending.value, "4321");
        assert!(find(&entities, "AMOUNT").is_none(), "digits already claimed: {entities:?}");
    }

    #[test]
    fn account_number_and_amount_coexist() {
        let entities = builtin().extract("Pay 4,500 to account 99887766");

        assert_eq!(find(&entities, "AMOUNT").map(|entity| entity.value.as_str()), Some("4500"));
        assert_eq!(
            find(&entities, "ACCOUNT_NUMBER").map(|entity| entity.value.as_str()),
            Some("99887766")
        );
        assert_eq!(entities.iter().filter(|entity| entity.label == "AMOUNT").count(), 1);
        assert_disjoint(&entities);
    }

    #[test]
    fn keywords_keep_original_case() {
        let entities = builtin().extract("Where is the nearest ATM?");

        let service = find(&entities, "SERVICE").expect("service entity");
        assert_eq!(service.value, "ATM");
        assert_eq!(&"Where is the nearest ATM?"[service.start..service.end], "ATM");
    }

    #[test]
    fn spans_are_byte_offsets_after_multibyte_text() {
        let text = "Meera’s savings";
        let entities = builtin().extract(text);

        let account_type = find(&entities, "ACCOUNT_TYPE").expect("account type entity");
        assert_eq!((account_type.start, account_type.end), (10, 17));
        assert_eq!(&text[account_type.start..account_type.end], "savings");
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let entities = builtin().extract("my currentaccount and creditworthiness");
        assert!(entities.is_empty(), "unexpected entities: {entities:?}");
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(builtin().extract("").is_empty());
    }

    #[test]
    fn overlapping_regex_matches_are_dropped() {
        let corpus = EntityCorpus {
            regex_patterns: vec![
                RegexPatternSpec {
                    label: "CARD".to_owned(),
                    pattern: r"card\s+(\d+)".to_owned(),
                    flags: String::new(),
                },
                RegexPatternSpec {
                    label: "NUMBER".to_owned(),
                    pattern: r"\d+".to_owned(),
                    flags: String::new(),
                },
            ],
            patterns: vec![KeywordPatternSpec {
                label: "KIND".to_owned(),
                pattern: vec![TokenMatcher { lower: "card".to_owned() }],
            }],
        };
        let extractor = EntityExtractor::from_corpus(&corpus).expect("compile");

        let entities = extractor.extract("card 1234 then 99");

        let labels: Vec<(&str, &str)> =
            entities.iter().map(|entity| (entity.label.as_str(), entity.value.as_str())).collect();
        assert_eq!(labels, vec![("CARD", "1234"), ("NUMBER", "99")]);
        assert_disjoint(&entities);
    }

    #[test]
    fn malformed_patterns_fail_at_load() {
        let corpus = EntityCorpus {
            regex_patterns: vec![RegexPatternSpec {
                label: "BROKEN".to_owned(),
                pattern: "(unclosed".to_owned(),
                flags: String::new(),
            }],
            patterns: Vec::new(),
        };
        assert!(matches!(
            EntityExtractor::from_corpus(&corpus),
            Err(NluError::InvalidPattern { ref label, .. }) if label == "BROKEN"
        ));

        let corpus = EntityCorpus {
            regex_patterns: vec![RegexPatternSpec {
                label: "FLAGGED".to_owned(),
                pattern: "x".to_owned(),
                flags: "q".to_owned(),
            }],
            patterns: Vec::new(),
        };
        assert!(matches!(
            EntityExtractor::from_corpus(&corpus),
            Err(NluError::UnsupportedFlag { flag: 'q', .. })
        ));
    }

    #[test]
    fn amount_normalization_rules() {
        assert_eq!(normalize_amount("12,500"), "12500");
        assert_eq!(normalize_amount("2.5K"), "2500");
        assert_eq!(normalize_amount("99.90"), "99");
        assert_eq!(normalize_amount("750"), "750");
    }
}

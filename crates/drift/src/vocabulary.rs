use jobmatch_vector_store::JobPosting;
use serde_json::Value;
use std::collections::BTreeMap;

/// Fixed skill-term vocabulary matched against posting metadata.
#[derive(Debug, Clone)]
pub struct SkillVocabulary {
    terms: Vec<(String, Vec<String>)>,
    fields: Vec<String>,
}

impl SkillVocabulary {
    pub fn new(terms: &[String], fields: &[String]) -> Self {
        let mut seen = std::collections::HashSet::new();
        let terms = terms
            .iter()
            .map(|term| term.trim().to_lowercase())
            .filter(|term| !term.is_empty() && seen.insert(term.clone()))
            .map(|term| {
                let tokens = tokenize(&term);
                (term, tokens)
            })
            .filter(|(_, tokens)| !tokens.is_empty())
            .collect();
        Self {
            terms,
            fields: fields.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Share of `postings` mentioning each term. Every vocabulary term appears in the map.
    pub fn frequencies<'a>(&self, postings: impl IntoIterator<Item = &'a JobPosting>) -> BTreeMap<String, f32> {
        let mut counts = vec![0usize; self.terms.len()];
        let mut total = 0usize;
        for posting in postings {
            total += 1;
            let tokens = tokenize(&self.posting_text(posting));
            for (slot, (_, term_tokens)) in counts.iter_mut().zip(&self.terms) {
                if contains_sequence(&tokens, term_tokens) {
                    *slot += 1;
                }
            }
        }

        self.terms
            .iter()
            .zip(counts)
            .map(|((term, _), count)| {
                #[allow(clippy::cast_precision_loss)]
                let share = if total == 0 {
                    0.0
                } else {
                    count as f32 / total as f32
                };
                (term.clone(), share)
            })
            .collect()
    }

    fn posting_text(&self, posting: &JobPosting) -> String {
        let mut text = String::new();
        for field in &self.fields {
            match posting.metadata.get(field) {
                Some(Value::String(s)) => {
                    text.push_str(s);
                    text.push(' ');
                }
                Some(Value::Array(items)) => {
                    for item in items.iter().filter_map(Value::as_str) {
                        text.push_str(item);
                        text.push(' ');
                    }
                }
                _ => {}
            }
        }
        text
    }
}

/// Lowercased word tokens; `+`, `#` and `.` stay inside words so `c++` and `c#` survive.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '#' | '.')))
        .map(|token| token.trim_matches('.').to_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|window| window == needle)
}

/// Align two frequency maps over the union of their terms.
pub fn aligned(a: &BTreeMap<String, f32>, b: &BTreeMap<String, f32>) -> (Vec<f32>, Vec<f32>) {
    let mut terms: Vec<&String> = a.keys().chain(b.keys()).collect();
    terms.sort();
    terms.dedup();
    terms
        .into_iter()
        .map(|term| {
            (
                a.get(term).copied().unwrap_or(0.0),
                b.get(term).copied().unwrap_or(0.0),
            )
        })
        .unzip()
}

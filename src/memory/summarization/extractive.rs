use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use super::{instructions, SummarizationError, SummarizationProviderTrait};

const MIN_TERM_LEN: usize = 4;

/// Offline summarizer built on sentence extraction.
///
/// - summarize: first sentence of every input line, deduplicated
/// - extract patterns: terms recurring across lines, most frequent first
/// - generalize: the extract restricted to sentences that mention a recurring term
///
/// Pattern and generalization passes fall back to the plain extract when no
/// term recurs.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_sentences: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self { max_sentences: 8 }
    }
}

impl ExtractiveSummarizer {
    pub fn new(max_sentences: usize) -> Self {
        Self { max_sentences: max_sentences.max(1) }
    }

    fn first_sentence(line: &str) -> &str {
        match line.find(|c: char| c == '.' || c == '!' || c == '?') {
            Some(end) => &line[..=end],
            None => line,
        }
    }

    fn terms(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|word| word.chars().count() >= MIN_TERM_LEN)
            .map(str::to_lowercase)
            .collect()
    }

    fn extract<'a>(&self, lines: &[&'a str]) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        lines
            .iter()
            .map(|line| Self::first_sentence(line))
            .filter(|sentence| seen.insert(sentence.to_lowercase()))
            .take(self.max_sentences)
            .collect()
    }

    /// Terms found in at least two lines with their line counts, most frequent first.
    fn recurring_terms(lines: &[&str]) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for line in lines {
            for term in Self::terms(line) {
                *counts.entry(term).or_insert(0) += 1;
            }
        }
        let mut recurring: Vec<(String, usize)> = counts.into_iter().filter(|(_, n)| *n >= 2).collect();
        recurring.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        recurring
    }

    fn patterns(&self, lines: &[&str]) -> Option<String> {
        let recurring = Self::recurring_terms(lines);
        if recurring.is_empty() {
            return None;
        }
        let listed: Vec<String> = recurring
            .into_iter()
            .take(self.max_sentences)
            .map(|(term, n)| format!("{} ({} memories)", term, n))
            .collect();
        Some(listed.join("\n"))
    }

    fn generalize(&self, lines: &[&str]) -> Option<String> {
        let recurring: HashSet<String> = Self::recurring_terms(lines).into_iter().map(|(term, _)| term).collect();
        if recurring.is_empty() {
            return None;
        }
        let mut seen = HashSet::new();
        let sentences: Vec<&str> = lines
            .iter()
            .map(|line| Self::first_sentence(line))
            .filter(|sentence| !Self::terms(sentence).is_disjoint(&recurring))
            .filter(|sentence| seen.insert(sentence.to_lowercase()))
            .take(self.max_sentences)
            .collect();
        if sentences.is_empty() {
            None
        } else {
            Some(sentences.join(" "))
        }
    }
}

#[async_trait]
impl SummarizationProviderTrait for ExtractiveSummarizer {
    async fn run(&self, instruction: &str, content: &str) -> Result<String, SummarizationError> {
        let lines: Vec<&str> = content.lines().map(str::trim).filter(|line| !line.is_empty()).collect();
        if lines.is_empty() {
            return Err(SummarizationError::EmptyResponse);
        }

        let derived = match instruction {
            instructions::EXTRACT_PATTERNS => self.patterns(&lines),
            instructions::GENERALIZE => self.generalize(&lines),
            _ => None,
        };
        Ok(derived.unwrap_or_else(|| self.extract(&lines).join(" ")))
    }
}

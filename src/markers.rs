use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::Format;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Start(Format),
    End(Format),
}

/// Recognizes `{{NAME_START}}` / `{{NAME_END}}` tokens for a set of formats.
pub struct MarkerLexer {
    pattern: Regex,
    tokens: HashMap<String, Marker>,
}

static STANDARD: OnceLock<MarkerLexer> = OnceLock::new();

/// Lexer for every built-in format, compiled once and shared read-only.
pub fn lexer() -> &'static MarkerLexer {
    STANDARD.get_or_init(|| {
        MarkerLexer::new(&Format::ALL).expect("escaped literal alternation always compiles")
    })
}

impl MarkerLexer {
    pub fn new(formats: &[Format]) -> Result<Self, regex::Error> {
        let mut tokens = HashMap::new();
        for &format in formats {
            tokens.insert(format.start_token(), Marker::Start(format));
            tokens.insert(format.end_token(), Marker::End(format));
        }
        let mut literals: Vec<&str> = tokens.keys().map(String::as_str).collect();
        // Longest first so a token that prefixes another can never shadow it.
        literals.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        let alternation = literals
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Self {
            pattern: Regex::new(&alternation)?,
            tokens,
        })
    }

    pub fn contains_marker(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Split into alternating plain and marker pieces. Empty plain pieces are
    /// kept so that marker pieces always sit at odd indices.
    pub fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut pieces = Vec::new();
        let mut last = 0;
        for m in self.pattern.find_iter(text) {
            pieces.push(&text[last..m.start()]);
            pieces.push(m.as_str());
            last = m.end();
        }
        pieces.push(&text[last..]);
        pieces
    }

    pub fn classify(&self, piece: &str) -> Option<Marker> {
        self.tokens.get(piece).copied()
    }
}

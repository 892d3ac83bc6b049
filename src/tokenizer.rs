//! Lexical token extraction from test-case sources
//!
//! Feeds the MinHash signatures of the LSH strategy. Richer AST-level
//! tokenization is an external collaborator; the lexical pass here keeps the
//! three token classes that matter for near-duplicate detection in C sources
//! (identifiers, string literals, comments) and does a shell-aware word
//! split for scripts.
//!
//! Derivation failures substitute an empty token list; a strategy run never
//! aborts because one test would not tokenize.

use regex::Regex;

use crate::record::TestCaseType;

pub trait Tokenizer {
    fn tokens(&self, contents: &str, case_type: TestCaseType) -> Vec<String>;
}

/// Regex-based tokenizer for C and shell sources.
#[derive(Debug)]
pub struct LexicalTokenizer {
    c_token_re: Regex,
}

impl LexicalTokenizer {
    pub fn new() -> Self {
        // Order matters: comments and string literals before identifiers so
        // their inner words are not re-tokenized.
        let c_token_re = Regex::new(
            r#"(?s)/\*.*?\*/|//[^\n]*|"(?:\\.|[^"\\])*"|[A-Za-z_][A-Za-z0-9_]*"#,
        )
        .expect("static regex");
        LexicalTokenizer { c_token_re }
    }

    fn tokens_c(&self, contents: &str) -> Vec<String> {
        self.c_token_re
            .find_iter(contents)
            .map(|m| m.as_str().to_lowercase())
            .collect()
    }

    fn tokens_sh(&self, contents: &str) -> Vec<String> {
        contents
            .split_whitespace()
            .map(|w| w.to_string())
            .collect()
    }
}

impl Default for LexicalTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for LexicalTokenizer {
    fn tokens(&self, contents: &str, case_type: TestCaseType) -> Vec<String> {
        match case_type {
            TestCaseType::C => self.tokens_c(contents),
            TestCaseType::Sh => self.tokens_sh(contents),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_tokens_keep_identifiers_literals_comments() {
        let t = LexicalTokenizer::new();
        let src = "int main(void) { /* Setup */ char *s = \"Hello\"; return OPEN01; }";
        let tokens = t.tokens(src, TestCaseType::C);
        assert!(tokens.contains(&"main".to_string()));
        assert!(tokens.contains(&"/* setup */".to_string()));
        assert!(tokens.contains(&"\"hello\"".to_string()));
        assert!(tokens.contains(&"open01".to_string()));
        // Punctuation is not a token.
        assert!(!tokens.iter().any(|t| t == "{"));
    }

    #[test]
    fn test_sh_tokens_word_split() {
        let t = LexicalTokenizer::new();
        let tokens = t.tokens("ip link add ${DEV} type veth", TestCaseType::Sh);
        assert_eq!(tokens.len(), 6);
        assert!(tokens.contains(&"${DEV}".to_string()));
    }

    #[test]
    fn test_unknown_type_is_empty() {
        let t = LexicalTokenizer::new();
        assert!(t.tokens("anything", TestCaseType::Unknown).is_empty());
    }
}

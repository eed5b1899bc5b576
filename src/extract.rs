//! The Extractor (spec.md §4.3): apply one XPath + one regex-with-group to a
//! parsed HTML document.
//!
//! HTML parsing goes through `libxml`'s HTML parser, which auto-detects the
//! document's declared/sniffed charset and transcodes to UTF-8 before the
//! DOM is built — satisfying the charset-transcoding requirement without a
//! separate decoding pass.

use libxml::parser::Parser;
use libxml::xpath::Context as XPathContext;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid XPath expression: {0}")]
    InvalidXPath(String),
    #[error("XPath produced no match")]
    XPathNoMatch,
    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("regex did not match")]
    RegexNoMatch,
    #[error("failed to parse HTML document: {0}")]
    InvalidDocument(String),
}

/// Evaluates `xpath` against the parsed `html`, then applies `regex` to the
/// resulting string (spec.md §4.3 rules).
pub struct Extractor;

impl Extractor {
    pub fn new() -> Self {
        Self
    }

    /// Apply `xpath` then `regex` to a raw HTML document.
    pub fn apply(&self, html: &str, xpath: &str, regex: &str) -> Result<String, ExtractError> {
        let parser = Parser::default_html();
        let document = parser
            .parse_string(html)
            .map_err(|e| ExtractError::InvalidDocument(format!("{e:?}")))?;

        let xpath_value = Self::eval_xpath(&document, xpath)?;
        Self::apply_regex(&xpath_value, regex)
    }

    /// Apply `xpath` then `regex`, treating the xpath evaluation target as a
    /// plain string rather than re-parsing a document — used for the
    /// "derive ref from the start URL itself" policy (spec.md §9 open
    /// question resolution), where there is no document to parse.
    pub fn apply_regex_to_str(s: &str, regex: &str) -> Result<String, ExtractError> {
        Self::apply_regex(s, regex)
    }

    fn eval_xpath(document: &libxml::tree::Document, xpath: &str) -> Result<String, ExtractError> {
        let context = XPathContext::new(document)
            .map_err(|_| ExtractError::InvalidXPath(xpath.to_string()))?;

        let result = context
            .findvalue(xpath, None)
            .or_else(|_| {
                context
                    .findnodes(xpath, None)
                    .map(|nodes| {
                        nodes
                            .first()
                            .map(|n| n.get_content())
                            .unwrap_or_default()
                    })
                    .map_err(|_| ())
            })
            .map_err(|_| ExtractError::InvalidXPath(xpath.to_string()))?;

        if result.trim().is_empty() {
            return Err(ExtractError::XPathNoMatch);
        }

        Ok(result)
    }

    fn apply_regex(input: &str, pattern: &str) -> Result<String, ExtractError> {
        let re = Regex::new(pattern)?;
        let caps = re.captures(input).ok_or(ExtractError::RegexNoMatch)?;

        if caps.len() > 1 {
            // Group 1 exists — return it trimmed (spec.md §4.3).
            Ok(caps
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .ok_or(ExtractError::RegexNoMatch)?)
        } else {
            Ok(caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default())
        }
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

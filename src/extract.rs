//! Extraction cascade over raw model responses
//!
//! A response may carry prose, markdown fences, custom delimiter tags, a
//! bare document, or nothing useful at all. Strategies run in fixed
//! priority order, most specific first; later tiers are strictly more
//! permissive and would over-match if tried early. Whichever tier wins, a
//! second cleanup pass narrows the candidate to an `<html>`-rooted span or
//! rejects it.

use crate::error::ExtractError;
use crate::report::Report;
use crate::util::preview;
use regex::Regex;

/// Delimiters the prompt layer instructs the model to emit.
pub const CODE_START: &str = "[CODE_START]";
pub const CODE_END: &str = "[CODE_END]";

/// The recovered document text. Non-empty after trimming and rooted in an
/// `<html>` element by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlPayload(String);

impl HtmlPayload {
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for HtmlPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One fenced-tier sub-variant: a stable id for the report plus the
/// compiled expression. Capture group 1 is always the fenced body.
struct FenceVariant {
    id: &'static str,
    re: Regex,
}

/// Ordered pattern-matching strategies for locating the document.
pub struct Extractor {
    fence_variants: Vec<FenceVariant>,
    doctype_document: Regex,
    html_document: Regex,
    html_open: Regex,
    html_close: Regex,
    html_any_tag: Regex,
    delimited_block: Regex,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        // Sub-variant order matters: tighter shapes first, permissive ones
        // last. Group 1 is the fenced body in every variant.
        let fence_variants = vec![
            fence_variant(
                "fence markers tight",
                r"(?is)```html\s*\[CODE_START\](.*?)\[CODE_END\]\s*```",
            ),
            fence_variant(
                "fence markers loose",
                r"(?is)```(?:html)?\s*\[CODE_START\](.*?)\[CODE_END\]\s*```",
            ),
            fence_variant(
                "fence doctype",
                r"(?is)```(?:html)?\s*(<!DOCTYPE html>.*?</html>)\s*```",
            ),
            fence_variant("fence html body", r"(?is)```html\s*(.*?)\s*```"),
            fence_variant(
                "generic fence doctype",
                r"(?is)```\s*(<!DOCTYPE html>.*?</html>)\s*```",
            ),
            fence_variant(
                "generic fence markers",
                r"(?is)```(?:[a-zA-Z0-9]*)\s*(.*?\[CODE_START\].*?\[CODE_END\].*?)\s*```",
            ),
            fence_variant("fence html any", r"(?is)```html\s*([\s\S]*?)\s*```"),
        ];

        Self {
            fence_variants,
            doctype_document: compiled(r"(?is)<!DOCTYPE html>.*?</html>"),
            html_document: compiled(r"(?is)<html[^>]*>.*?</html>"),
            html_open: compiled(r"(?i)<html[^>]*>"),
            html_close: compiled(r"(?i)</html>"),
            html_any_tag: compiled(r"(?i)</?html[^>]*>"),
            delimited_block: compiled(r"(?s)\[CODE_START\].*?\[CODE_END\]"),
        }
    }

    /// Run the cascade and the cleanup pass, recording every decision.
    pub fn extract(&self, raw: &str, report: &mut Report) -> Result<HtmlPayload, ExtractError> {
        let candidate = self.select_candidate(raw, report);
        self.clean_candidate(&candidate, report)
    }

    /// The text strictly between the first `[CODE_START]`/`[CODE_END]`
    /// pair, trimmed, when the response carries one in order.
    pub fn delimited_code<'a>(&self, raw: &'a str) -> Option<&'a str> {
        between_markers(raw).map(str::trim)
    }

    /// The response with every delimited code block removed: the prose the
    /// caller shows to the user while the code goes through the apply path.
    pub fn commentary(&self, raw: &str) -> String {
        self.delimited_block.replace_all(raw, "").trim().to_string()
    }

    /// Tiers 1-4. Always yields a candidate; tier 4 is a deliberate
    /// best-we-can-do policy, not a failure.
    fn select_candidate(&self, raw: &str, report: &mut Report) -> String {
        // Tier 1: markdown fence, most specific sub-variant first.
        for variant in &self.fence_variants {
            let Some(caps) = variant.re.captures(raw) else {
                continue;
            };
            let body = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim();
            report.add_step(
                "fence scan",
                true,
                format!("{} matched, body length {}", variant.id, body.chars().count()),
            );

            // A fenced body may still carry the custom markers; narrow to
            // the text strictly between them when both appear in order.
            if body.contains(CODE_START) && body.contains(CODE_END) {
                if let Some(inner) = between_markers(body) {
                    let inner = inner.trim();
                    report.add_step(
                        "delimiter narrowing",
                        true,
                        format!("payload length {}", inner.chars().count()),
                    );
                    return inner.to_string();
                }
                report.add_step(
                    "delimiter narrowing",
                    false,
                    "delimiters out of order, keeping fenced body",
                );
            }
            return body.to_string();
        }
        report.add_step("fence scan", false, "no fence sub-variant matched");

        // Tier 2: bare delimiters directly in the response.
        if let Some(inner) = between_markers(raw) {
            let inner = inner.trim();
            report.add_step(
                "bare delimiters",
                true,
                format!("payload length {}", inner.chars().count()),
            );
            return inner.to_string();
        }
        report.add_step("bare delimiters", false, "delimiters absent or out of order");

        // Tier 3: a full document somewhere in the raw text.
        if let Some(m) = self.doctype_document.find(raw) {
            let doc = m.as_str().trim();
            report.add_step(
                "document scan",
                true,
                format!("doctype span, length {}", doc.chars().count()),
            );
            return doc.to_string();
        }
        report.add_step("document scan", false, "no doctype-to-</html> span");

        // Tier 4: the whole trimmed response.
        let whole = raw.trim();
        report.add_step(
            "full response fallback",
            true,
            format!("using entire response, length {}", whole.chars().count()),
        );
        whole.to_string()
    }

    /// Cleanup pass. Runs on every candidate regardless of which tier
    /// produced it; an opaque blob that is not HTML-shaped is rejected here.
    fn clean_candidate(
        &self,
        candidate: &str,
        report: &mut Report,
    ) -> Result<HtmlPayload, ExtractError> {
        let stripped = candidate.replace(CODE_START, "").replace(CODE_END, "");
        let stripped = stripped.trim();
        report.add_step(
            "strip delimiters",
            true,
            format!("candidate length {}", stripped.chars().count()),
        );

        let Some(document) = self.locate_document(stripped, report) else {
            report.add_step("validate document", false, "no html-rooted span in candidate");
            return Err(ExtractError::NoHtmlFound);
        };

        let document = document.trim();
        if document.is_empty() {
            report.add_step("validate document", false, "document empty after trimming");
            return Err(ExtractError::EmptyAfterCleanup);
        }
        report.add_step(
            "validate document",
            true,
            format!("document length {}, head: {}", document.chars().count(), preview(document, 60)),
        );
        Ok(HtmlPayload(document.to_string()))
    }

    fn locate_document(&self, text: &str, report: &mut Report) -> Option<String> {
        if let Some(m) = self.doctype_document.find(text) {
            report.add_step("doctype span", true, format!("length {}", m.as_str().chars().count()));
            return Some(m.as_str().to_string());
        }
        report.add_step("doctype span", false, "not found");

        if let Some(m) = self.html_document.find(text) {
            report.add_step("html span", true, format!("length {}", m.as_str().chars().count()));
            return Some(m.as_str().to_string());
        }
        report.add_step("html span", false, "not found");

        if let Some(doc) = line_scan(text) {
            report.add_step("line scan", true, format!("length {}", doc.chars().count()));
            return Some(doc);
        }
        report.add_step("line scan", false, "no opening line found");

        if let Some(doc) = self.aggressive_scan(text) {
            report.add_step("aggressive scan", true, format!("length {}", doc.chars().count()));
            return Some(doc);
        }
        report.add_step("aggressive scan", false, "no html tag in candidate");
        None
    }

    /// Everything from the first `<html…>` occurrence to the end of the
    /// last `</html>`, or to end of text when no closing tag exists.
    fn aggressive_scan(&self, text: &str) -> Option<String> {
        if !self.html_any_tag.is_match(text) {
            return None;
        }
        let open = self.html_open.find(text)?;
        match self.html_close.find_iter(text).last() {
            Some(close) if close.end() > open.start() => {
                Some(text[open.start()..close.end()].to_string())
            }
            _ => Some(text[open.start()..].to_string()),
        }
    }
}

fn fence_variant(id: &'static str, pattern: &str) -> FenceVariant {
    FenceVariant {
        id,
        re: compiled(pattern),
    }
}

fn compiled(pattern: &str) -> Regex {
    // Patterns are compile-time literals; a failure here is a programming
    // error caught by the unit tests below.
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid pattern {pattern:?}: {err}"))
}

/// Substring strictly between the first `[CODE_START]` and the first
/// `[CODE_END]`, when both are present in order.
fn between_markers(text: &str) -> Option<&str> {
    let start = text.find(CODE_START)?;
    let end = text.find(CODE_END)?;
    if start < end {
        Some(&text[start + CODE_START.len()..end])
    } else {
        None
    }
}

/// Accumulate lines from the first one containing a doctype or opening
/// html tag through the first one containing a closing html tag.
fn line_scan(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    if !lower.contains("<html") && !lower.contains("<!doctype") {
        return None;
    }

    let mut collected: Vec<&str> = Vec::new();
    let mut in_document = false;
    for line in text.lines() {
        let line_lower = line.to_lowercase();
        if !in_document {
            if line_lower.contains("<!doctype html>") || line_lower.contains("<html") {
                in_document = true;
                collected.push(line);
            }
        } else {
            collected.push(line);
            if line_lower.contains("</html>") {
                break;
            }
        }
    }

    if collected.is_empty() {
        None
    } else {
        Some(collected.join("\n").trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const DOC: &str = "<!DOCTYPE html><html><body>Hi</body></html>";

    fn run(raw: &str) -> Result<HtmlPayload, ExtractError> {
        let mut report = Report::begin(Path::new("page.html"), raw.chars().count(), true);
        Extractor::new().extract(raw, &mut report)
    }

    #[test]
    fn test_fence_markers_tight() {
        let raw = format!("Here is your update:\n```html\n[CODE_START]{DOC}[CODE_END]\n```");
        assert_eq!(run(&raw).unwrap().as_str(), DOC);
    }

    #[test]
    fn test_fence_markers_loose_without_language_tag() {
        let raw = format!("```\n[CODE_START]\n{DOC}\n[CODE_END]\n```");
        assert_eq!(run(&raw).unwrap().as_str(), DOC);
    }

    #[test]
    fn test_fence_doctype_without_markers() {
        let raw = format!("Some prose.\n```html\n{DOC}\n```\nMore prose.");
        assert_eq!(run(&raw).unwrap().as_str(), DOC);
    }

    #[test]
    fn test_generic_fence_doctype() {
        let raw = format!("```\n{DOC}\n```");
        assert_eq!(run(&raw).unwrap().as_str(), DOC);
    }

    #[test]
    fn test_bare_markers_without_fence() {
        let raw = format!("Explanation first.\n[CODE_START]\n{DOC}\n[CODE_END]\nBye.");
        assert_eq!(run(&raw).unwrap().as_str(), DOC);
    }

    #[test]
    fn test_bare_document_scan() {
        let raw = format!("The page follows. {DOC} Hope that helps.");
        assert_eq!(run(&raw).unwrap().as_str(), DOC);
    }

    #[test]
    fn test_prose_only_fails_with_no_html() {
        let err = run("I cannot help with that.").unwrap_err();
        assert!(matches!(err, ExtractError::NoHtmlFound));
    }

    #[test]
    fn test_markers_out_of_order_fall_through() {
        let err = run("[CODE_END] nothing here [CODE_START]").unwrap_err();
        assert!(matches!(err, ExtractError::NoHtmlFound));
    }

    #[test]
    fn test_cleanup_narrows_fenced_body_with_prose_around_document() {
        let raw = format!("```html\nintro comment\n{DOC}\ntrailing note\n```");
        assert_eq!(run(&raw).unwrap().as_str(), DOC);
    }

    #[test]
    fn test_html_without_doctype() {
        let raw = "[CODE_START]<html lang=\"en\"><body>x</body></html>[CODE_END]";
        assert_eq!(run(raw).unwrap().as_str(), "<html lang=\"en\"><body>x</body></html>");
    }

    #[test]
    fn test_uppercase_html_tags() {
        let raw = "<HTML><BODY>loud</BODY></HTML>";
        assert_eq!(run(raw).unwrap().as_str(), raw);
    }

    #[test]
    fn test_line_scan_recovers_truncated_document() {
        // No closing tag, so neither bounded span matches; the line scan
        // collects from the opening line to end of text.
        let raw = "noise\n<html><body>truncated";
        assert_eq!(run(raw).unwrap().as_str(), "<html><body>truncated");
    }

    #[test]
    fn test_multiline_document_span() {
        let raw = "notes\n<!DOCTYPE html>\n<html>\n<body>ok</body>\n</html>\nafter";
        let payload = run(raw).unwrap();
        assert!(payload.as_str().starts_with("<!DOCTYPE html>"));
        assert!(payload.as_str().ends_with("</html>"));
    }

    #[test]
    fn test_first_document_wins_when_two_present() {
        let raw = "<!DOCTYPE html><html><body>A</body></html> and <!DOCTYPE html><html><body>B</body></html>";
        assert_eq!(
            run(raw).unwrap().as_str(),
            "<!DOCTYPE html><html><body>A</body></html>"
        );
    }

    #[test]
    fn test_every_tier_attempt_is_recorded() {
        let mut report = Report::begin(Path::new("page.html"), 0, true);
        let _ = Extractor::new().extract("no markup at all", &mut report);
        let names: Vec<&str> = report.steps.iter().map(|s| s.step_name.as_str()).collect();
        assert!(names.contains(&"fence scan"));
        assert!(names.contains(&"bare delimiters"));
        assert!(names.contains(&"document scan"));
        assert!(names.contains(&"full response fallback"));
        assert!(names.contains(&"aggressive scan"));
        assert!(names.contains(&"validate document"));
    }

    #[test]
    fn test_delimited_code_helper() {
        let extractor = Extractor::new();
        let raw = format!("intro [CODE_START] {DOC} [CODE_END] outro");
        assert_eq!(extractor.delimited_code(&raw), Some(DOC));
        assert_eq!(extractor.delimited_code("no markers"), None);
    }

    #[test]
    fn test_commentary_strips_delimited_block() {
        let extractor = Extractor::new();
        let raw = format!("Here is the change.\n[CODE_START]{DOC}[CODE_END]");
        assert_eq!(extractor.commentary(&raw), "Here is the change.");
    }
}

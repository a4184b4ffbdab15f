//! Result page extraction
//!
//! One [`ResultExtractor`] per page layout. Extractors never fail: anything
//! they cannot find is left as `None` on the candidate, and the engine treats a
//! missing number as "nothing to announce".

use regex::Regex;

use crate::domain::{Candidate, ExtractedResults, Session};
use crate::error::{Result, TwodError};

pub trait ResultExtractor: Send + Sync {
    /// Layout name, for logs
    fn layout(&self) -> &'static str;

    fn extract(&self, page: &str) -> ExtractedResults;
}

/// Characters scanned after a final label when no further time label follows
const FINAL_BLOCK_MAX_CHARS: usize = 160;

/// Layout where the page text reads
/// `<live number> ... SET <figure> VALUE <figure> ... 12:01 <number> SET .. VALUE .. 16:30 ...`.
///
/// The live reading is the first standalone two-digit number once time
/// labels, dates and SET/VALUE figures are masked. A session's final reading
/// is the text after its configured time label, up to the next time label,
/// and only counts when the number is the first thing after the label.
pub struct BlockTextExtractor {
    morning_label: Regex,
    evening_label: Regex,
    hidden: Regex,
    tag: Regex,
    whitespace: Regex,
    time: Regex,
    date: Regex,
    set: Regex,
    value: Regex,
    updated: Regex,
    two_digits: Regex,
    leading_number: Regex,
}

impl BlockTextExtractor {
    pub fn new(morning_final_label: &str, evening_final_label: &str) -> Result<Self> {
        Ok(Self {
            morning_label: label_regex(morning_final_label)?,
            evening_label: label_regex(evening_final_label)?,
            hidden: compile(r"(?is)<(?:script|style|noscript)\b.*?</(?:script|style|noscript)\s*>")?,
            tag: compile(r"(?s)<[^>]*>")?,
            whitespace: compile(r"\s+")?,
            time: compile(r"\b\d{1,2}:\d{2}(?::\d{2})?(?:\s*[AaPp][Mm]\b)?")?,
            date: compile(
                r"(?i)\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b|\b\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\b",
            )?,
            set: compile(r"\bSET\s*:?\s*(\d[\d,.]*)")?,
            value: compile(r"\bVALUE\s*:?\s*(\d[\d,.]*)")?,
            updated: compile(r"(?i)\bupdated?\s*(?:at)?\s*:?\s*$")?,
            two_digits: compile(r"\b(\d{2})\b")?,
            leading_number: compile(r"^[\s|:•]*(\d{2})(?:\s|$)")?,
        })
    }

    /// Page text as a reader sees it, whitespace collapsed
    pub fn visible_text(&self, page: &str) -> String {
        let without_hidden = self.hidden.replace_all(page, " ");
        let without_tags = self.tag.replace_all(&without_hidden, " ");
        let decoded = without_tags
            .replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">");
        self.whitespace.replace_all(&decoded, " ").trim().to_string()
    }

    fn figures(&self, text: &str) -> Candidate {
        let masked = self.mask(text);
        Candidate {
            number: self
                .two_digits
                .captures(&masked)
                .map(|c| c[1].to_string()),
            set: capture(&self.set, text),
            value: capture(&self.value, text),
            timestamp_label: None,
            final_marker: false,
        }
    }

    fn mask(&self, text: &str) -> String {
        let masked = self.set.replace_all(text, " ");
        let masked = self.value.replace_all(&masked, " ");
        let masked = self.date.replace_all(&masked, " ");
        self.time.replace_all(&masked, " ").into_owned()
    }

    fn live_block(&self, text: &str) -> Candidate {
        let mut live = self.figures(text);
        live.timestamp_label = self.time.find_iter(text).find_map(|m| {
            self.updated
                .is_match(&text[..m.start()])
                .then(|| m.as_str().trim().to_string())
        });
        live
    }

    fn final_block(&self, text: &str, session: Session) -> Option<Candidate> {
        let label = match session {
            Session::Morning => &self.morning_label,
            Session::Evening => &self.evening_label,
        };

        // The last label occurrence that is not an "updated at" stamp
        let found = label
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .filter(|m| !self.updated.is_match(&text[..m.start()]))
            .last()?;

        let rest = &text[found.end()..];
        let end = self
            .time
            .find(rest)
            .map(|m| m.start())
            .unwrap_or(rest.len());
        let block = clip_chars(&rest[..end], FINAL_BLOCK_MAX_CHARS);

        // `16:30 --` followed by a footer is a pending draw, not a result
        let number = self.leading_number.captures(block)?[1].to_string();
        let candidate = Candidate {
            number: Some(number),
            set: capture(&self.set, block),
            value: capture(&self.value, block),
            timestamp_label: Some(found.as_str().to_string()),
            final_marker: true,
        };
        candidate.usable_number()?;
        Some(candidate)
    }
}

impl ResultExtractor for BlockTextExtractor {
    fn layout(&self) -> &'static str {
        "block-text"
    }

    fn extract(&self, page: &str) -> ExtractedResults {
        let text = self.visible_text(page);
        if text.is_empty() {
            return ExtractedResults::default();
        }

        let live = self.live_block(&text);
        let pick = |session| self.final_block(&text, session).unwrap_or_else(|| live.clone());

        ExtractedResults {
            morning: pick(Session::Morning),
            evening: pick(Session::Evening),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| TwodError::Internal(format!("bad pattern {}: {}", pattern, e)))
}

/// Matches the label (optionally with seconds) when not glued to other digits
fn label_regex(label: &str) -> Result<Regex> {
    let label = label.trim();
    if label.is_empty() {
        return Err(TwodError::Validation("final label must not be empty".to_string()));
    }
    compile(&format!(
        r"(?:^|[^\d:])({}(?::\d{{2}})?)(?:[^\d:]|$)",
        regex::escape(label)
    ))
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .map(|c| c[1].trim_end_matches(['.', ',']).to_string())
        .filter(|s| !s.is_empty())
}

fn clip_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEFORE_DRAW: &str = r#"<html><head>
        <script>window.cfg = { slot: "12", refresh: 30 };</script>
        <style>.num { font-size: 64px; }</style></head>
        <body>
          <div class="live"><h1 class="num">82</h1>
            <p>Updated at 11:58:03</p>
            <p>SET&nbsp;1,312.45</p><p>VALUE 23,118.92</p></div>
          <div class="result"><span>12:01</span><b>--</b></div>
          <div class="result"><span>16:30</span><b>--</b></div>
          <footer>16 Oct 2026</footer>
        </body></html>"#;

    const AFTER_MORNING: &str = r#"<html><body>
          <div class="live"><h1>47</h1><p>SET 1,298.10</p><p>VALUE 30,004.55</p></div>
          <div class="result"><span>12:01</span><b>82</b>
            <p>SET 1,312.45</p><p>VALUE 23,118.92</p></div>
          <div class="result"><span>16:30</span><b>--</b></div>
        </body></html>"#;

    fn extractor() -> BlockTextExtractor {
        BlockTextExtractor::new("12:01", "16:30").unwrap()
    }

    #[test]
    fn test_visible_text_drops_scripts_and_tags() {
        let text = extractor().visible_text(BEFORE_DRAW);
        assert!(!text.contains("window.cfg"));
        assert!(!text.contains('<'));
        assert!(text.starts_with("82 Updated at 11:58:03"));
    }

    #[test]
    fn test_live_reading_before_draw() {
        let results = extractor().extract(BEFORE_DRAW);

        let morning = &results.morning;
        assert_eq!(morning.number.as_deref(), Some("82"));
        assert_eq!(morning.set.as_deref(), Some("1,312.45"));
        assert_eq!(morning.value.as_deref(), Some("23,118.92"));
        assert_eq!(morning.timestamp_label.as_deref(), Some("11:58:03"));
        assert!(!morning.final_marker);
        assert_eq!(results.evening, results.morning);
    }

    #[test]
    fn test_final_block_after_morning_draw() {
        let results = extractor().extract(AFTER_MORNING);

        let morning = &results.morning;
        assert!(morning.final_marker);
        assert_eq!(morning.number.as_deref(), Some("82"));
        assert_eq!(morning.set.as_deref(), Some("1,312.45"));
        assert_eq!(morning.timestamp_label.as_deref(), Some("12:01"));

        let evening = &results.evening;
        assert!(!evening.final_marker);
        assert_eq!(evening.number.as_deref(), Some("47"));
        assert_eq!(evening.value.as_deref(), Some("30,004.55"));
    }

    #[test]
    fn test_partial_and_empty_pages() {
        let results = extractor().extract("<div><h1>05</h1></div>");
        assert_eq!(results.morning.number.as_deref(), Some("05"));
        assert!(results.morning.set.is_none());
        assert!(results.morning.value.is_none());

        let empty = extractor().extract("   <html></html> ");
        assert_eq!(empty, ExtractedResults::default());

        let no_number = extractor().extract("<p>Market closed</p>");
        assert!(no_number.morning.usable_number().is_none());
    }

    #[test]
    fn test_updated_stamp_is_not_a_final_block() {
        let page = "<p>61</p><p>Updated 12:01:07</p><p>SET 1,300.00</p>";
        let results = extractor().extract(page);
        assert!(!results.morning.final_marker);
        assert_eq!(results.morning.number.as_deref(), Some("61"));
    }

    #[test]
    fn test_pending_last_final_ignores_trailing_text() {
        let page = r#"<html><body>
              <div class="live"><h1>47</h1><p>SET 1,298.10</p><p>VALUE 30,004.55</p></div>
              <div class="result"><span>12:01</span><b>82</b></div>
              <div class="result"><span>16:30</span><b>--</b></div>
              <footer>Results refresh every 30 seconds</footer>
            </body></html>"#;
        let results = extractor().extract(page);

        let evening = &results.evening;
        assert!(!evening.final_marker, "footer digits must not become a final");
        assert_eq!(evening.number.as_deref(), Some("47"));
        assert!(results.morning.final_marker);
    }

    #[test]
    fn test_final_at_end_of_page() {
        let page = r#"<div><h1>47</h1></div>
            <div class="result"><span>12:01</span><b>82</b></div>
            <div class="result"><span>16:30</span><b>19</b></div>"#;
        let results = extractor().extract(page);

        let evening = &results.evening;
        assert!(evening.final_marker);
        assert_eq!(evening.number.as_deref(), Some("19"));
        assert_eq!(evening.timestamp_label.as_deref(), Some("16:30"));
        assert!(evening.set.is_none());
    }

    #[test]
    fn test_empty_label_rejected() {
        assert!(BlockTextExtractor::new(" ", "16:30").is_err());
    }
}

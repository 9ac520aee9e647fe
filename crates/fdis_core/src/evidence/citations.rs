use std::sync::OnceLock;

use regex::Regex;

use super::BLOCK_SEPARATOR;

const CONTENT_FENCE: &str = "\n\"\"\"";

// Anchored: a header only counts at the start of the text it is given.
fn source_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\ASOURCE \[(\d+)\]\nCompany: ([^\r\n]+)\nDocument: ([^\r\n]+)\nPages: ([^\r\n]+)\nContent:\n")
            .expect("valid source header pattern")
    })
}

fn inline_artifact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 【...】 runs, plus [1], [1, 2], [SOURCE 3] style markers.
    RE.get_or_init(|| {
        Regex::new(r"[ \t]*(?:【[^】]*】|\[(?:SOURCE\s*)?\d+(?:\s*[,\u{2013}-]\s*\d+)*\])")
            .expect("valid inline citation pattern")
    })
}

fn repeated_spaces_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]{2,}").expect("valid whitespace pattern"))
}

/// A citation recovered from the rendered evidence context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceCitation {
    pub source_id: u32,
    pub company: String,
    pub document: String,
    pub pages: String,
}

impl SourceCitation {
    pub fn render(&self) -> String {
        format!(
            "SOURCE [{}] \u{2014} {}, {}, Pages {}",
            self.source_id, self.company, self.document, self.pages
        )
    }
}

/// Recover the source headers of the blocks that make up `context`, in order.
///
/// Blocks are walked from the start of the context: block `n + 1` must open
/// right after block `n`'s closing fence and separator. Header-shaped lines
/// quoted inside a chunk's content are not block starts and are ignored.
pub fn scan_sources(context: &str) -> Vec<SourceCitation> {
    let mut out = Vec::new();
    let mut rest = context;
    let mut expected = 1u32;
    while let Some(caps) = source_header_re().captures(rest) {
        if caps[1].parse::<u32>().ok() != Some(expected) {
            break;
        }
        out.push(SourceCitation {
            source_id: expected,
            company: caps[2].trim().to_string(),
            document: caps[3].trim().to_string(),
            pages: caps[4].trim().to_string(),
        });

        let body = &rest[caps.get(0).map_or(0, |m| m.end())..];
        let next_start = format!("{CONTENT_FENCE}{BLOCK_SEPARATOR}SOURCE [{}]\n", expected + 1);
        let Some(at) = body.find(&next_start) else {
            break;
        };
        rest = &body[at + CONTENT_FENCE.len() + BLOCK_SEPARATOR.len()..];
        expected += 1;
    }
    out
}

/// Citation strings for the evidence that was supplied, never for what a model claims.
pub fn reconstruct_citations(context: &str) -> Vec<String> {
    scan_sources(context).iter().map(SourceCitation::render).collect()
}

/// Remove inline bracketed citation artifacts from generated answer text.
pub fn strip_inline_citations(answer: &str) -> String {
    let stripped = inline_artifact_re().replace_all(answer, "");
    let lines: Vec<String> = stripped
        .lines()
        .map(|l| repeated_spaces_re().replace_all(l, " ").trim_end().to_string())
        .collect();
    lines.join("\n").trim().to_string()
}

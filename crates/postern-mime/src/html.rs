//! HTML body preparation for outgoing mail.
//!
//! Two jobs: reduce HTML to a plain-text alternative, and scan the HTML for
//! the things the MIME layout depends on (`cid:` references, embedded
//! `data:` images and remote resource URLs).

use crate::encoding::decode_base64_lenient;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use tracing::{debug, warn};

#[allow(clippy::expect_used)]
static DATA_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:(image/[a-zA-Z0-9]+\+?[a-zA-Z0-9]+);base64,([A-Za-z0-9+/=\r\n]+)")
        .expect("data image pattern")
});

#[allow(clippy::expect_used)]
static CID_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bcid:\s*([^"'\s)>]+)"#).expect("cid pattern")
});

#[allow(clippy::expect_used)]
static REMOTE_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:src|background)\s*=\s*["'](https?://[^"']+)["']"#)
        .expect("remote src pattern")
});

#[allow(clippy::expect_used)]
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern"));

#[allow(clippy::expect_used)]
static SKIPPED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)>").expect("block pattern")
});

#[allow(clippy::expect_used)]
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").expect("blank line pattern"));

/// Length of the hex digest used for generated content ids.
const CID_HEX_LEN: usize = 32;

/// An image lifted out of a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// Generated content id, without angle brackets.
    pub content_id: String,
    /// MIME type from the URL, e.g. `image/png`.
    pub content_type: String,
    /// File name derived from the MIME type.
    pub filename: String,
    /// Decoded image bytes.
    pub data: Vec<u8>,
}

/// Result of scanning an HTML body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedHtml {
    /// HTML with every embedded image replaced by a `cid:` reference.
    pub html: String,
    /// Content ids referenced by the original HTML, in order of appearance.
    pub found_cids: Vec<String>,
    /// Images extracted from `data:` URLs.
    pub inline_images: Vec<InlineImage>,
    /// Absolute `http(s)` URLs used as `src` or `background`.
    pub content_locations: Vec<String>,
}

impl PreparedHtml {
    /// Returns true if the HTML referenced exactly `cid`. Case matters.
    #[must_use]
    pub fn references_cid(&self, cid: &str) -> bool {
        self.found_cids.iter().any(|c| c == cid)
    }
}

/// Scans HTML and rewrites embedded `data:image/...;base64,` URLs.
///
/// Each occurrence gets its own content id, a SHA-256 digest of its
/// position and payload, so identical images embedded twice become two
/// parts. Payloads that fail to decode are left untouched.
#[must_use]
pub fn prepare_html(html: &str) -> PreparedHtml {
    let mut found_cids = Vec::new();
    for capture in CID_REF.captures_iter(html) {
        let cid = capture[1].trim_matches(|c| c == '<' || c == '>').to_string();
        if !found_cids.contains(&cid) {
            found_cids.push(cid);
        }
    }

    let mut content_locations = Vec::new();
    for capture in REMOTE_SRC.captures_iter(html) {
        let url = capture[1].to_string();
        if !content_locations.contains(&url) {
            content_locations.push(url);
        }
    }

    let mut inline_images = Vec::new();
    let mut rewritten = String::with_capacity(html.len());
    let mut last = 0;

    for (index, capture) in DATA_IMAGE.captures_iter(html).enumerate() {
        let Some(whole) = capture.get(0) else {
            continue;
        };
        let content_type = capture[1].to_lowercase();
        let payload = &capture[2];

        let data = match decode_base64_lenient(payload.as_bytes()) {
            Ok(data) if !data.is_empty() => data,
            Ok(_) | Err(_) => {
                warn!(content_type = %content_type, "Skipping undecodable data URL image");
                continue;
            }
        };

        let content_id = generated_cid(index, payload);
        debug!(content_id = %content_id, content_type = %content_type, size = data.len(), "Extracted inline image");

        rewritten.push_str(&html[last..whole.start()]);
        rewritten.push_str("cid:");
        rewritten.push_str(&content_id);
        last = whole.end();

        inline_images.push(InlineImage {
            filename: filename_for(&content_type),
            content_id,
            content_type,
            data,
        });
    }
    rewritten.push_str(&html[last..]);

    PreparedHtml {
        html: rewritten,
        found_cids,
        inline_images,
        content_locations,
    }
}

/// Reduces HTML to readable plain text.
///
/// Uses a Markdown-style conversion, so link targets survive in brackets.
/// Images are dropped. If the converter fails, tags are stripped instead.
#[must_use]
pub fn html_to_plain(html: &str) -> String {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "head", "img"])
        .build();

    let text = match converter.convert(html) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "HTML conversion failed, stripping tags");
            strip_tags(html)
        }
    };

    BLANK_LINES.replace_all(text.trim(), "\n\n").into_owned()
}

fn strip_tags(html: &str) -> String {
    let without_blocks = SKIPPED_BLOCK.replace_all(html, "");
    let with_breaks = without_blocks
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n\n");
    TAG.replace_all(&with_breaks, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn generated_cid(index: usize, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_le_bytes());
    hasher.update(payload.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..CID_HEX_LEN].to_string()
}

/// `image/svg+xml` becomes `image.svg.xml`.
fn filename_for(content_type: &str) -> String {
    content_type
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '.' })
        .collect()
}

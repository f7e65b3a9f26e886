// src/ingest/normalize.rs
//! RawItem -> Item conversion. Malformed items are rejected with a
//! `NormalizationError` and counted, never raised past the cycle.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::error::NormalizationError;
use crate::ingest::config::normalize_subject;
use crate::ingest::tagger::{auto_tags, MAX_TAGS};
use crate::ingest::types::{Item, RawItem};
use crate::sentiment::Tone;

const MAX_TEXT_CHARS: usize = 1500;
const UNKNOWN_AUTHOR: &str = "unknown";

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));

/// Decode entities, drop markup, fold typographic quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    let folded = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    let mut out = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// Provider-native ids compare case-insensitively and without cashtag/hash prefixes.
pub fn normalize_source_id(raw: &str) -> Option<String> {
    let s = raw
        .trim()
        .trim_start_matches(['#', '$'])
        .trim()
        .to_lowercase();
    (!s.is_empty()).then_some(s)
}

/// Parse the timestamp forms providers are known to emit. Anything ambiguous
/// (e.g. a 9- or 12-digit number) is rejected rather than guessed.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, NormalizationError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(NormalizationError::BadTimestamp);
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        let n: i64 = s.parse().map_err(|_| NormalizationError::BadTimestamp)?;
        let ts = match s.len() {
            10 => Utc.timestamp_opt(n, 0).single(),
            13 => Utc.timestamp_millis_opt(n).single(),
            _ => None,
        };
        return ts.ok_or(NormalizationError::BadTimestamp);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    const NAIVE: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    for fmt in NAIVE {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ndt.and_utc());
        }
    }

    // Compact form used by some news APIs: 20240105T143000 (optional Z, optional seconds).
    let compact = s.strip_suffix('Z').unwrap_or(s);
    for fmt in ["%Y%m%dT%H%M%S", "%Y%m%dT%H%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(compact, fmt) {
            return Ok(ndt.and_utc());
        }
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = d.and_hms_opt(0, 0, 0) {
            return Ok(ndt.and_utc());
        }
    }

    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc2822) {
        let nanos = odt.unix_timestamp_nanos();
        let secs = (nanos.div_euclid(1_000_000_000)) as i64;
        let sub = (nanos.rem_euclid(1_000_000_000)) as u32;
        if let Some(dt) = Utc.timestamp_opt(secs, sub).single() {
            return Ok(dt);
        }
    }

    Err(NormalizationError::BadTimestamp)
}

/// Identity used when a provider supplies no native id.
pub(crate) fn fallback_key(author: &str, text: &str, ts: DateTime<Utc>) -> String {
    let minute = ts.timestamp().div_euclid(60);
    hex_digest(&[author, text, &minute.to_string()])
}

pub(crate) fn hex_digest(parts: &[&str]) -> String {
    let mut h = Sha256::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            h.update([0x1f]);
        }
        h.update(p.as_bytes());
    }
    h.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// Per-cycle rejection tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub missing_subject: usize,
    pub empty_text: usize,
    pub bad_timestamp: usize,
}

impl NormalizeStats {
    pub fn record(&mut self, e: NormalizationError) {
        match e {
            NormalizationError::MissingSubject => self.missing_subject += 1,
            NormalizationError::EmptyText => self.empty_text += 1,
            NormalizationError::BadTimestamp => self.bad_timestamp += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.missing_subject + self.empty_text + self.bad_timestamp
    }
}

/// Convert one raw item. Tone and weight are left neutral/zero for the scorer.
pub fn normalize(raw: RawItem) -> Result<Item, NormalizationError> {
    let subject = normalize_subject(&raw.subject);
    if subject.is_empty() {
        return Err(NormalizationError::MissingSubject);
    }

    let text = normalize_text(raw.text.as_deref().unwrap_or_default());
    if text.is_empty() {
        return Err(NormalizationError::EmptyText);
    }

    let timestamp = raw
        .timestamp
        .as_deref()
        .ok_or(NormalizationError::BadTimestamp)
        .and_then(parse_timestamp)?;

    let author = raw
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(UNKNOWN_AUTHOR)
        .to_string();

    let likes = raw.likes.unwrap_or(0).max(0) as u64;
    let reposts = raw.reposts.unwrap_or(0).max(0) as u64;

    let source_id = raw.source_id.as_deref().and_then(normalize_source_id);
    let identity = match &source_id {
        Some(sid) => sid.clone(),
        None => fallback_key(&author, &text, timestamp),
    };
    let id = hex_digest(&[&subject, &raw.provider, &identity])[..16].to_string();
    let tags = auto_tags(&text, MAX_TAGS);

    Ok(Item {
        id,
        subject,
        provider: raw.provider,
        source_id,
        text,
        timestamp,
        author,
        url: raw.url.filter(|u| !u.trim().is_empty()),
        likes,
        reposts,
        engagement_score: likes.saturating_add(reposts) as f64,
        label: raw.label,
        tone: Tone::Neutral,
        weight: 0.0,
        tags,
    })
}

/// Normalize a batch, dropping rejects into `stats`.
pub fn normalize_all(raw: Vec<RawItem>, stats: &mut NormalizeStats) -> Vec<Item> {
    let mut out = Vec::with_capacity(raw.len());
    for r in raw {
        match normalize(r) {
            Ok(item) => out.push(item),
            Err(e) => stats.record(e),
        }
    }
    out
}

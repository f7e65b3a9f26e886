// src/ingest/tagger.rs
//! Topic tags for items: curated keyword buckets, cashtags, and bare
//! upper-case tokens such as `WWDC` or `OPEC`.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_TAGS: usize = 6;

static KEYWORD_TAGS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // Macro
        (r"\b(inflation|cpi|ppi|deflator|core inflation)\b", "Inflation"),
        (r"\b(gdp|growth)\b", "GDP"),
        (r"\b(fed|fomc|powell)\b", "Fed"),
        (r"\b(boj|bank of japan)\b", "BoJ"),
        (r"\b(boe|bank of england)\b", "BoE"),
        (r"\b(ecb|lagarde)\b", "ECB"),
        // Energy and commodities
        (r"\bopec\b", "OPEC"),
        (r"\b(brent|wti|crude)\b", "Oil"),
        (r"\b(natural gas|lng)\b", "NaturalGas"),
        (r"\b(copper|aluminum|aluminium|nickel|zinc)\b", "BaseMetals"),
        (r"\b(wheat|corn|soy|soybeans|sugar)\b", "Ags"),
        // Markets
        (r"\b(equities|stocks|shares|equity)\b", "Equities"),
        (r"\b(treasuries|bonds|yields|yield)\b", "Rates"),
        (r"\b(fx|forex|currency|currencies|usd|eur|gbp|jpy|cny)\b", "FX"),
        // Policy and geopolitics
        (r"\b(sanction|sanctions)\b", "Sanctions"),
        (r"\b(tariff|tariffs)\b", "Tariffs"),
        (r"\b(fiscal|budget|deficit)\b", "Fiscal"),
        (r"\b(regulation|regulatory|legislation|bill)\b", "Policy"),
        (r"\b(congress|senate|parliament|white house)\b", "Government"),
        (r"\b(election|elections|campaign)\b", "Elections"),
        (r"\b(geopolitic|geopolitical|nato|conflict|war)\b", "Geopolitics"),
    ]
    .into_iter()
    .map(|(p, tag)| (Regex::new(p).expect("keyword tag regex"), tag))
    .collect()
});

static RE_CASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([A-Z]{1,5})\b").expect("cashtag regex"));
static RE_UPPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2,6}\b").expect("upper token regex"));

/// Tokens the keyword buckets already cover, plus filler words.
const STOP_TOKENS: &[&str] = &[
    "AND", "THE", "FOR", "WITH", "FROM", "THIS", "THAT", "WHAT", "WILL", "HAVE", "HAS", "OPEC",
    "CPI", "PPI", "GDP", "ECB", "BOE", "BOJ", "FED",
];

fn keyword_tags(text: &str) -> impl Iterator<Item = String> + '_ {
    let lower = text.to_lowercase();
    KEYWORD_TAGS
        .iter()
        .filter(move |(re, _)| re.is_match(&lower))
        .map(|(_, tag)| tag.to_string())
}

fn cashtags(text: &str) -> impl Iterator<Item = String> + '_ {
    RE_CASHTAG.captures_iter(text).filter_map(move |c| {
        let whole = c.get(0)?;
        // `a$AAPL` is not a cashtag.
        let glued = text[..whole.start()]
            .chars()
            .next_back()
            .is_some_and(|p| p.is_alphanumeric() || p == '_' || p == '$');
        (!glued).then(|| c[1].to_string())
    })
}

fn upper_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    RE_UPPER
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|t| !STOP_TOKENS.contains(t))
        .map(str::to_string)
}

/// Up to `limit` tags, first occurrence wins, compared case-insensitively.
pub fn auto_tags(text: &str, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let candidates = keyword_tags(text).chain(cashtags(text)).chain(upper_tokens(text));
    for tag in candidates {
        if out.len() >= limit {
            break;
        }
        if !out.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            out.push(tag);
        }
    }
    out
}

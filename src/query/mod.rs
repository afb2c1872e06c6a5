// Lexical query-intent classification. Deterministic by construction: fixed
// pattern tables checked in a fixed precedence order, no model calls.


use fancy_regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Intent of a user query, deciding which retrieval strategy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    /// Ranking or engagement questions ("most viewed", "一番人気").
    Statistical,
    /// Freshness-oriented queries ("latest", "最近").
    Recent,
    /// Topical lookup with explicit search phrasing.
    Search,
    /// Everything else.
    General,
}

impl QueryIntent {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Statistical => "statistical",
            Self::Recent => "recent",
            Self::Search => "search",
            Self::General => "general",
        }
    }
}

static STATISTICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(most|least)\s+(viewed|watched|popular|liked|commented)\b
        | \btop\s*\d+\b
        | \b(highest|lowest)\s+(view|like|comment)
        | \bview\s*counts?\b
        | \bbest\s+performing\b
        | \branking\b
        | \bpopular(ity)?\b
        | 一番人気 | 人気 | 再生回数 | 再生数 | ランキング | 最も(?:見られ|再生され)
        ",
    )
    .expect("statistical pattern is valid")
});

static RECENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(latest|newest|recent(ly)?)\b
        | \bthis\s+(week|month|year)\b
        | \blast\s+(week|month)\b
        | \bnew\s+(video|upload|release)s?\b
        | \b(19|20)\d{2}\b
        | 最新 | 最近 | 新着 | 今週 | 今月 | 今年
        ",
    )
    .expect("recent pattern is valid")
});

static SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?ix)
        \b(about|find|search(\s+for)?|show\s+me|looking\s+for|videos?\s+(of|on|with))\b
        | "[^"]+"
        | について | に関する | を?探し | 検索
        "#,
    )
    .expect("search pattern is valid")
});

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b|(?:19|20)\d{2}年").expect("year pattern is valid"));

fn matches(re: &Regex, query: &str) -> bool {
    re.is_match(query).unwrap_or(false)
}

/// Classify a query into one intent. Precedence when patterns overlap:
/// statistical beats recent beats search, so "most popular video of 2023"
/// stays a ranking question even though it names a year.
#[inline]
pub fn classify(query: &str) -> QueryIntent {
    let intent = if matches(&STATISTICAL_RE, query) {
        QueryIntent::Statistical
    } else if matches(&RECENT_RE, query) {
        QueryIntent::Recent
    } else if matches(&SEARCH_RE, query) {
        QueryIntent::Search
    } else {
        QueryIntent::General
    };

    debug!("Classified query as {}: {:?}", intent.as_str(), query);
    intent
}

/// Extract a four-digit publication year (1900..=2099) from the query, if
/// one is present. Used to narrow the statistical partition filter.
#[inline]
pub fn extract_year(query: &str) -> Option<i32> {
    let matched = YEAR_RE.find(query).ok().flatten()?;
    let digits: String = matched
        .as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

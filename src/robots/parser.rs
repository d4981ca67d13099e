//! Robots.txt parsing and path evaluation
//!
//! Parsing is a line-oriented state machine. Groups of consecutive
//! `User-agent` lines share one rule set; a `User-agent` line that follows
//! directives starts a new group. Malformed lines are recorded as
//! [`RobotsParseError`] values and parsing continues.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// A recoverable problem found while parsing robots.txt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotsParseError {
    /// 1-based line number
    pub line: usize,
    pub message: String,
}

impl fmt::Display for RobotsParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

/// A single `Allow` or `Disallow` directive with its precompiled matcher
#[derive(Debug, Clone)]
pub struct Directive {
    pub path: String,
    pub allow: bool,
    matcher: Option<Regex>,
}

impl Directive {
    pub fn new(path: &str, allow: bool) -> Self {
        Self {
            path: path.to_string(),
            allow,
            matcher: compile_path_pattern(path),
        }
    }

    /// Whether this directive applies to `path`
    ///
    /// An empty path (`Disallow:`) places no restriction and never matches.
    pub fn matches(&self, path: &str) -> bool {
        !self.path.is_empty() && self.matcher.as_ref().map_or(false, |re| re.is_match(path))
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.allow { "Allow" } else { "Disallow" };
        write!(f, "{}: {}", kind, self.path)
    }
}

/// Compiles a robots path pattern into an anchored prefix matcher
///
/// `*` matches any run of characters and a trailing `$` anchors the end of
/// the string. Everything else is literal. Only a pattern exceeding the
/// regex size limit fails to compile; it then matches nothing.
fn compile_path_pattern(path: &str) -> Option<Regex> {
    let (body, anchored) = match path.strip_suffix('$') {
        Some(body) => (body, true),
        None => (path, false),
    };

    let mut pattern = String::with_capacity(body.len() + 8);
    pattern.push('^');
    for (i, literal) in body.split('*').enumerate() {
        if i > 0 {
            pattern.push_str(".*");
        }
        pattern.push_str(&regex::escape(literal));
    }
    if anchored {
        pattern.push('$');
    }

    Regex::new(&pattern).ok()
}

/// Rules collected for one user agent
#[derive(Debug, Clone)]
pub struct UserAgentRules {
    pub user_agent: String,
    pub directives: Vec<Directive>,
    pub crawl_delay: Option<f64>,
    /// `(requests, seconds)`
    pub request_rate: Option<(u32, u32)>,
}

impl UserAgentRules {
    fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            directives: Vec::new(),
            crawl_delay: None,
            request_rate: None,
        }
    }

    /// Finds the directive that decides `path`
    ///
    /// The matching directive with the longest pattern wins. On a tie an
    /// `Allow` beats a `Disallow`, so declaration order never matters.
    pub fn best_match(&self, path: &str) -> Option<&Directive> {
        self.directives
            .iter()
            .filter(|d| d.matches(path))
            .max_by(|a, b| {
                a.path
                    .len()
                    .cmp(&b.path.len())
                    .then_with(|| a.allow.cmp(&b.allow))
            })
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        self.best_match(path).map_or(true, |d| d.allow)
    }

    pub fn blocked_paths(&self) -> Vec<String> {
        self.directives
            .iter()
            .filter(|d| !d.allow)
            .map(|d| d.path.clone())
            .collect()
    }

    pub fn allowed_paths(&self) -> Vec<String> {
        self.directives
            .iter()
            .filter(|d| d.allow)
            .map(|d| d.path.clone())
            .collect()
    }

    /// Minimum seconds between requests implied by `Request-rate`
    pub fn request_interval(&self) -> Option<f64> {
        match self.request_rate {
            Some((requests, seconds)) if requests > 0 => Some(seconds as f64 / requests as f64),
            _ => None,
        }
    }
}

/// Detailed answer for a single path test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathTestResult {
    pub path: String,
    pub allowed: bool,
    pub user_agent: String,
    pub matched_rule: Option<String>,
    pub reason: String,
}

/// Summary of a policy as seen by one user agent
#[derive(Debug, Clone, Serialize)]
pub struct RobotsAnalysis {
    pub url: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub raw_content: String,
    pub user_agents: Vec<String>,
    pub sitemaps: Vec<String>,
    pub parse_errors: Vec<RobotsParseError>,
    pub selected_user_agent: String,
    pub blocked_paths: Vec<String>,
    pub allowed_paths: Vec<String>,
    pub crawl_delay: Option<f64>,
    pub request_rate: Option<(u32, u32)>,
}

/// A parsed robots.txt document
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    rules: Vec<UserAgentRules>,
    /// Lowercased agent token to index in `rules`
    index: HashMap<String, usize>,
    sitemaps: Vec<String>,
    errors: Vec<RobotsParseError>,
    raw: String,
    source_url: Option<String>,
    fetched_at: Option<DateTime<Utc>>,
}

impl RobotsPolicy {
    /// A policy with no rules; every path is allowed
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parses robots.txt content
    ///
    /// # Examples
    ///
    /// ```
    /// use newt_walker::robots::RobotsPolicy;
    ///
    /// let policy = RobotsPolicy::parse("User-agent: *\nDisallow: /private/\nAllow: /private/public.html");
    /// assert!(policy.is_path_allowed("/private/public.html", "AnyBot"));
    /// assert!(!policy.is_path_allowed("/private/other", "AnyBot"));
    /// ```
    pub fn parse(content: &str) -> Self {
        let mut policy = Self {
            raw: content.to_string(),
            ..Self::default()
        };

        let mut current: Vec<usize> = Vec::new();

        for (idx, raw_line) in content.split('\n').enumerate() {
            let line_num = idx + 1;
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                policy.error(line_num, "Invalid syntax");
                continue;
            };
            let name = name.trim().to_lowercase();
            let value = value.trim();

            match name.as_str() {
                "user-agent" => {
                    let slot = policy.rules_slot(value);
                    let group_has_directives = current
                        .first()
                        .map_or(false, |&first| !policy.rules[first].directives.is_empty());
                    if group_has_directives {
                        current = vec![slot];
                    } else if !current.contains(&slot) {
                        current.push(slot);
                    }
                }
                "disallow" | "allow" => {
                    if current.is_empty() {
                        policy.error(line_num, "Directive without user-agent");
                        continue;
                    }
                    let allow = name == "allow";
                    for &slot in &current {
                        policy.rules[slot].directives.push(Directive::new(value, allow));
                    }
                }
                "crawl-delay" => match value.parse::<f64>() {
                    Ok(delay) if delay.is_finite() && delay >= 0.0 => {
                        for &slot in &current {
                            policy.rules[slot].crawl_delay = Some(delay);
                        }
                    }
                    _ => policy.error(line_num, "Invalid crawl-delay value"),
                },
                "request-rate" => match parse_request_rate(value) {
                    Some(rate) => {
                        for &slot in &current {
                            policy.rules[slot].request_rate = Some(rate);
                        }
                    }
                    None => policy.error(line_num, "Invalid request-rate value"),
                },
                "sitemap" => {
                    // The value keeps its own ':' characters, e.g. "https://..."
                    if !value.is_empty() && !policy.sitemaps.iter().any(|s| s == value) {
                        policy.sitemaps.push(value.to_string());
                    }
                }
                "host" => {}
                other => {
                    let message = format!("Unknown directive '{}'", other);
                    policy.error(line_num, &message);
                }
            }
        }

        policy
    }

    fn rules_slot(&mut self, agent: &str) -> usize {
        let key = agent.to_lowercase();
        if let Some(&slot) = self.index.get(&key) {
            return slot;
        }
        self.rules.push(UserAgentRules::new(agent));
        let slot = self.rules.len() - 1;
        self.index.insert(key, slot);
        slot
    }

    fn error(&mut self, line: usize, message: &str) {
        self.errors.push(RobotsParseError {
            line,
            message: message.to_string(),
        });
    }

    /// Records where and when the content was fetched
    pub fn with_source(mut self, url: &str) -> Self {
        self.source_url = Some(url.to_string());
        self.fetched_at = Some(Utc::now());
        self
    }

    pub(crate) fn push_error(&mut self, message: String) {
        self.errors.push(RobotsParseError { line: 0, message });
    }

    /// Selects the rule set for an agent: exact match, then `*`
    pub fn rules_for(&self, user_agent: &str) -> Option<&UserAgentRules> {
        self.index
            .get(&user_agent.to_lowercase())
            .or_else(|| self.index.get("*"))
            .map(|&slot| &self.rules[slot])
    }

    /// Evaluates a path (optionally with `?query`) for an agent
    pub fn is_path_allowed(&self, path: &str, user_agent: &str) -> bool {
        self.rules_for(user_agent)
            .map_or(true, |rules| rules.is_allowed(path))
    }

    /// Evaluates a full URL; the query string takes part in matching
    pub fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        self.is_path_allowed(&path_with_query(url), user_agent)
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        self.rules_for(user_agent).and_then(|r| r.crawl_delay)
    }

    pub fn request_rate(&self, user_agent: &str) -> Option<(u32, u32)> {
        self.rules_for(user_agent).and_then(|r| r.request_rate)
    }

    /// Seconds to wait between requests: the larger of crawl-delay and the
    /// interval implied by request-rate
    pub fn min_interval(&self, user_agent: &str) -> Option<f64> {
        let rules = self.rules_for(user_agent)?;
        match (rules.crawl_delay, rules.request_interval()) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    pub fn parse_errors(&self) -> &[RobotsParseError] {
        &self.errors
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.user_agent.clone()).collect()
    }

    pub fn raw_content(&self) -> &str {
        &self.raw
    }

    /// Tests a path and explains the decision
    pub fn test_path(&self, path: &str, user_agent: &str) -> PathTestResult {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        let Some(rules) = self.rules_for(user_agent) else {
            return PathTestResult {
                path,
                allowed: true,
                user_agent: user_agent.to_string(),
                matched_rule: None,
                reason: "No rules defined for this user agent".to_string(),
            };
        };

        match rules.best_match(&path) {
            Some(directive) => PathTestResult {
                allowed: directive.allow,
                user_agent: user_agent.to_string(),
                matched_rule: Some(directive.to_string()),
                reason: format!("Matched by rule: {}", directive),
                path,
            },
            None => PathTestResult {
                path,
                allowed: true,
                user_agent: user_agent.to_string(),
                matched_rule: None,
                reason: "No matching rules found".to_string(),
            },
        }
    }

    pub fn analysis(&self, user_agent: &str) -> RobotsAnalysis {
        let rules = self.rules_for(user_agent);
        RobotsAnalysis {
            url: self.source_url.clone(),
            fetched_at: self.fetched_at,
            raw_content: self.raw.clone(),
            user_agents: self.user_agents(),
            sitemaps: self.sitemaps.clone(),
            parse_errors: self.errors.clone(),
            selected_user_agent: user_agent.to_string(),
            blocked_paths: rules.map(|r| r.blocked_paths()).unwrap_or_default(),
            allowed_paths: rules.map(|r| r.allowed_paths()).unwrap_or_default(),
            crawl_delay: rules.and_then(|r| r.crawl_delay),
            request_rate: rules.and_then(|r| r.request_rate),
        }
    }
}

/// `N/M` as two non-negative integers with a non-zero period
fn parse_request_rate(value: &str) -> Option<(u32, u32)> {
    let (requests, seconds) = value.split_once('/')?;
    let requests = requests.trim().parse::<u32>().ok()?;
    let seconds = seconds.trim().parse::<u32>().ok()?;
    (seconds > 0).then_some((requests, seconds))
}

/// Path plus `?query` of a URL, the string robots rules are matched against
pub fn path_with_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

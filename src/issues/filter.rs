use super::Issue;
use regex::Regex;
use url::Url;

/// Path component of an issue URL; the query string and fragment never take part
fn issue_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Translates a shell-style glob into an anchored regex
///
/// `*` matches any run (including `/`), `?` one character, `[...]` a class
/// with `!` for negation. An unterminated `[` is taken literally.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?s)^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut j = i + 1;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str(r"\[");
                } else {
                    let mut class: String = chars[i + 1..j].iter().collect();
                    if let Some(rest) = class.strip_prefix('!') {
                        class = format!("^{}", rest);
                    } else if class.starts_with('^') {
                        class = format!(r"\{}", class);
                    }
                    out.push('[');
                    out.push_str(&class.replace('\\', r"\\"));
                    out.push(']');
                    i = j;
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    Regex::new(&out).ok()
}

/// Whether `path` matches the glob `pattern`
pub fn glob_matches(pattern: &str, path: &str) -> bool {
    glob_to_regex(pattern).map_or(false, |re| re.is_match(path))
}

enum Exclusion {
    Glob(Regex),
    Prefix(String),
}

impl Exclusion {
    fn compile(patterns: &[String]) -> Vec<Exclusion> {
        patterns
            .iter()
            .filter(|p| {
                let trimmed = p.trim();
                !trimmed.is_empty() && !trimmed.starts_with('#')
            })
            .filter_map(|p| {
                if p.contains('*') {
                    glob_to_regex(p).map(Exclusion::Glob)
                } else {
                    Some(Exclusion::Prefix(p.clone()))
                }
            })
            .collect()
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Glob(re) => re.is_match(path),
            // Equality is subsumed by the prefix test but both are kept
            Self::Prefix(p) => path == p || path.starts_with(p.trim_end_matches('*')),
        }
    }
}

/// Whether a URL's path is excluded by any of `patterns`
pub fn is_excluded(url: &str, patterns: &[String]) -> bool {
    let compiled = Exclusion::compile(patterns);
    let path = issue_path(url);
    compiled.iter().any(|e| e.matches(&path))
}

/// Drops issues whose URL path matches an exclusion pattern
///
/// Applied when issues are read, never when they are stored, so changing the
/// pattern list re-filters existing crawls.
pub fn filter_issues_by_exclusion_patterns(issues: Vec<Issue>, patterns: &[String]) -> Vec<Issue> {
    if patterns.is_empty() {
        return issues;
    }
    let compiled = Exclusion::compile(patterns);
    if compiled.is_empty() {
        return issues;
    }

    issues
        .into_iter()
        .filter(|issue| {
            let path = issue_path(&issue.url);
            !compiled.iter().any(|e| e.matches(&path))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::IssueCategory;

    fn issue(url: &str) -> Issue {
        Issue::warning(url, IssueCategory::Title, "Missing title tag", "")
    }

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_glob_matches_extension() {
        let pats = patterns(&["*.json"]);
        let kept = filter_issues_by_exclusion_patterns(
            vec![issue("https://e.com/api/data.json"), issue("https://e.com/page.html")],
            &pats,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://e.com/page.html");
    }

    #[test]
    fn test_filter_is_idempotent() {
        let pats = patterns(&["*.json", "/admin"]);
        let issues = vec![
            issue("https://e.com/a.json"),
            issue("https://e.com/admin/users"),
            issue("https://e.com/about"),
        ];
        let once = filter_issues_by_exclusion_patterns(issues, &pats);
        let twice = filter_issues_by_exclusion_patterns(once.clone(), &pats);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 1);
    }

    #[test]
    fn test_query_string_is_ignored() {
        let pats = patterns(&["*.json"]);
        assert!(is_excluded("https://e.com/feed.json?page=2", &pats));
        assert!(!is_excluded("https://e.com/feed?format=.json", &pats));
    }

    #[test]
    fn test_prefix_patterns() {
        let pats = patterns(&["/wp-admin"]);
        assert!(is_excluded("https://e.com/wp-admin", &pats));
        assert!(is_excluded("https://e.com/wp-admin/edit.php", &pats));
        assert!(!is_excluded("https://e.com/blog/wp-admin", &pats));
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        let pats = patterns(&["", "   ", "# /"]);
        let issues = vec![issue("https://e.com/anything")];
        assert_eq!(filter_issues_by_exclusion_patterns(issues, &pats).len(), 1);
    }

    #[test]
    fn test_glob_syntax() {
        assert!(glob_matches("/page?.html", "/page1.html"));
        assert!(!glob_matches("/page?.html", "/page10.html"));
        assert!(glob_matches("/[abc]*", "/blog"));
        assert!(!glob_matches("/[!abc]*", "/blog"));
        assert!(glob_matches("/file[", "/file["));
        assert!(glob_matches("*/feed/*", "/blog/feed/rss"));
    }

    #[test]
    fn test_default_patterns_exclude_admin_paths() {
        let pats = crate::config::defaults::default_issue_exclusion_patterns();
        assert!(is_excluded("https://e.com/wp-admin/options.php", &pats));
        assert!(!is_excluded("https://e.com/about-us", &pats));
    }
}

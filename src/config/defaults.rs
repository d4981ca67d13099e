//! Defaults table for crawl configuration
//!
//! Every field of [`CrawlConfig`](super::CrawlConfig) has its default here so
//! that serde, the CLI and tests all agree on one set of values.

/// Default maximum link depth from the seed URL
pub const MAX_DEPTH: u32 = 3;

/// Default cap on discovered URLs per job
pub const MAX_URLS: usize = 5_000_000;

/// Default delay between requests to the same host, in seconds
pub const DELAY_SECS: f64 = 1.0;

/// Default worker pool size
pub const CONCURRENCY: usize = 5;

/// Default request timeout, in seconds
pub const TIMEOUT_SECS: u64 = 10;

/// Default retry budget per URL
pub const RETRIES: u32 = 3;

/// Base backoff between retries, in milliseconds (doubles each attempt)
pub const RETRY_BACKOFF_MS: u64 = 500;

pub const USER_AGENT: &str = "WailingNewt/1.0 (Web Crawler)";
pub const ROBOTS_USER_AGENT: &str = "WailingNewt";
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

pub const INCLUDE_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx", "jsp"];
pub const EXCLUDE_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "zip", "exe", "dmg"];

/// 50 MiB
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// 512 MiB
pub const MEMORY_LIMIT: u64 = 512 * 1024 * 1024;

/// Pages recorded between checkpoint flushes
pub const CHECKPOINT_INTERVAL: usize = 50;

/// Maximum redirect hops followed for one request
pub const MAX_REDIRECTS: usize = 10;

/// Default issue exclusion list, one pattern per line
///
/// Blank lines and lines starting with `#` are ignored by
/// [`parse_issue_exclusion_patterns`].
pub const DEFAULT_ISSUE_EXCLUSION_PATTERNS_TEXT: &str = r##"# WordPress admin & system paths
/wp-admin/*
/wp-content/plugins/*
/wp-content/themes/*
/wp-content/uploads/*
/wp-includes/*
/wp-login.php
/wp-cron.php
/xmlrpc.php
/wp-json/*
/wp-activate.php
/wp-signup.php
/wp-trackback.php

# Auth & user management pages
/login*
/signin*
/sign-in*
/log-in*
/auth/*
/authenticate/*
/register*
/signup*
/sign-up*
/registration/*
/logout*
/signout*
/sign-out*
/log-out*
/forgot-password*
/reset-password*
/password-reset*
/recover-password*
/change-password*
/account/password/*
/user/password/*
/activate/*
/verification/*
/verify/*
/confirm/*

# Admin panels & dashboards
/admin/*
/administrator/*
/_admin/*
/backend/*
/dashboard/*
/cpanel/*
/phpmyadmin/*
/pma/*
/webmail/*
/plesk/*
/control-panel/*
/manage/*
/manager/*

# E-commerce checkout & cart
/checkout/*
/cart/*
/basket/*
/payment/*
/billing/*
/order/*
/orders/*
/purchase/*

# User account pages
/account/*
/profile/*
/settings/*
/preferences/*
/my-account/*
/user/*
/member/*
/members/*

# CGI & server scripts
/cgi-bin/*
/cgi/*
/fcgi-bin/*

# Version control & config
/.git/*
/.svn/*
/.hg/*
/.bzr/*
/.cvs/*
/.env
/.env.*
/.htaccess
/.htpasswd
/web.config
/app.config
/composer.json
/package.json

# Development & build artifacts
/node_modules/*
/vendor/*
/bower_components/*
/jspm_packages/*
/includes/*
/lib/*
/libs/*
/src/*
/dist/*
/build/*
/builds/*
/_next/*
/.next/*
/out/*
/_nuxt/*
/.nuxt/*

# Testing & development
/test/*
/tests/*
/spec/*
/specs/*
/__tests__/*
/debug/*
/dev/*
/development/*
/staging/*

# API internal endpoints
/api/internal/*
/api/admin/*
/api/private/*

# System & internal
/private/*
/system/*
/core/*
/internal/*
/tmp/*
/temp/*
/cache/*
/logs/*
/log/*
/backup/*
/backups/*
/old/*
/archive/*
/archives/*
/config/*
/configs/*
/configuration/*

# Media upload forms
/upload/*
/uploads/*
/uploader/*
/file-upload/*

# Search & filtering (often noisy for SEO)
/search*
*/search/*
?s=*
?search=*
*/filter/*
?filter=*
*/sort/*
?sort=*

# Printer-friendly & special views
/print/*
?print=*
/preview/*
?preview=*
/embed/*
?embed=*
/amp/*
/amp

# Feed URLs
/feed/*
/feeds/*
/rss/*
*.rss
/atom/*
*.atom

# Common file types to exclude from issues
*.json
*.xml
*.yaml
*.yml
*.toml
*.ini
*.conf
*.log
*.txt
*.csv
*.sql
*.db
*.bak
*.backup
*.old
*.orig
*.tmp
*.swp
*.map
*.min.js
*.min.css"##;

/// Splits exclusion pattern text into individual patterns
///
/// Lines are trimmed; blank lines and `#` comments are dropped.
pub fn parse_issue_exclusion_patterns(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// The default exclusion list, already parsed
pub fn default_issue_exclusion_patterns() -> Vec<String> {
    parse_issue_exclusion_patterns(DEFAULT_ISSUE_EXCLUSION_PATTERNS_TEXT)
}

pub(crate) fn string_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

use crate::crawler::{FetchOptions, Fetcher, NetworkError};
use crate::robots::RobotsPolicy;
use crate::WalkerError;
use url::Url;

/// The robots.txt location for the host serving `page_url`
pub fn robots_url(page_url: &Url) -> Option<Url> {
    let mut url = page_url.clone();
    url.set_path("/robots.txt");
    url.set_query(None);
    url.set_fragment(None);
    url.host_str()?;
    Some(url)
}

/// Fetches and parses robots.txt for the host of `page_url`
///
/// # Returns
///
/// * `Ok(RobotsPolicy)` - Parsed policy on 200, an allow-all policy on 404
/// * `Err(WalkerError::RobotsFetch)` - Any other status or a network failure
pub async fn fetch_robots(
    fetcher: &dyn Fetcher,
    page_url: &Url,
    options: &FetchOptions,
) -> Result<RobotsPolicy, WalkerError> {
    let robots = robots_url(page_url).ok_or_else(|| WalkerError::RobotsFetch {
        url: page_url.to_string(),
        reason: "URL has no host".to_string(),
    })?;

    let mut options = options.clone();
    options.follow_redirects = true;

    let response = fetcher
        .fetch(&robots, &options)
        .await
        .map_err(|e| WalkerError::RobotsFetch {
            url: robots.to_string(),
            reason: match e {
                NetworkError::Timeout => "Request timed out".to_string(),
                other => other.to_string(),
            },
        })?;

    match response.status {
        200 => {
            let policy = RobotsPolicy::parse(&response.body).with_source(robots.as_str());
            tracing::debug!(
                "Parsed robots.txt from {} ({} parse errors)",
                robots,
                policy.parse_errors().len()
            );
            for error in policy.parse_errors() {
                tracing::warn!("robots.txt {}: {}", robots, error);
            }
            Ok(policy)
        }
        404 => {
            tracing::debug!("No robots.txt at {}, allowing everything", robots);
            Ok(RobotsPolicy::allow_all().with_source(robots.as_str()))
        }
        status => Err(WalkerError::RobotsFetch {
            url: robots.to_string(),
            reason: format!("HTTP {}", status),
        }),
    }
}

//! robots.txt fetching and evaluation.
//!
//! The guard is consulted once per page URL when `respect_robots_txt` is
//! on. Directive matching follows the de-facto standard: rules are chosen
//! from the most specific matching User-agent group, the longest matching
//! pattern wins, and Allow beats Disallow on ties. Anything that goes wrong
//! while fetching or parsing degrades to a permissive guard so a broken
//! robots.txt never blocks a crawl.

use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::utils::constants::ROBOTS_FETCH_TIMEOUT_MS;

#[derive(Debug)]
struct Rule {
    allow: bool,
    /// Original pattern length; specificity for longest-match-wins.
    specificity: usize,
    matcher: Regex,
}

/// Crawl-directive predicate for one host.
#[derive(Debug, Default)]
pub struct RobotsGuard {
    rules: Vec<Rule>,
}

impl RobotsGuard {
    /// A guard that allows everything.
    #[must_use]
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Fetch and parse `robots.txt` for the seed's host.
    ///
    /// Always returns a guard: network errors, timeouts, non-200 statuses,
    /// and unparseable bodies all yield the permissive guard.
    pub async fn fetch(client: &reqwest::Client, seed: &Url, user_agent: &str) -> Self {
        let mut robots_url = seed.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        let request = client
            .get(robots_url.as_str())
            .header(reqwest::header::USER_AGENT, user_agent)
            .send();

        let response =
            match tokio::time::timeout(Duration::from_millis(ROBOTS_FETCH_TIMEOUT_MS), request)
                .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    log::debug!("robots.txt fetch failed for {robots_url}: {e}");
                    return Self::permissive();
                }
                Err(_) => {
                    log::debug!("robots.txt fetch timed out for {robots_url}");
                    return Self::permissive();
                }
            };

        if response.status() != reqwest::StatusCode::OK {
            log::debug!(
                "robots.txt returned {} for {robots_url}, proceeding unrestricted",
                response.status()
            );
            return Self::permissive();
        }

        match response.text().await {
            Ok(body) => Self::parse(&body, user_agent),
            Err(e) => {
                log::debug!("robots.txt body read failed for {robots_url}: {e}");
                Self::permissive()
            }
        }
    }

    /// Parse a robots.txt body, keeping the group that best matches
    /// `user_agent` (falling back to the `*` group).
    #[must_use]
    pub fn parse(body: &str, user_agent: &str) -> Self {
        // (agent tokens, raw rules) per group.
        let mut groups: Vec<(Vec<String>, Vec<(bool, String)>)> = Vec::new();
        let mut in_agent_run = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !in_agent_run {
                        groups.push((Vec::new(), Vec::new()));
                        in_agent_run = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.0.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    in_agent_run = false;
                    if let Some(group) = groups.last_mut() {
                        group.1.push((key == "allow", value.to_string()));
                    }
                }
                _ => {
                    in_agent_run = false;
                }
            }
        }

        let ua = user_agent.to_ascii_lowercase();
        // Most specific agent token that occurs in our UA string; "*" as
        // the fallback with specificity zero.
        let mut best: Option<(usize, &Vec<(bool, String)>)> = None;
        for (agents, rules) in &groups {
            for agent in agents {
                let score = if agent == "*" {
                    Some(0)
                } else if ua.contains(agent.as_str()) {
                    Some(agent.len())
                } else {
                    None
                };
                if let Some(score) = score
                    && best.is_none_or(|(prev, _)| score > prev)
                {
                    best = Some((score, rules));
                }
            }
        }

        let mut guard = Self::default();
        if let Some((_, rules)) = best {
            for (allow, pattern) in rules {
                // An empty Disallow means "allow everything": no rule.
                if pattern.is_empty() {
                    continue;
                }
                if let Some(matcher) = compile_rule(pattern) {
                    guard.rules.push(Rule {
                        allow: *allow,
                        specificity: pattern.len(),
                        matcher,
                    });
                }
            }
        }
        guard
    }

    /// Whether the directives permit fetching this URL.
    #[must_use]
    pub fn allows(&self, url: &Url) -> bool {
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        let mut verdict: Option<(usize, bool)> = None;
        for rule in &self.rules {
            if rule.matcher.is_match(&target) {
                let candidate = (rule.specificity, rule.allow);
                verdict = Some(match verdict {
                    // Longest pattern wins; Allow wins exact ties.
                    Some(current) if current.0 > candidate.0 => current,
                    Some(current) if current.0 == candidate.0 => {
                        (current.0, current.1 || candidate.1)
                    }
                    _ => candidate,
                });
            }
        }
        verdict.is_none_or(|(_, allow)| allow)
    }
}

/// Compile a robots path pattern: `*` matches any run, a trailing `$`
/// anchors the end, everything else is literal and prefix-matched.
fn compile_rule(pattern: &str) -> Option<Regex> {
    let (body, anchored) = match pattern.strip_suffix('$') {
        Some(body) => (body, true),
        None => (pattern, false),
    };

    let mut regex = String::with_capacity(pattern.len() + 4);
    regex.push('^');
    for ch in body.chars() {
        if ch == '*' {
            regex.push_str(".*");
        } else {
            regex.push_str(&regex::escape(&ch.to_string()));
        }
    }
    if anchored {
        regex.push('$');
    }
    Regex::new(&regex).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn permissive_allows_everything() {
        let guard = RobotsGuard::permissive();
        assert!(guard.allows(&url("https://a.test/anything")));
    }

    #[test]
    fn disallow_prefix() {
        let guard = RobotsGuard::parse("User-agent: *\nDisallow: /private/", UA);
        assert!(!guard.allows(&url("https://a.test/private/page")));
        assert!(guard.allows(&url("https://a.test/public/page")));
        assert!(guard.allows(&url("https://a.test/privateish")));
    }

    #[test]
    fn allow_overrides_on_longer_match() {
        let body = "User-agent: *\nDisallow: /docs/\nAllow: /docs/public/";
        let guard = RobotsGuard::parse(body, UA);
        assert!(!guard.allows(&url("https://a.test/docs/internal")));
        assert!(guard.allows(&url("https://a.test/docs/public/x")));
    }

    #[test]
    fn allow_wins_exact_ties() {
        let body = "User-agent: *\nDisallow: /p\nAllow: /p";
        let guard = RobotsGuard::parse(body, UA);
        assert!(guard.allows(&url("https://a.test/page")));
    }

    #[test]
    fn wildcard_and_anchor() {
        let body = "User-agent: *\nDisallow: /*.pdf$\nDisallow: /tmp*";
        let guard = RobotsGuard::parse(body, UA);
        assert!(!guard.allows(&url("https://a.test/files/report.pdf")));
        assert!(guard.allows(&url("https://a.test/files/report.pdf.html")));
        assert!(!guard.allows(&url("https://a.test/tmp-files/x")));
    }

    #[test]
    fn picks_matching_agent_group() {
        let body = "User-agent: specialbot\nDisallow: /\n\nUser-agent: *\nDisallow: /secret/";
        let guard = RobotsGuard::parse(body, UA);
        // We are not specialbot, so only /secret/ is off limits.
        assert!(guard.allows(&url("https://a.test/open")));
        assert!(!guard.allows(&url("https://a.test/secret/x")));

        let bot_guard = RobotsGuard::parse(body, "SpecialBot/2.0");
        assert!(!bot_guard.allows(&url("https://a.test/open")));
    }

    #[test]
    fn multiple_agent_lines_share_rules() {
        let body = "User-agent: a\nUser-agent: *\nDisallow: /x";
        let guard = RobotsGuard::parse(body, UA);
        assert!(!guard.allows(&url("https://a.test/x")));
    }

    #[test]
    fn empty_disallow_and_garbage_are_harmless() {
        let body = "User-agent: *\nDisallow:\nNonsense line\nCrawl-delay: 10";
        let guard = RobotsGuard::parse(body, UA);
        assert!(guard.allows(&url("https://a.test/anything")));
    }

    #[test]
    fn query_participates_in_matching() {
        let body = "User-agent: *\nDisallow: /*?session=";
        let guard = RobotsGuard::parse(body, UA);
        assert!(!guard.allows(&url("https://a.test/page?session=abc")));
        assert!(guard.allows(&url("https://a.test/page")));
    }
}

use serde::Deserialize;
use url::Url;

/// Which discovered links are eligible for crawling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopePolicy {
    /// Only hosts that appear in the seed list (plus `allowed-domains`)
    #[default]
    SameHost,
    /// Follow links to any host
    Any,
}

/// Crawl scope: the host policy plus any extra allowed domain patterns
///
/// The scope is applied by the extractor, so the frontier never has to know
/// about hosts at all.
#[derive(Debug, Clone)]
pub struct Scope {
    policy: ScopePolicy,
    seed_hosts: Vec<String>,
    allowed_patterns: Vec<String>,
}

impl Scope {
    /// Builds a scope from the policy, the seed URLs and extra domain patterns
    pub fn new<'a>(
        policy: ScopePolicy,
        seeds: impl IntoIterator<Item = &'a Url>,
        allowed_patterns: &[String],
    ) -> Self {
        let mut seed_hosts: Vec<String> = seeds.into_iter().filter_map(extract_domain).collect();
        seed_hosts.sort();
        seed_hosts.dedup();

        Self {
            policy,
            seed_hosts,
            allowed_patterns: allowed_patterns.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// A scope that accepts every HTTP(S) URL
    pub fn unrestricted() -> Self {
        Self {
            policy: ScopePolicy::Any,
            seed_hosts: Vec::new(),
            allowed_patterns: Vec::new(),
        }
    }

    pub fn policy(&self) -> ScopePolicy {
        self.policy
    }

    /// Returns true if the URL may be crawled under this scope
    pub fn contains(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        let host = match extract_domain(url) {
            Some(h) => h,
            None => return false,
        };

        match self.policy {
            ScopePolicy::Any => true,
            ScopePolicy::SameHost => {
                self.seed_hosts.iter().any(|seed| *seed == host)
                    || self
                        .allowed_patterns
                        .iter()
                        .any(|pattern| matches_wildcard(pattern, &host))
            }
        }
    }
}

/// Extracts the lowercase host of a URL, without port
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.COM:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks if a host matches a domain pattern
///
/// `example.com` matches only itself; `*.example.com` matches the bare domain
/// and any subdomain at any depth.
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base
            || candidate
                .strip_suffix(base)
                .is_some_and(|prefix| prefix.ends_with('.'))
    } else {
        candidate == pattern
    }
}

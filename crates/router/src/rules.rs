use crate::Request;
use derive_more::Display;
use url::{Origin, Url};

/// How a request is answered.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Always ask the origin (bypassing HTTP caches) and keep the answer;
    /// fall back to the kept copy when the origin can't be reached.
    #[display("network-first")]
    NetworkFirst,
    /// Ask the origin, never read or write the cache.
    #[display("network-only")]
    NetworkOnly,
    /// Answer from the cache at once and refresh the copy in the background.
    #[display("stale-while-revalidate")]
    StaleWhileRevalidate,
    /// No rule matched; behaves like [`NetworkOnly`](Self::NetworkOnly).
    #[display("passthrough")]
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Exact host name, compared case-insensitively.
    Host(String),
    /// URL path prefix, on any origin.
    PathPrefix(String),
    /// Scheme, host and port all equal.
    Origin(Origin),
}
impl Matcher {
    pub fn host(host: &str) -> Self {
        Self::Host(host.trim().to_ascii_lowercase())
    }

    pub fn path_prefix(prefix: impl Into<String>) -> Self {
        Self::PathPrefix(prefix.into())
    }

    pub fn origin(url: &Url) -> Self {
        Self::Origin(url.origin())
    }

    pub fn matches(&self, url: &Url) -> bool {
        match self {
            // `Url` lowercases hosts on parse.
            Self::Host(host) => url.host_str() == Some(host.as_str()),
            Self::PathPrefix(prefix) => url.path().starts_with(prefix.as_str()),
            Self::Origin(origin) => url.origin() == *origin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub matcher: Matcher,
    pub strategy: Strategy,
}

/// Ordered routing rules; the first rule matching a request wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    rules: Vec<Rule>,
}
impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule after every existing one.
    pub fn rule(mut self, matcher: Matcher, strategy: Strategy) -> Self {
        self.rules.push(Rule { matcher, strategy });
        self
    }

    /// The application's policy, in priority order:
    ///
    /// 1. manifest/catalog JSON hosts: network-first
    /// 2. large-media hosts: network-only (the synchronizer owns that content)
    /// 3. live-only path prefixes: network-only
    /// 4. the application's own origin (if known): stale-while-revalidate
    pub fn standard<S: AsRef<str>>(
        app_origin: Option<&Url>,
        manifest_hosts: &[S],
        media_hosts: &[S],
        live_paths: &[S],
    ) -> Self {
        let mut table = Self::new();
        for host in manifest_hosts {
            table = table.rule(Matcher::host(host.as_ref()), Strategy::NetworkFirst);
        }
        for host in media_hosts {
            table = table.rule(Matcher::host(host.as_ref()), Strategy::NetworkOnly);
        }
        for prefix in live_paths {
            table = table.rule(Matcher::path_prefix(prefix.as_ref()), Strategy::NetworkOnly);
        }
        match app_origin {
            Some(origin) => table.rule(Matcher::origin(origin), Strategy::StaleWhileRevalidate),
            None => table,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn resolve(&self, request: &Request) -> Strategy {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(request.url()))
            .map_or(Strategy::Passthrough, |rule| rule.strategy)
    }
}

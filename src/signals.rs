//! Page signals consumed by the engine.
//!
//! The engine never inspects a page itself. A host (content script bridge,
//! headless browser, test harness) implements [`PageSignals`]; every method is
//! a synchronous read of data the host already has. Any method may fail with
//! a [`SignalError`], which the engine treats as "no match" for the rules that
//! depend on that channel.

use crate::compile::{CompiledMatcher, CompiledPattern};
use crate::enums::Channel;
use crate::error::{SignalError, SignalErrorKind};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

/// Signal extractor interface.
pub trait PageSignals {
    fn url(&self) -> Result<String, SignalError>;

    /// Lowercased hostname. Derived from [`PageSignals::url`] unless overridden.
    fn hostname(&self) -> Result<String, SignalError> {
        hostname_of(&self.url()?)
    }

    fn title(&self) -> Result<String, SignalError>;

    /// Serialized DOM text (visible text and markup the host chooses to expose).
    fn page_text(&self) -> Result<String, SignalError>;

    fn query_selector_exists(&self, selector: &str) -> Result<bool, SignalError>;

    /// Origins (or full URLs) of externally loaded scripts, styles and images.
    fn resource_origins(&self) -> Result<BTreeSet<String>, SignalError>;

    fn referrer(&self) -> Result<String, SignalError>;
}

/// Extracts the lowercased host of a URL.
pub fn hostname_of(url: &str) -> Result<String, SignalError> {
    let parsed = url::Url::parse(url).map_err(|e| SignalError {
        kind: SignalErrorKind::InvalidUrl,
        message: format!("cannot parse url '{}': {}", url, e),
    })?;
    parsed
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| SignalError {
            kind: SignalErrorKind::InvalidUrl,
            message: format!("url '{}' has no host", url),
        })
}

/// An owned snapshot of page signals.
///
/// Useful for hosts that ship signals across a process or language boundary
/// as JSON, and for tests. Selectors are answered by exact lookup in
/// `selectors`; channels listed in `unavailable` fail with
/// [`SignalErrorKind::Unavailable`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StaticSignals {
    pub url: String,
    pub title: String,
    pub page_text: String,
    pub selectors: BTreeSet<String>,
    pub resource_origins: BTreeSet<String>,
    pub referrer: String,
    pub unavailable: BTreeSet<Channel>,
}

impl StaticSignals {
    pub fn new(url: impl Into<String>) -> Self {
        StaticSignals {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_page_text(mut self, text: impl Into<String>) -> Self {
        self.page_text = text.into();
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selectors.insert(selector.into());
        self
    }

    pub fn with_resource(mut self, origin: impl Into<String>) -> Self {
        self.resource_origins.insert(origin.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    /// Makes every read of `channel` fail.
    pub fn with_unavailable(mut self, channel: Channel) -> Self {
        self.unavailable.insert(channel);
        self
    }

    fn check(&self, channel: Channel) -> Result<(), SignalError> {
        if self.unavailable.contains(&channel) {
            return Err(SignalError::unavailable(format!(
                "{} is unavailable",
                channel
            )));
        }
        Ok(())
    }
}

impl PageSignals for StaticSignals {
    fn url(&self) -> Result<String, SignalError> {
        self.check(Channel::Url)?;
        Ok(self.url.clone())
    }

    fn hostname(&self) -> Result<String, SignalError> {
        self.check(Channel::Hostname)?;
        hostname_of(&self.url)
    }

    fn title(&self) -> Result<String, SignalError> {
        self.check(Channel::Title)?;
        Ok(self.title.clone())
    }

    fn page_text(&self) -> Result<String, SignalError> {
        self.check(Channel::PageText)?;
        Ok(self.page_text.clone())
    }

    fn query_selector_exists(&self, selector: &str) -> Result<bool, SignalError> {
        self.check(Channel::Selector)?;
        Ok(self.selectors.contains(selector))
    }

    fn resource_origins(&self) -> Result<BTreeSet<String>, SignalError> {
        self.check(Channel::ResourceOrigin)?;
        Ok(self.resource_origins.clone())
    }

    fn referrer(&self) -> Result<String, SignalError> {
        self.check(Channel::Referrer)?;
        Ok(self.referrer.clone())
    }
}

// ─── Per-evaluation view ────────────────────────────────────────────────────

/// Reads each text channel once per evaluation and caches selector queries.
/// Failed reads are remembered so the verdict can report them.
pub(crate) struct SignalView<'a> {
    signals: &'a dyn PageSignals,
    url: Option<String>,
    hostname: Option<String>,
    title: Option<String>,
    page_text: Option<String>,
    referrer: Option<String>,
    resource_origins: Option<Vec<String>>,
    selector_cache: RefCell<HashMap<String, bool>>,
    unavailable: RefCell<BTreeSet<Channel>>,
}

impl<'a> SignalView<'a> {
    pub(crate) fn new(signals: &'a dyn PageSignals) -> Self {
        let unavailable = RefCell::new(BTreeSet::new());
        let read = |channel: Channel, result: Result<String, SignalError>| match result {
            Ok(v) => Some(v),
            Err(e) => {
                log::debug!("signal {} unavailable: {}", channel, e);
                unavailable.borrow_mut().insert(channel);
                None
            }
        };
        let url = read(Channel::Url, signals.url());
        let hostname = read(Channel::Hostname, signals.hostname());
        let title = read(Channel::Title, signals.title());
        let page_text = read(Channel::PageText, signals.page_text());
        let referrer = read(Channel::Referrer, signals.referrer());
        let resource_origins = match signals.resource_origins() {
            Ok(set) => Some(set.into_iter().collect()),
            Err(e) => {
                log::debug!("signal {} unavailable: {}", Channel::ResourceOrigin, e);
                unavailable.borrow_mut().insert(Channel::ResourceOrigin);
                None
            }
        };

        SignalView {
            signals,
            url,
            hostname,
            title,
            page_text,
            referrer,
            resource_origins,
            selector_cache: RefCell::new(HashMap::new()),
            unavailable,
        }
    }

    /// Text of a single-valued channel, `None` if it could not be read.
    pub(crate) fn text(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Url => self.url.as_deref(),
            Channel::Hostname => self.hostname.as_deref(),
            Channel::Title => self.title.as_deref(),
            Channel::PageText => self.page_text.as_deref(),
            Channel::Referrer => self.referrer.as_deref(),
            Channel::Selector | Channel::ResourceOrigin => None,
        }
    }

    pub(crate) fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub(crate) fn resource_origins(&self) -> &[String] {
        self.resource_origins.as_deref().unwrap_or_default()
    }

    pub(crate) fn selector_exists(&self, selector: &str) -> bool {
        if let Some(hit) = self.selector_cache.borrow().get(selector) {
            return *hit;
        }
        let hit = match self.signals.query_selector_exists(selector) {
            Ok(hit) => hit,
            Err(e) => {
                log::debug!("selector query '{}' failed: {}", selector, e);
                self.unavailable.borrow_mut().insert(Channel::Selector);
                false
            }
        };
        self.selector_cache
            .borrow_mut()
            .insert(selector.to_string(), hit);
        hit
    }

    /// Tests a compiled pattern against the channel it is bound to.
    pub(crate) fn matches(&self, pattern: &CompiledPattern) -> bool {
        match (&pattern.matcher, pattern.channel) {
            (CompiledMatcher::Selector(selector), _) => self.selector_exists(selector),
            (matcher, Channel::ResourceOrigin) => {
                self.resource_origins().iter().any(|o| matcher.is_match(o))
            }
            (matcher, channel) => self.text(channel).is_some_and(|t| matcher.is_match(t)),
        }
    }

    /// Tests a text matcher against the page text and the referrer.
    pub(crate) fn matches_text_or_referrer(&self, matcher: &CompiledMatcher) -> bool {
        [Channel::PageText, Channel::Referrer]
            .into_iter()
            .any(|c| self.text(c).is_some_and(|t| matcher.is_match(t)))
    }

    pub(crate) fn unavailable_channels(&self) -> Vec<Channel> {
        self.unavailable.borrow().iter().copied().collect()
    }
}

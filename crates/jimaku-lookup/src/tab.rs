//! Per-tab indicator state machine.
//!
//! Every navigation or activation re-runs classification and lookup from
//! scratch. Work for a tab goes through that tab's own queue so results are
//! applied in event order, and the tab's remembered link is dropped before
//! each attempt so a click can never reach a link from an earlier page.

use crate::api::{DeepLinks, SearchField};
use crate::classifier::{classify, MediaReference};
use crate::resolver::{Lookup, LookupManager};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Browser tab identifier
pub type TabId = u64;

/// Snapshot of a browser tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub id: TabId,
    pub url: String,
}

impl Tab {
    pub fn new(id: TabId, url: impl Into<String>) -> Self {
        Self { id, url: url.into() }
    }
}

/// What the indicator does when shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorMode {
    /// Clicking opens the settings surface
    PromptForCredential,
    /// Clicking opens the resolved link
    OpenLink,
}

/// Indicator state of a tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabState {
    Unauthenticated,
    NoMatch,
    Resolved(String),
}

impl TabState {
    pub fn from_resolution(url: Option<String>) -> Self {
        url.map_or(TabState::NoMatch, TabState::Resolved)
    }
}

/// Result of clicking the indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    OpenedSettings,
    OpenedLink(String),
    Ignored,
}

/// What has to happen before a tab can settle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Settle(TabState),
    Search { field: SearchField, key: String },
}

/// Decide the next step for a tab from its classification and whether an
/// API key is present
pub fn plan(reference: Option<&MediaReference>, authenticated: bool, links: &DeepLinks) -> Step {
    if !authenticated {
        return Step::Settle(TabState::Unauthenticated);
    }
    let Some(reference) = reference else {
        return Step::Settle(TabState::NoMatch);
    };
    match Lookup::for_reference(reference, links) {
        Lookup::Direct(url) => Step::Settle(TabState::Resolved(url)),
        Lookup::Search { field, key } => Step::Search { field, key },
    }
}

/// Browser capabilities the handler drives
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// The active tab of the current window
    async fn active_tab(&self) -> Result<Option<Tab>>;

    async fn show_indicator(&self, tab_id: TabId, mode: IndicatorMode) -> Result<()>;

    async fn hide_indicator(&self, tab_id: TabId) -> Result<()>;

    async fn open_tab(&self, url: &str) -> Result<()>;

    async fn open_settings(&self) -> Result<()>;
}

type Transition = (Tab, oneshot::Sender<Result<TabState>>);

struct Inner<H> {
    host: H,
    lookup: LookupManager,
    resolved: Mutex<HashMap<TabId, String>>,
    queues: Mutex<HashMap<TabId, mpsc::UnboundedSender<Transition>>>,
}

/// Handles tab events for a host
pub struct TabActionHandler<H> {
    inner: Arc<Inner<H>>,
}

impl<H: Host> TabActionHandler<H> {
    pub fn new(host: H, lookup: LookupManager) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                lookup,
                resolved: Mutex::new(HashMap::new()),
                queues: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    pub fn lookup(&self) -> &LookupManager {
        &self.inner.lookup
    }

    /// Link remembered for a tab's current page
    pub fn resolved_url(&self, tab_id: TabId) -> Option<String> {
        self.inner.resolved().get(&tab_id).cloned()
    }

    /// Evaluate the active tab once the credential has been loaded
    pub async fn startup(&self) -> Result<Option<TabState>> {
        match self.inner.host.active_tab().await? {
            Some(tab) => self.handle_tab(tab).await.map(Some),
            None => Ok(None),
        }
    }

    /// A tab was updated; only URL changes of the active tab matter
    pub async fn on_tab_updated(
        &self,
        tab_id: TabId,
        changed_url: Option<&str>,
    ) -> Result<Option<TabState>> {
        if changed_url.is_none() {
            return Ok(None);
        }

        let Some(active) = self.inner.host.active_tab().await? else {
            return Ok(None);
        };
        if active.id != tab_id {
            debug!(tab_id, active_tab = active.id, "Ignoring update of background tab");
            return Ok(None);
        }

        self.handle_tab(active).await.map(Some)
    }

    pub async fn on_tab_activated(&self, tab: Tab) -> Result<TabState> {
        self.handle_tab(tab).await
    }

    pub async fn on_indicator_clicked(&self, tab_id: TabId) -> Result<ClickOutcome> {
        if !self.inner.lookup.credentials().is_authenticated() {
            self.inner.host.open_settings().await?;
            return Ok(ClickOutcome::OpenedSettings);
        }

        match self.resolved_url(tab_id) {
            Some(url) => {
                info!(tab_id, url = %url, "Opening subtitle page");
                self.inner.host.open_tab(&url).await?;
                Ok(ClickOutcome::OpenedLink(url))
            }
            None => Ok(ClickOutcome::Ignored),
        }
    }

    /// Drop everything held for a closed tab
    pub fn on_tab_removed(&self, tab_id: TabId) {
        // Same lock order as `Inner::remember`
        let mut queues = self.inner.queues();
        queues.remove(&tab_id);
        self.inner.resolved().remove(&tab_id);
        drop(queues);
        debug!(tab_id, "Tab removed");
    }

    /// Queue a re-evaluation of a tab and wait for it to settle
    pub async fn handle_tab(&self, tab: Tab) -> Result<TabState> {
        let (reply, settled) = oneshot::channel();
        self.queue_for(tab.id)
            .send((tab, reply))
            .map_err(|_| anyhow!("Tab queue closed"))?;

        settled.await.context("Tab worker stopped")?
    }

    fn queue_for(&self, tab_id: TabId) -> mpsc::UnboundedSender<Transition> {
        let mut queues = self.inner.queues();
        if let Some(queue) = queues.get(&tab_id).filter(|q| !q.is_closed()) {
            return queue.clone();
        }

        let (queue, mut pending) = mpsc::unbounded_channel::<Transition>();
        let inner: Weak<Inner<H>> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            while let Some((tab, reply)) = pending.recv().await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let _ = reply.send(inner.transition(tab).await);
            }
        });

        queues.insert(tab_id, queue.clone());
        queue
    }
}

impl<H: Host> Inner<H> {
    async fn transition(&self, tab: Tab) -> Result<TabState> {
        self.resolved().remove(&tab.id);

        let reference = classify(&tab.url);
        let credentials = self.lookup.credentials();
        let step = plan(
            reference.as_ref(),
            credentials.is_authenticated(),
            self.lookup.links(),
        );

        let state = match step {
            Step::Settle(state) => state,
            Step::Search { field, key } => match self.lookup.resolve(field, &key).await {
                // The key may have been rejected during the lookup
                Ok(_) if !credentials.is_authenticated() => TabState::Unauthenticated,
                Ok(url) => TabState::from_resolution(url),
                Err(e) => {
                    warn!(tab_id = tab.id, key = %key, error = %e, "Lookup failed");
                    TabState::NoMatch
                }
            },
        };

        self.apply(tab.id, &state).await?;
        info!(tab_id = tab.id, url = %tab.url, state = ?state, "Tab state updated");
        Ok(state)
    }

    async fn apply(&self, tab_id: TabId, state: &TabState) -> Result<()> {
        match state {
            TabState::Unauthenticated => {
                self.host
                    .show_indicator(tab_id, IndicatorMode::PromptForCredential)
                    .await
            }
            TabState::NoMatch => self.host.hide_indicator(tab_id).await,
            TabState::Resolved(url) => {
                if !self.remember(tab_id, url) {
                    debug!(tab_id, "Tab closed during lookup");
                    return Ok(());
                }
                self.host
                    .show_indicator(tab_id, IndicatorMode::OpenLink)
                    .await
            }
        }
    }

    /// Record the link for a tab that is still open
    fn remember(&self, tab_id: TabId, url: &str) -> bool {
        let queues = self.queues();
        if !queues.contains_key(&tab_id) {
            return false;
        }
        self.resolved().insert(tab_id, url.to_string());
        true
    }

    fn resolved(&self) -> MutexGuard<'_, HashMap<TabId, String>> {
        self.resolved.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<TabId, mpsc::UnboundedSender<Transition>>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//! The page document, as far as theming needs it: stylesheet links tagged with
//! a theme-id marker.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Marker attribute carried by every theme stylesheet link.
pub const THEME_ID_ATTR: &str = "data-theme-id";

/// A stylesheet link node attached to the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StylesheetLink {
    pub node_id: u64,
    /// Value of the [`THEME_ID_ATTR`] marker.
    pub theme_id: String,
    pub href: String,
}

#[async_trait]
pub trait Document: Send + Sync {
    /// Create a stylesheet link for `href`, tagged with `theme_id`, and attach it.
    fn attach_stylesheet(&self, theme_id: &str, href: &str) -> StylesheetLink;

    /// Whether the stylesheet behind `link` finished loading. Errors are
    /// treated as "not yet".
    fn probe_loaded(&self, link: &StylesheetLink) -> anyhow::Result<bool>;

    /// Attached theme links, in attachment order.
    fn theme_links(&self) -> Vec<StylesheetLink>;

    fn remove_link(&self, link: &StylesheetLink);

    /// Remove links by marker value, or every marked link when `None`.
    fn remove_theme_links(&self, theme_id: Option<&str>) {
        for link in self.theme_links() {
            if theme_id.map_or(true, |id| link.theme_id == id) {
                self.remove_link(&link);
            }
        }
    }

    /// Completes once the stylesheet has loaded. Implementations with a real
    /// load event should override this; the default polls [`probe_loaded`].
    ///
    /// [`probe_loaded`]: Document::probe_loaded
    async fn wait_loaded(&self, link: &StylesheetLink, poll_interval: Duration) {
        loop {
            match self.probe_loaded(link) {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => tracing::trace!(href = %link.href, error = %e, "stylesheet probe failed"),
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// How a [`HeadlessDocument`] stylesheet behaves once attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBehavior {
    /// Loaded once this much time has passed since attachment.
    After(Duration),
    /// Never loads.
    Never,
    /// Every probe fails.
    Unreadable,
}

struct Attached {
    link: StylesheetLink,
    at: Instant,
}

/// In-memory document for server mode, the host binary and tests.
///
/// Uses tokio's clock, so paused-time tests drive it deterministically.
pub struct HeadlessDocument {
    links: Mutex<Vec<Attached>>,
    behaviors: DashMap<String, LoadBehavior>,
    default_behavior: LoadBehavior,
    next_node: AtomicU64,
}

impl Default for HeadlessDocument {
    fn default() -> Self {
        Self::new(LoadBehavior::After(Duration::ZERO))
    }
}

impl std::fmt::Debug for HeadlessDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessDocument")
            .field("links", &self.links.lock().len())
            .field("default_behavior", &self.default_behavior)
            .finish()
    }
}

impl HeadlessDocument {
    pub fn new(default_behavior: LoadBehavior) -> Self {
        Self {
            links: Mutex::new(Vec::new()),
            behaviors: DashMap::new(),
            default_behavior,
            next_node: AtomicU64::new(1),
        }
    }

    /// Override the behavior for one stylesheet URL.
    pub fn set_behavior(&self, href: &str, behavior: LoadBehavior) {
        self.behaviors.insert(href.to_string(), behavior);
    }

    pub fn with_behavior(self, href: &str, behavior: LoadBehavior) -> Self {
        self.set_behavior(href, behavior);
        self
    }

    /// Marker values of attached links, in order.
    pub fn attached_theme_ids(&self) -> Vec<String> {
        self.links
            .lock()
            .iter()
            .map(|a| a.link.theme_id.clone())
            .collect()
    }
}

impl Document for HeadlessDocument {
    fn attach_stylesheet(&self, theme_id: &str, href: &str) -> StylesheetLink {
        let link = StylesheetLink {
            node_id: self.next_node.fetch_add(1, Ordering::Relaxed),
            theme_id: theme_id.to_string(),
            href: href.to_string(),
        };
        self.links.lock().push(Attached {
            link: link.clone(),
            at: Instant::now(),
        });
        link
    }

    fn probe_loaded(&self, link: &StylesheetLink) -> anyhow::Result<bool> {
        let attached_at = self
            .links
            .lock()
            .iter()
            .find(|a| a.link.node_id == link.node_id)
            .map(|a| a.at)
            .ok_or_else(|| anyhow::anyhow!("link {} is not attached", link.node_id))?;

        let behavior = self
            .behaviors
            .get(&link.href)
            .map(|b| *b.value())
            .unwrap_or(self.default_behavior);
        match behavior {
            LoadBehavior::After(delay) => Ok(attached_at.elapsed() >= delay),
            LoadBehavior::Never => Ok(false),
            LoadBehavior::Unreadable => anyhow::bail!("stylesheet rules are not accessible"),
        }
    }

    fn theme_links(&self) -> Vec<StylesheetLink> {
        self.links.lock().iter().map(|a| a.link.clone()).collect()
    }

    fn remove_link(&self, link: &StylesheetLink) {
        self.links.lock().retain(|a| a.link.node_id != link.node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_by_marker_or_all() {
        let doc = HeadlessDocument::default();
        doc.attach_stylesheet("dark1", "/dark1.css");
        doc.attach_stylesheet("light2", "/light2.css");
        doc.attach_stylesheet("dark1", "/dark1.css");

        doc.remove_theme_links(Some("dark1"));
        assert_eq!(doc.attached_theme_ids(), vec!["light2"]);

        doc.attach_stylesheet("x", "/x.css");
        doc.remove_theme_links(None);
        assert!(doc.theme_links().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_stylesheet_loads_after_delay() {
        let doc = HeadlessDocument::default()
            .with_behavior("/slow.css", LoadBehavior::After(Duration::from_millis(300)));
        let link = doc.attach_stylesheet("slow", "/slow.css");
        assert!(!doc.probe_loaded(&link).unwrap());

        let started = Instant::now();
        doc.wait_loaded(&link, Duration::from_millis(10)).await;
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(doc.probe_loaded(&link).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn probe_errors_are_not_fatal_to_waiting() {
        let doc = HeadlessDocument::new(LoadBehavior::Unreadable);
        let link = doc.attach_stylesheet("t", "/t.css");
        assert!(doc.probe_loaded(&link).is_err());

        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            doc.wait_loaded(&link, Duration::from_millis(10)),
        )
        .await;
        assert!(waited.is_err());
    }

    #[test]
    fn detached_link_probe_fails() {
        let doc = HeadlessDocument::default();
        let link = doc.attach_stylesheet("t", "/t.css");
        doc.remove_link(&link);
        assert!(doc.probe_loaded(&link).is_err());
    }
}

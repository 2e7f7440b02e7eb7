use tokio_util::sync::CancellationToken;

use super::document::{Document, StylesheetLink};
use super::{Theme, ThemeTimings};

/// How a stylesheet load ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(StylesheetLink),
    /// The stylesheet did not load within the timeout; its link was removed.
    TimedOut,
    /// The load was cancelled; its link was removed.
    Cancelled,
}

/// Attach `theme`'s stylesheet and wait until it loads, the timeout elapses
/// or `cancel` fires. Only a loaded link stays attached.
pub async fn load_theme(
    document: &dyn Document,
    theme: &Theme,
    timings: &ThemeTimings,
    cancel: &CancellationToken,
) -> LoadOutcome {
    let link = document.attach_stylesheet(&theme.id, &theme.url);
    tracing::debug!(theme = %theme.id, href = %theme.url, node = link.node_id, "stylesheet attached");

    let wait = tokio::time::timeout(
        timings.timeout,
        document.wait_loaded(&link, timings.poll_interval),
    );

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            document.remove_link(&link);
            LoadOutcome::Cancelled
        }
        res = wait => match res {
            Ok(()) => LoadOutcome::Loaded(link),
            Err(_) => {
                document.remove_link(&link);
                LoadOutcome::TimedOut
            }
        }
    }
}

//! Page recorded as a JSON script, for replays outside a browser.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use futures_util::Stream;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::entities::{ElementId, PageEvent, UrlDetails};
use crate::domain::ports::PagePort;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read page script: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed page script: {0}")]
    Json(#[from] serde_json::Error),
}

/// An image present when the page loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedImage {
    /// Element identity.
    pub id: ElementId,
    /// Initial source.
    pub src: String,
}

/// One event, delivered `delay_ms` after the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Delay before delivery.
    #[serde(default)]
    pub delay_ms: u64,
    /// The event.
    pub event: PageEvent,
}

/// A recorded page: its images and the events it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageScript {
    /// Page URL.
    pub url: String,
    /// Images in document order.
    #[serde(default)]
    pub images: Vec<ScriptedImage>,
    /// Event feed.
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

impl PageScript {
    /// Reads a script from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, ScriptError> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Splits the script into a page and its timed event feed.
    #[must_use]
    pub fn into_parts(self) -> (ScriptedPage, impl Stream<Item = PageEvent> + Unpin) {
        let page = ScriptedPage::new(&self.url, self.images);
        let feed = Box::pin(stream::unfold(
            self.steps.into_iter(),
            |mut steps| async move {
                let step = steps.next()?;
                if step.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
                }
                Some((step.event, steps))
            },
        ));
        (page, feed)
    }
}

/// In-memory page that records every source assignment.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScriptedPage {
    url: String,
    host: String,
    sources: BTreeMap<ElementId, String>,
    assignments: Vec<(ElementId, String)>,
}

impl ScriptedPage {
    /// Creates a page holding `images`.
    #[must_use]
    pub fn new(url: &str, images: Vec<ScriptedImage>) -> Self {
        Self {
            url: url.to_string(),
            host: UrlDetails::parse(url).domain,
            sources: images.into_iter().map(|img| (img.id, img.src)).collect(),
            assignments: Vec::new(),
        }
    }

    /// Source assignments in the order they happened.
    #[must_use]
    pub fn assignments(&self) -> &[(ElementId, String)] {
        &self.assignments
    }

    /// Final source of every image.
    #[must_use]
    pub fn sources(&self) -> &BTreeMap<ElementId, String> {
        &self.sources
    }
}

impl PagePort for ScriptedPage {
    fn page_url(&self) -> &str {
        &self.url
    }

    fn hostname(&self) -> &str {
        &self.host
    }

    fn images(&self) -> Vec<ElementId> {
        self.sources.keys().copied().collect()
    }

    fn source(&self, id: ElementId) -> Option<String> {
        self.sources.get(&id).cloned()
    }

    fn set_source(&mut self, id: ElementId, url: &str) {
        self.sources.insert(id, url.to_string());
        self.assignments.push((id, url.to_string()));
    }
}

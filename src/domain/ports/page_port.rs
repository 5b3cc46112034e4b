//! Port definition for the page DOM.

use crate::domain::entities::ElementId;

/// Read/write access to the image elements of one page.
///
/// Implementations live on the page's event-loop thread and need not be `Send`.
pub trait PagePort {
    /// Full URL of the page.
    fn page_url(&self) -> &str;

    /// Hostname of the page.
    fn hostname(&self) -> &str;

    /// Every image element currently in the document, in document order.
    fn images(&self) -> Vec<ElementId>;

    /// Current source of an image, or `None` if it is gone or has none.
    fn source(&self, id: ElementId) -> Option<String>;

    /// Assigns a new source to an image.
    fn set_source(&mut self, id: ElementId, url: &str);
}

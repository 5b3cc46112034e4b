//! Events delivered by a page's change feed.

use serde::{Deserialize, Serialize};

use super::image::ElementId;
use super::settings::ExtensionMessage;

/// Image attributes whose changes are watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchedAttribute {
    /// `src`
    Src,
    /// `srcset`
    Srcset,
    /// `data-src`
    DataSrc,
    /// `data-srcset`
    DataSrcset,
}

/// A single observed change to the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomMutation {
    /// Nodes were inserted; carries every image in the inserted subtrees.
    Added(Vec<ElementId>),
    /// A watched attribute changed on an image.
    AttributeChanged {
        /// The image.
        id: ElementId,
        /// Which attribute.
        attribute: WatchedAttribute,
    },
    /// Images left the document.
    Removed(Vec<ElementId>),
}

/// Document visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Tab is in front.
    Visible,
    /// Tab is in the background.
    Hidden,
}

/// Everything a page session reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PageEvent {
    /// DOM content is ready.
    DocumentReady,
    /// A batch of DOM mutations.
    Mutations(Vec<DomMutation>),
    /// The page scrolled.
    Scroll,
    /// The window `load` event fired.
    WindowLoad,
    /// An AJAX request completed.
    AjaxComplete,
    /// Visibility changed.
    VisibilityChanged(Visibility),
    /// An image finished loading `url`.
    ImageLoaded {
        /// The image.
        id: ElementId,
        /// Source that loaded.
        url: String,
    },
    /// An image failed to load `url`.
    ImageFailed {
        /// The image.
        id: ElementId,
        /// Source that failed.
        url: String,
    },
    /// A settings message arrived.
    Message(ExtensionMessage),
    /// The page is closing.
    Unload,
}

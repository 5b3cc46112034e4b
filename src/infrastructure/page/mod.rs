//! Page drivers.

pub mod runtime;
pub mod scripted;

pub use runtime::{PageRunReport, PageRuntime};
pub use scripted::{PageScript, ScriptError, ScriptStep, ScriptedImage, ScriptedPage};

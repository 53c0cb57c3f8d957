//! Content transform collaborators (spec §6): the cleaner that narrows a
//! fetched page to its main content, and the Markdown/text transformer
//! run after it.

pub mod cleaner;
pub mod markdown;

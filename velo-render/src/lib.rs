//! # velo-render
//!
//! Template rendering library for velo.
//!
//! Pages come from user templates in the template directory when present
//! (`index.html`, `post.html` with `{{Placeholder}}` substitution) and from
//! built-in Askama layouts otherwise.

pub mod custom;
pub mod site;
pub mod templates;

pub use site::SiteTemplates;
pub use templates::{render_category_tree, IndexTemplate, PostEntry, PostTemplate};

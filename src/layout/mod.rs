//! Output layout: where pages and shared assets land on disk.
//!
//! ```text
//! <root>/
//!   _images/                      shared attachments, images, emoticons
//!   _static/confluence.css        shared stylesheet
//!   <rootId>-<Title>.html         export root page (prefix "")
//!   <childId>-<Title>/            child page directory (prefix "../")
//!     <childId>-<Title>.html
//!     <grandId>-<Title>/          grandchild directory (prefix "../../")
//! ```

mod fs;
mod paths;
mod sanitize;

pub use fs::{DEFAULT_STYLESHEET, STYLESHEET_NAME, bootstrap, write_atomic};
pub use paths::{ExportLayout, IMAGES_DIR, OutputPaths, STATIC_DIR, relative_prefix};
pub use sanitize::{sanitize_file_name, sanitize_title};

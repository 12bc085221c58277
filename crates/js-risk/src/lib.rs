pub mod classify;
pub mod syntax;
pub mod templates;
pub mod types;

pub use classify::{classify, uses_native_api, UrlFamily};
pub use templates::{find_template, templates, PayloadTemplate};
pub use types::{RiskTier, RiskVerdict};

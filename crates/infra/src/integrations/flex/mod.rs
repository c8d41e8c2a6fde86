//! Flex web-service report protocol
//!
//! `SendRequest` (template) → `ReferenceCode` + `Url` → `GetStatement`
//! (report) → envelope-stripped table.

mod fetcher;
mod template;

pub use fetcher::ReportFetcher;
pub use template::TemplateResponse;

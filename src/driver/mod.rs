pub mod common;
pub mod redirect;
pub mod traits;
pub mod web;

pub use redirect::{RedirectRecord, RedirectTracker};
pub use traits::{BrowserLauncher, BrowserSession, NavigationOutcome, PageHandle, StoredCookie};
pub use web::{BrowserType, PlaywrightLauncher, WebDriverConfig};

mod driver;

pub use driver::{target_to_selector, BrowserType, PlaywrightLauncher, WebDriverConfig};

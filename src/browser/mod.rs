pub mod headless;

pub use headless::{launch_headless_browser, open_blank_page};

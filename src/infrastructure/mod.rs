//! 基础设施层（Infrastructure）
//!
//! 持有稀缺资源（浏览器页面、外部进程、文件），只暴露能力

pub mod browser_session;
pub mod image_converter;
pub mod publisher;

pub use browser_session::{BrowserSession, PageSession};
pub use image_converter::{Converter, ExternalConverter, ImageConverter, MonochromeConverter};

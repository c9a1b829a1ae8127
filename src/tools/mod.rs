//! 工具箱：搜索、维基百科、网页抓取、沙箱文件、推送通知、Python、浏览器（可选）与执行器

pub mod executor;
pub mod fetch;
pub mod filesystem;
pub mod push;
pub mod python;
pub mod registry;
pub mod search;
pub mod wikipedia;

#[cfg(feature = "browser")]
pub mod browser;

pub use executor::ToolExecutor;
pub use fetch::FetchPageTool;
pub use filesystem::{ListDirectoryTool, ReadFileTool, SafeFs, WriteFileTool};
pub use push::{PushNotificationTool, PushoverCredentials};
pub use python::PythonTool;
pub use registry::{Tool, ToolRegistry};
pub use search::SerperSearchTool;
pub use wikipedia::WikipediaTool;

#[cfg(feature = "browser")]
pub use browser::{BrowserHandle, BrowserTool};

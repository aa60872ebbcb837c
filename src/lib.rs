pub mod cache;
pub mod chain;
pub mod compression;
pub mod config;
pub mod cors;
pub mod exception;
pub mod listing;
pub mod param;
pub mod path;
pub mod pipeline;
pub mod request;
pub mod responder;
pub mod response;
pub mod security;
pub mod server;
pub mod util;

pub use cache::{ResponseCache, ResponseStore};
pub use chain::{Handler, Middleware, MiddlewareChain, Next};
pub use config::Config;
pub use exception::Exception;
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use path::PathContext;
pub use pipeline::Pipeline;
pub use request::Request;
pub use responder::StaticResponder;
pub use response::{Body, Response};
pub use util::HtmlBuilder;

#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::too_many_lines
)]

mod body;
mod config;
mod connection;
mod error;
mod flags;
mod frame;
mod handler;
mod hpack;
mod settings;
mod stream;
mod types;

pub use config::Config;
pub use connection::serve;
pub use error::{ConnectionError, ErrorCode, ServeError, StreamError};
pub use handler::{refuse, FuncHandler, Handler, Request, Response};
pub use types::{HeaderPair, Headers};

// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

pub mod cache;
pub mod config;
pub mod engine;
pub mod etag;
pub mod exception;
pub mod fs;
pub mod immutable;
pub mod logger;
pub mod param;
pub mod range;
pub mod request;
pub mod resolver;
pub mod response;
pub mod util;

pub use config::{EngineConfig, FolderConfig, PartialEngineConfig};
pub use engine::{
    Body, ConditionalHeaders, EngineStats, FileLookup, LookupOptions, ServeResult, StaticEngine,
};
pub use exception::{Exception, LookupError};
pub use fs::{FileStat, FileSystem, TokioFs};
pub use logger::{EngineLogger, LogFacade};
pub use param::{HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::Response;
pub use util::HtmlBuilder;

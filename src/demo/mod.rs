//! A runnable demo application built on top of the core server: static
//! file serving, the way `original_source`'s `request_handler` middlewares
//! do it. Keeps the core crate (coroutines, scheduler, parser) free of any
//! routing or content-generation concerns, per spec.md's Non-goals.

mod mime;
mod static_files;

pub use static_files::StaticFileHandler;

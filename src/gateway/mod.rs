//! HTTP gateway for Memoria
//!
//! Exposes ingest, memory CRUD/search, folders, calendar events, advice,
//! combined search, chat transcripts and audio registration as a JSON API
//! over an [`Assistant`].
//!
//! [`Assistant`]: crate::assistant::Assistant

mod error;
mod handler;
mod server;

pub use error::{ApiError, ApiErrorDetail};
pub use handler::{api_router, UserId, USER_HEADER};
pub use server::{build_app, ctrl_c, serve};

//! Core types and traits for the question-bank job API.
//!
//! Request/response DTOs mirror the web client's shared type contract for JSON compatibility.

mod dto;
mod job;
mod log;
mod question;
mod status;
mod traits;

pub use dto::*;
pub use job::*;
pub use log::*;
pub use question::*;
pub use status::*;
pub use traits::*;

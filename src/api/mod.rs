//! REST client module for the attendance API.
//!
//! The API issues bearer tokens from `POST /token` and exposes
//! check-in/check-out mutations plus the attendance record history,
//! all authenticated with `Authorization: Bearer <token>`.

pub mod client;
pub mod error;

pub use client::AttendanceApi;
pub use error::ApiError;

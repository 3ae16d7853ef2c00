//! Data models for attendance entities.
//!
//! This module contains the data structures exchanged with the
//! attendance API:
//!
//! - `Employee`: the person a record belongs to
//! - `AttendanceRecord`, `RecordType`: check-in/check-out events
//! - `TokenResponse`: the bearer token issued by `POST /token`

pub mod attendance;

pub use attendance::{AttendanceRecord, Employee, RecordType, TokenResponse};

//! API module for the job & scan service wire format
//!
//! # Design Principle
//!
//! This module contains ONLY shared request/response types. The HTTP client
//! that speaks them lives in `docwatch-monitor`.

pub mod types;

pub use types::{
    AnalyzeRequest, AnalyzeResponse, ErrorDetail, FileNodeDto, HealthResponse, MessageResponse,
    NodeKind, NodeStatus, ScanRequest, ScanResponse, ScanStats, Task, TaskStatus,
    TaskTreeResponse,
};

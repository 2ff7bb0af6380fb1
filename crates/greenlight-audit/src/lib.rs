//! Completion auditor.
//!
//! The last word on a pipeline. After the loop reports success, the
//! auditor re-derives completion from the stored evidence: approved
//! contracts, hash-chain integrity, recorded attempts, and the instance
//! state itself. The battery always runs to the end and a pipeline is
//! COMPLETE only when every check found nothing.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod auditor;
mod error;
mod report;

pub use auditor::CompletionAuditor;
pub use error::{AuditError, AuditResult};
pub use report::CompletionReport;

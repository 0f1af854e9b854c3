//! Threadloom Governance - Usage Limits and Entitlements
//!
//! Decides, per request, whether a caller may generate a thread:
//!
//! - [`UsageCounter`]: free-tier counts over fixed UTC day and month windows (fails open)
//! - [`Entitlements`]: idempotent, time-boxed premium grants (fails closed)
//! - [`GovernanceFacade`]: premium, then cache hit, then free tier or limit exceeded
//!
//! All durable state lives in the shared store behind
//! [`threadloom_storage::DegradableStoreClient`]; nothing here holds
//! cross-request state of its own.

pub mod entitlement;
pub mod facade;
pub mod usage;

pub use entitlement::{EntitlementStatus, Entitlements, GrantOutcome};
pub use facade::{Decision, DecisionReason, GovernanceFacade, UsageReport};
pub use usage::{AdmissionResult, UsageCounter, UsageSnapshot};

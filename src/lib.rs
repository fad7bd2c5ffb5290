//! Job dispatch for field units that lift a submerged net, capture evidence
//! of the catch, and report back.
//!
//! The queue side ([`queue`]) holds at most one pending job per unit. The
//! device side ([`agent`]) polls for that job, drives the motor through the
//! [`device::actuator`] state machine, optionally records a capture window
//! ([`capture`]), and reports a [`types::outcome::JobOutcome`].
pub mod agent;
pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod queue;
pub mod shutdown;
pub mod types;

//! # Integrations
//!
//! Clients for the hosted collaborators that are not storage: the identity
//! provider and the calendar service.

pub mod calendar;
pub mod identity;

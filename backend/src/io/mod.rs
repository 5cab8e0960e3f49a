//! # IO Module
//!
//! The interface layer between the browser client and the domain services.
//!
//! ## Key Responsibilities
//!
//! - **API Endpoints**: REST endpoints for every screen of the client
//! - **Error Translation**: Domain errors become HTTP status codes
//! - **CORS Management**: Cross-origin access for the web frontend

pub mod rest;

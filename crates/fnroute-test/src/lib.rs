//! # fnroute-test
//!
//! Testing utilities for fnroute applications.
//!
//! - [`client`] - [`TestClient`] drives a dispatcher through its axum router
//!   and [`TestResponse`] exposes what came back
//! - [`request_factory`] - [`RequestFactory`] builds [`RequestView`]s for
//!   calling predicates, routers and handlers directly
//!
//! [`RequestView`]: fnroute_http::RequestView

pub mod client;
pub mod request_factory;

pub use client::{TestClient, TestResponse};
pub use request_factory::RequestFactory;

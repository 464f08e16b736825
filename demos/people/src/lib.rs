//! A person directory served by an fnroute route table.
//!
//! - [`repository`] - In-memory person storage shared across requests
//! - [`routes`] - Handlers as closures over the repository, and the route table

pub mod repository;
pub mod routes;

pub use repository::{NewPerson, Person, PersonRepository};
pub use routes::{dispatcher, router};

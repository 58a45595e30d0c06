//! educ-backend: access to the course/assignment/submission REST backend
//!
//! Workflows depend only on the repository traits; `HttpBackend` talks to
//! the real backend over reqwest and `MemoryBackend` enforces the same
//! rules in process for tests and offline demos.

pub mod client;
pub mod memory;
pub mod repository;
pub mod routes;

pub use client::{build_from_core_config, HttpBackend};
pub use memory::MemoryBackend;
pub use repository::{AssignmentRepository, AuthService, Backend, CourseRepository, SubmissionRepository};

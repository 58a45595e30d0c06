//! Repository and service traits consumed by the workflows
//!
//! POST-backed methods (`publish`, `create`, `grade`) are not idempotent on
//! the backend: implementations issue them exactly once and never retry.

use async_trait::async_trait;
use educ_core::types::{
    Ack, Assignment, Course, CreatedAssignment, GradeRecord, LoginRequest, NewAssignment,
    NewSubmission, PendingSubmission, StudentSubmission, SubmissionReceipt,
};
use educ_core::{EducError, EducResult, Session};

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Exchange credentials for a session. Bad credentials and role
    /// mismatches fail with `EducError::Session`.
    async fn login(&self, request: &LoginRequest) -> EducResult<Session>;
}

#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn courses_for_professor(&self, professor_email: &str) -> EducResult<Vec<Course>>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Assignments of every course the student is enrolled in.
    async fn list_for_student(&self, student_email: &str) -> EducResult<Vec<Assignment>>;

    /// One assignment, including its public key envelope. A missing id is
    /// a `Backend { status: 404 }` error.
    async fn get(&self, student_email: &str, id: i64) -> EducResult<Assignment> {
        self.list_for_student(student_email)
            .await?
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| EducError::backend(404, format!("assignment {id} not found")))
    }

    /// Create an assignment, uploading its public key.
    async fn publish(&self, assignment: &NewAssignment) -> EducResult<CreatedAssignment>;
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn create(&self, submission: &NewSubmission) -> EducResult<SubmissionReceipt>;

    /// Ungraded submissions to the professor's assignments.
    async fn pending(&self, professor_email: &str) -> EducResult<Vec<PendingSubmission>>;

    /// The student's own submissions, graded or not.
    async fn history(&self, student_email: &str) -> EducResult<Vec<StudentSubmission>>;

    async fn grade(&self, record: &GradeRecord) -> EducResult<Ack>;
}

/// Everything a workflow may need from the backend.
pub trait Backend: AuthService + CourseRepository + AssignmentRepository + SubmissionRepository {}

impl<T> Backend for T where
    T: AuthService + CourseRepository + AssignmentRepository + SubmissionRepository
{
}

//! In-process backend with the same acceptance rules as the REST backend
//!
//! Used by the backend and workflow test suites. State lives behind a
//! `std::sync::Mutex`; no lock is held across an await point.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use educ_core::types::{
    Ack, Assignment, Course, CourseRef, CreatedAssignment, CreatedAssignmentInfo, GradeRecord,
    LoginRequest, NewAssignment, NewSubmission, PendingSubmission, StudentSubmission,
    SubmissionReceipt, SubmissionStatus,
};
use educ_core::{EducError, EducResult, Role, Session};

use crate::repository::{AssignmentRepository, AuthService, CourseRepository, SubmissionRepository};

#[derive(Debug, Clone)]
struct User {
    id: i64,
    name: String,
    email: String,
    role: Role,
    password: String,
}

#[derive(Debug, Clone)]
struct CourseRow {
    id: i64,
    code: String,
    name: String,
    professor_email: String,
    students: Vec<String>,
}

#[derive(Debug, Clone)]
struct AssignmentRow {
    id: i64,
    course_id: i64,
    title: String,
    description: String,
    due_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    public_key: String,
    professor_email: String,
}

/// A stored submission, as the backend sees it
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSubmission {
    pub id: i64,
    pub assignment_id: i64,
    pub student_email: String,
    pub encrypted_content: String,
    pub student_id_hash: String,
    pub submitted_at: DateTime<Utc>,
    pub grade: Option<f64>,
    pub feedback: String,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    users: Vec<User>,
    courses: Vec<CourseRow>,
    assignments: Vec<AssignmentRow>,
    submissions: Vec<StoredSubmission>,
    now: Option<DateTime<Utc>>,
    fail_next_post: bool,
    posts: usize,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    fn user(&self, email: &str, role: Role) -> Option<&User> {
        self.users.iter().find(|u| u.email == email && u.role == role)
    }

    fn course(&self, id: i64) -> Option<&CourseRow> {
        self.courses.iter().find(|c| c.id == id)
    }

    /// Count a POST and honour an injected transport failure.
    fn begin_post(&mut self, route: &str) -> EducResult<()> {
        self.posts += 1;
        if std::mem::take(&mut self.fail_next_post) {
            return Err(EducError::Network(format!("{route}: connection reset")));
        }
        Ok(())
    }
}

/// In-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_user(&self, name: &str, email: &str, role: Role, password: &str) -> i64 {
        let mut st = self.lock();
        let id = st.next_id();
        st.users.push(User {
            id,
            name: name.into(),
            email: email.into(),
            role,
            password: password.into(),
        });
        id
    }

    pub fn add_course(&self, code: &str, name: &str, professor_email: &str) -> i64 {
        let mut st = self.lock();
        let id = st.next_id();
        st.courses.push(CourseRow {
            id,
            code: code.into(),
            name: name.into(),
            professor_email: professor_email.into(),
            students: Vec::new(),
        });
        id
    }

    pub fn enroll(&self, course_id: i64, student_email: &str) {
        let mut st = self.lock();
        if let Some(course) = st.courses.iter_mut().find(|c| c.id == course_id) {
            course.students.push(student_email.into());
        }
    }

    /// Pin the backend clock.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.lock().now = Some(now);
    }

    /// Make the next POST fail as if the connection dropped.
    pub fn fail_next_post(&self) {
        self.lock().fail_next_post = true;
    }

    /// Number of POST requests received, including failed ones.
    pub fn post_count(&self) -> usize {
        self.lock().posts
    }

    pub fn submissions(&self) -> Vec<StoredSubmission> {
        self.lock().submissions.clone()
    }

    /// Public key stored for an assignment.
    pub fn public_key(&self, assignment_id: i64) -> Option<String> {
        self.lock()
            .assignments
            .iter()
            .find(|a| a.id == assignment_id)
            .map(|a| a.public_key.clone())
    }

    pub fn assignment_count(&self) -> usize {
        self.lock().assignments.len()
    }
}

#[async_trait]
impl AuthService for MemoryBackend {
    async fn login(&self, request: &LoginRequest) -> EducResult<Session> {
        let st = self.lock();
        let user = st
            .users
            .iter()
            .find(|u| u.email == request.email && u.password == request.password)
            .ok_or_else(|| EducError::Session("Invalid credentials".into()))?;
        if user.role != request.role {
            return Err(EducError::Session(format!(
                "User is not registered as {}",
                request.role
            )));
        }
        Ok(Session {
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            token: format!("token_{}_{}", user.id, user.email),
        })
    }
}

#[async_trait]
impl CourseRepository for MemoryBackend {
    async fn courses_for_professor(&self, professor_email: &str) -> EducResult<Vec<Course>> {
        let st = self.lock();
        let professor = st
            .user(professor_email, Role::Professor)
            .ok_or_else(|| EducError::backend(404, "Professeur non trouvé"))?;
        Ok(st
            .courses
            .iter()
            .filter(|c| c.professor_email == professor.email)
            .map(|c| Course {
                id: c.id,
                course_code: c.code.clone(),
                course_name: c.name.clone(),
                description: None,
                professor_fullname: Some(professor.name.clone()),
            })
            .collect())
    }
}

#[async_trait]
impl AssignmentRepository for MemoryBackend {
    async fn list_for_student(&self, student_email: &str) -> EducResult<Vec<Assignment>> {
        let st = self.lock();
        if st.user(student_email, Role::Student).is_none() {
            return Ok(Vec::new());
        }
        let now = st.now();
        let mut out = Vec::new();
        for a in &st.assignments {
            let Some(course) = st.course(a.course_id) else {
                continue;
            };
            if !course.students.iter().any(|s| s == student_email) {
                continue;
            }
            let professor = st
                .user(&a.professor_email, Role::Professor)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            out.push(Assignment {
                id: a.id,
                title: a.title.clone(),
                description: a.description.clone(),
                course_name: course.name.clone(),
                course_code: course.code.clone(),
                professor_fullname: professor,
                due_date: Some(a.due_date),
                created_at: Some(a.created_at),
                public_key: a.public_key.clone(),
                blockchain_transaction_hash: None,
                has_submitted: st
                    .submissions
                    .iter()
                    .any(|s| s.assignment_id == a.id && s.student_email == student_email),
                is_overdue: now > a.due_date,
            });
        }
        Ok(out)
    }

    async fn publish(&self, assignment: &NewAssignment) -> EducResult<CreatedAssignment> {
        let mut st = self.lock();
        st.begin_post(crate::routes::CREATE_ASSIGNMENT)?;

        if st.user(&assignment.professor_email, Role::Professor).is_none() {
            return Err(EducError::backend(400, "professor_email: Professeur introuvable."));
        }
        let course = st
            .course(assignment.course_id)
            .filter(|c| c.professor_email == assignment.professor_email)
            .cloned()
            .ok_or_else(|| EducError::backend(400, "course_id: Cours introuvable."))?;
        if assignment.title.trim().is_empty() {
            return Err(EducError::backend(400, "title: This field may not be blank."));
        }
        if assignment.public_key.trim().is_empty() {
            return Err(EducError::backend(400, "public_key: This field may not be blank."));
        }

        let id = st.next_id();
        let created_at = st.now();
        st.assignments.push(AssignmentRow {
            id,
            course_id: course.id,
            title: assignment.title.clone(),
            description: assignment.description.clone(),
            due_date: assignment.due_date,
            created_at,
            public_key: assignment.public_key.clone(),
            professor_email: assignment.professor_email.clone(),
        });

        Ok(CreatedAssignment {
            success: true,
            assignment: CreatedAssignmentInfo {
                id,
                title: assignment.title.clone(),
                course: CourseRef {
                    name: course.name,
                    code: course.code,
                },
                due_date: Some(assignment.due_date),
                created_at: Some(created_at),
                public_key_saved: true,
                blockchain_status: Some("pending".into()),
            },
            message: Some("Assignment created successfully. Public key saved.".into()),
        })
    }
}

#[async_trait]
impl SubmissionRepository for MemoryBackend {
    async fn create(&self, submission: &NewSubmission) -> EducResult<SubmissionReceipt> {
        let mut st = self.lock();
        st.begin_post(crate::routes::CREATE_SUBMISSION)?;

        if submission.encrypted_content.is_empty()
            || submission.student_id_hash.is_empty()
            || submission.student_email.is_empty()
        {
            return Err(EducError::backend(400, "Tous les champs sont requis"));
        }
        if st.user(&submission.student_email, Role::Student).is_none() {
            return Err(EducError::backend(400, "Étudiant non trouvé"));
        }
        let assignment = st
            .assignments
            .iter()
            .find(|a| a.id == submission.assignment_id)
            .cloned()
            .ok_or_else(|| EducError::backend(404, "Devoir non trouvé"))?;
        let enrolled = st
            .course(assignment.course_id)
            .is_some_and(|c| c.students.iter().any(|s| s == &submission.student_email));
        if !enrolled {
            return Err(EducError::backend(400, "Vous n'êtes pas inscrit à ce cours"));
        }
        let now = st.now();
        if now > assignment.due_date {
            return Err(EducError::backend(400, "Date limite dépassée"));
        }
        if st
            .submissions
            .iter()
            .any(|s| s.assignment_id == assignment.id && s.student_email == submission.student_email)
        {
            return Err(EducError::backend(400, "Vous avez déjà soumis ce devoir"));
        }

        let id = st.next_id();
        st.submissions.push(StoredSubmission {
            id,
            assignment_id: assignment.id,
            student_email: submission.student_email.clone(),
            encrypted_content: submission.encrypted_content.clone(),
            student_id_hash: submission.student_id_hash.clone(),
            submitted_at: now,
            grade: None,
            feedback: String::new(),
        });
        Ok(SubmissionReceipt {
            success: true,
            message: Some("Soumission reçue avec succès !".into()),
            submission_id: id,
        })
    }

    async fn pending(&self, professor_email: &str) -> EducResult<Vec<PendingSubmission>> {
        let st = self.lock();
        if st.user(professor_email, Role::Professor).is_none() {
            return Ok(Vec::new());
        }
        let mut out: Vec<PendingSubmission> = st
            .submissions
            .iter()
            .filter(|s| s.grade.is_none())
            .filter_map(|s| {
                let a = st
                    .assignments
                    .iter()
                    .find(|a| a.id == s.assignment_id && a.professor_email == professor_email)?;
                let course = st.course(a.course_id)?;
                let student = st.user(&s.student_email, Role::Student)?;
                Some(PendingSubmission {
                    id: s.id,
                    student_fullname: student.name.clone(),
                    student_email: s.student_email.clone(),
                    assignment_title: a.title.clone(),
                    course_name: course.name.clone(),
                    course_code: course.code.clone(),
                    encrypted_content: s.encrypted_content.clone(),
                    student_id_hash: s.student_id_hash.clone(),
                    submitted_at: Some(s.submitted_at),
                })
            })
            .collect();
        out.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(out)
    }

    async fn history(&self, student_email: &str) -> EducResult<Vec<StudentSubmission>> {
        let st = self.lock();
        Ok(st
            .submissions
            .iter()
            .filter(|s| s.student_email == student_email)
            .filter_map(|s| {
                let a = st.assignments.iter().find(|a| a.id == s.assignment_id)?;
                let course = st.course(a.course_id)?;
                let professor = st
                    .user(&a.professor_email, Role::Professor)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                Some(StudentSubmission {
                    id: s.id,
                    assignment_id: Some(a.id),
                    assignment_title: a.title.clone(),
                    course_name: course.name.clone(),
                    course_code: course.code.clone(),
                    professor_name: professor,
                    submitted_at: Some(s.submitted_at),
                    status: if s.grade.is_some() {
                        SubmissionStatus::Graded
                    } else {
                        SubmissionStatus::Submitted
                    },
                    grade: s.grade.map(|g| format!("{g:.2}")),
                    feedback: s.feedback.clone(),
                    blockchain_transaction_hash: None,
                })
            })
            .collect())
    }

    async fn grade(&self, record: &GradeRecord) -> EducResult<Ack> {
        let mut st = self.lock();
        st.begin_post(crate::routes::GRADE_SUBMISSION)?;

        if st.user(&record.professor_email, Role::Professor).is_none() {
            return Err(EducError::backend(404, "Professeur non trouvé"));
        }
        let owned: Vec<i64> = st
            .assignments
            .iter()
            .filter(|a| a.professor_email == record.professor_email)
            .map(|a| a.id)
            .collect();
        let submission = st
            .submissions
            .iter_mut()
            .find(|s| s.id == record.submission_id && owned.contains(&s.assignment_id))
            .ok_or_else(|| {
                EducError::backend(404, "Soumission non trouvée ou ne vous appartient pas")
            })?;
        if submission.grade.is_some() {
            return Err(EducError::backend(400, "Cette soumission a déjà été notée"));
        }
        submission.grade = Some(record.grade.value());
        submission.feedback = record.feedback.clone();

        Ok(Ack {
            success: true,
            message: Some("Note enregistrée avec succès".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use educ_core::types::Grade;

    const PUBLIC_KEY: &str = "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n";

    struct Fixture {
        backend: MemoryBackend,
        course_id: i64,
        now: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let backend = MemoryBackend::new();
        backend.add_user("Grace Hopper", "prof@example.com", Role::Professor, "pw");
        backend.add_user("Alice", "alice@example.com", Role::Student, "pw");
        backend.add_user("Mallory", "mallory@example.com", Role::Student, "pw");
        let course_id = backend.add_course("CRY101", "Cryptographie", "prof@example.com");
        backend.enroll(course_id, "alice@example.com");
        let now = Utc.with_ymd_and_hms(2030, 1, 10, 9, 0, 0).unwrap();
        backend.set_now(now);
        Fixture {
            backend,
            course_id,
            now,
        }
    }

    async fn publish(f: &Fixture, due_in: Duration) -> i64 {
        f.backend
            .publish(&NewAssignment {
                title: "TP RSA".into(),
                description: "Chiffrement".into(),
                course_id: f.course_id,
                due_date: f.now + due_in,
                public_key: PUBLIC_KEY.into(),
                professor_email: "prof@example.com".into(),
            })
            .await
            .unwrap()
            .assignment
            .id
    }

    fn submission(assignment_id: i64, email: &str) -> NewSubmission {
        NewSubmission {
            assignment_id,
            encrypted_content: "Y2lwaGVy".into(),
            student_id_hash: "ab".repeat(32),
            student_email: email.into(),
        }
    }

    #[tokio::test]
    async fn test_login_rules() {
        let f = fixture();
        let ok = f
            .backend
            .login(&LoginRequest {
                email: "alice@example.com".into(),
                password: "pw".into(),
                role: Role::Student,
            })
            .await
            .unwrap();
        assert_eq!(ok.role, Role::Student);

        let wrong_role = f
            .backend
            .login(&LoginRequest {
                email: "alice@example.com".into(),
                password: "pw".into(),
                role: Role::Professor,
            })
            .await;
        assert!(matches!(wrong_role, Err(EducError::Session(_))));

        let wrong_pw = f
            .backend
            .login(&LoginRequest {
                email: "alice@example.com".into(),
                password: "nope".into(),
                role: Role::Student,
            })
            .await;
        assert!(matches!(wrong_pw, Err(EducError::Session(_))));
    }

    #[tokio::test]
    async fn test_get_assignment_and_missing_id() {
        let f = fixture();
        let id = publish(&f, Duration::days(7)).await;

        let a = f.backend.get("alice@example.com", id).await.unwrap();
        assert_eq!(a.public_key, PUBLIC_KEY);
        assert_eq!(a.course_code, "CRY101");
        assert!(!a.has_submitted);

        let err = f.backend.get("alice@example.com", id + 100).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_submission_rules() {
        let f = fixture();
        let id = publish(&f, Duration::days(7)).await;

        f.backend.create(&submission(id, "alice@example.com")).await.unwrap();

        let dup = f.backend.create(&submission(id, "alice@example.com")).await.unwrap_err();
        assert!(dup.to_string().contains("déjà soumis"));

        let not_enrolled = f
            .backend
            .create(&submission(id, "mallory@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(not_enrolled, EducError::Backend { status: 400, .. }));

        let listed = f.backend.get("alice@example.com", id).await.unwrap();
        assert!(listed.has_submitted);
    }

    #[tokio::test]
    async fn test_overdue_submission_refused() {
        let f = fixture();
        let id = publish(&f, Duration::days(1)).await;
        f.backend.set_now(f.now + Duration::days(2));

        let err = f.backend.create(&submission(id, "alice@example.com")).await.unwrap_err();
        assert!(err.to_string().contains("Date limite dépassée"));
    }

    #[tokio::test]
    async fn test_grade_once() {
        let f = fixture();
        let id = publish(&f, Duration::days(7)).await;
        let receipt = f.backend.create(&submission(id, "alice@example.com")).await.unwrap();

        let pending = f.backend.pending("prof@example.com").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].student_fullname, "Alice");

        let record = GradeRecord {
            submission_id: receipt.submission_id,
            grade: Grade::new(15.5).unwrap(),
            feedback: "Bien".into(),
            professor_email: "prof@example.com".into(),
        };
        f.backend.grade(&record).await.unwrap();
        assert!(f.backend.pending("prof@example.com").await.unwrap().is_empty());

        let again = f.backend.grade(&record).await.unwrap_err();
        assert!(again.to_string().contains("déjà été notée"));

        let history = f.backend.history("alice@example.com").await.unwrap();
        assert_eq!(history[0].status, SubmissionStatus::Graded);
        assert_eq!(history[0].grade.as_deref(), Some("15.50"));
    }

    #[tokio::test]
    async fn test_injected_failure_counts_one_post() {
        let f = fixture();
        let id = publish(&f, Duration::days(7)).await;
        let before = f.backend.post_count();

        f.backend.fail_next_post();
        let err = f.backend.create(&submission(id, "alice@example.com")).await.unwrap_err();
        assert!(matches!(err, EducError::Network(_)));
        assert_eq!(f.backend.post_count(), before + 1);
        assert!(f.backend.submissions().is_empty());
    }
}

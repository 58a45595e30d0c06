//! Session context and backend wire shapes
//!
//! Field names follow the REST backend's JSON exactly. Timestamps are
//! accepted as RFC 3339 or as naive ISO 8601 (taken as UTC), since the
//! backend emits both depending on its timezone settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{EducError, EducResult};

/// Lowest grade accepted by the backend
pub const MIN_GRADE: f64 = 0.0;

/// Highest grade accepted by the backend
pub const MAX_GRADE: f64 = 20.0;

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Professor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Professor => "professor",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = EducError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "professor" => Ok(Role::Professor),
            "admin" => Ok(Role::Admin),
            other => Err(EducError::Validation(format!(
                "unknown role '{other}' (expected student, professor or admin)"
            ))),
        }
    }
}

/// Authenticated user context, passed explicitly to every workflow entry point.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub token: String,
}

impl Session {
    /// Refuse with `AccessDenied` unless the session holds `role`.
    pub fn require_role(&self, role: Role) -> EducResult<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(EducError::AccessDenied(format!(
                "{} is signed in as {}, this action needs a {role} account",
                self.email, self.role
            )))
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

// ── Auth ─────────────────────────────────────────────────────────────────────

/// `POST auth/login/` body; the password is wiped on drop
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct LoginRequest {
    #[zeroize(skip)]
    pub email: String,
    pub password: String,
    #[zeroize(skip)]
    pub role: Role,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

impl LoginResponse {
    pub fn into_session(self) -> EducResult<Session> {
        if !self.success {
            return Err(EducError::Session(
                self.message.unwrap_or_else(|| "login refused".into()),
            ));
        }
        match (self.token, self.user) {
            (Some(token), Some(user)) => Ok(Session {
                user_id: user.id,
                name: user.name,
                email: user.email,
                role: user.role,
                token,
            }),
            _ => Err(EducError::Session(
                "login response is missing the token or user".into(),
            )),
        }
    }
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("success", &self.success)
            .field("message", &self.message)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .finish()
    }
}

// ── Courses & assignments ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub course_code: String,
    pub course_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub professor_fullname: Option<String>,
}

/// Assignment as listed for a student; carries the public key envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub professor_fullname: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub blockchain_transaction_hash: Option<String>,
    #[serde(default)]
    pub has_submitted: bool,
    #[serde(default)]
    pub is_overdue: bool,
}

impl Assignment {
    /// Submissions are accepted strictly before the due date.
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.is_overdue || self.due_date.is_some_and(|due| now >= due)
    }
}

/// `POST assignments/create/` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub title: String,
    pub description: String,
    pub course_id: i64,
    pub due_date: DateTime<Utc>,
    pub public_key: String,
    pub professor_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRef {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedAssignmentInfo {
    pub id: i64,
    pub title: String,
    pub course: CourseRef,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub public_key_saved: bool,
    #[serde(default)]
    pub blockchain_status: Option<String>,
}

/// `201` body of `POST assignments/create/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedAssignment {
    #[serde(default)]
    pub success: bool,
    pub assignment: CreatedAssignmentInfo,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Submissions ──────────────────────────────────────────────────────────────

/// `POST student/create/submissions/` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub assignment_id: i64,
    /// Base64 ciphertext
    pub encrypted_content: String,
    /// 64 lowercase hex chars
    pub student_id_hash: String,
    pub student_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub submission_id: i64,
}

/// Ungraded submission as listed for the owning professor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub id: i64,
    #[serde(default)]
    pub student_fullname: String,
    pub student_email: String,
    pub assignment_title: String,
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub course_code: String,
    pub encrypted_content: String,
    pub student_id_hash: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Graded,
    #[serde(other)]
    Unknown,
}

/// One row of a student's submission history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSubmission {
    pub id: i64,
    /// Not sent by every backend; history rows are then matched by title
    #[serde(default)]
    pub assignment_id: Option<i64>,
    pub assignment_title: String,
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub professor_name: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub status: SubmissionStatus,
    /// Decimal rendered as a string, e.g. `"15.50"`
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub blockchain_transaction_hash: Option<String>,
}

impl StudentSubmission {
    pub fn grade_value(&self) -> Option<f64> {
        self.grade.as_deref().and_then(|g| g.trim().parse().ok())
    }

    /// True when this history row belongs to `assignment`.
    ///
    /// Without an `assignment_id` the row is matched on title and course
    /// code, and its submission time must fall between the assignment's
    /// creation and due date when both sides carry them. Two same-titled
    /// assignments of one course with overlapping windows still collide.
    pub fn is_for(&self, assignment: &Assignment) -> bool {
        match self.assignment_id {
            Some(id) => id == assignment.id,
            None => {
                self.assignment_title == assignment.title
                    && self.course_code == assignment.course_code
                    && self.submitted_within(assignment)
            }
        }
    }

    fn submitted_within(&self, assignment: &Assignment) -> bool {
        let Some(at) = self.submitted_at else {
            return true;
        };
        assignment.created_at.map_or(true, |created| at >= created)
            && assignment.due_date.map_or(true, |due| at < due)
    }
}

// ── Grading ──────────────────────────────────────────────────────────────────

/// A grade within `MIN_GRADE..=MAX_GRADE`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Grade(f64);

impl Grade {
    pub fn new(value: f64) -> EducResult<Self> {
        if value.is_finite() && (MIN_GRADE..=MAX_GRADE).contains(&value) {
            Ok(Self(value))
        } else {
            Err(EducError::Validation(format!(
                "grade must be between {MIN_GRADE} and {MAX_GRADE}, got {value}"
            )))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Grade {
    type Error = EducError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Grade::new(value)
    }
}

impl From<Grade> for f64 {
    fn from(grade: Grade) -> f64 {
        grade.0
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `POST professor/grade-submission/` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub submission_id: i64,
    pub grade: Grade,
    pub feedback: String,
    pub professor_email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Human-readable message from a backend error body.
///
/// Understands `{error}`, `{detail}`, `{message}`, `{details}` and DRF
/// field-error maps (`{"title": ["This field is required."]}`).
pub fn error_message(body: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    let obj = body.as_object()?;
    for key in ["error", "detail", "message"] {
        if let Some(Value::String(s)) = obj.get(key) {
            return Some(s.clone());
        }
    }
    if let Some(details) = obj.get("details") {
        return Some(match details {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }

    let fields: Vec<String> = obj
        .iter()
        .filter(|(key, _)| key.as_str() != "success")
        .map(|(key, value)| match value {
            Value::Array(items) => {
                let msgs: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                format!("{key}: {}", msgs.join(" "))
            }
            other => format!("{key}: {other}"),
        })
        .collect();
    (!fields.is_empty()).then(|| fields.join("; "))
}

pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

    /// RFC 3339, or a naive ISO 8601 timestamp taken as UTC.
    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse(s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}"))),
        }
    }
}

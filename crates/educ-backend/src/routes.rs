//! REST routes, relative to the configured API root

pub const LOGIN: &str = "auth/login/";

/// `?professor_email=`
pub const PROFESSOR_COURSES: &str = "courses/";

pub const CREATE_ASSIGNMENT: &str = "assignments/create/";

/// `?student_email=`
pub const STUDENT_ASSIGNMENTS: &str = "student/assignments/";

pub const CREATE_SUBMISSION: &str = "student/create/submissions/";

/// `?professor_email=`
pub const PENDING_SUBMISSIONS: &str = "professor/pending-submissions/";

/// `?student_email=`
pub const STUDENT_SUBMISSIONS: &str = "student/submissions/";

pub const GRADE_SUBMISSION: &str = "professor/grade-submission/";

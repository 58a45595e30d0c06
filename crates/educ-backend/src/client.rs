//! reqwest client for the REST backend

use std::time::Duration;

use async_trait::async_trait;
use educ_core::config::BackendConfig;
use educ_core::types::{
    error_message, Ack, Assignment, Course, CreatedAssignment, GradeRecord, LoginRequest,
    LoginResponse, NewAssignment, NewSubmission, PendingSubmission, StudentSubmission,
    SubmissionReceipt,
};
use educ_core::{EducError, EducResult, Session};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;

use crate::repository::{AssignmentRepository, AuthService, CourseRepository, SubmissionRepository};
use crate::routes;

/// Backend reached over HTTP. Requests are sent once; failures are
/// returned to the caller, never retried.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> EducResult<Self> {
        // Url::join drops the last path segment unless the base ends in '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| EducError::Config(format!("invalid backend.base_url '{base_url}': {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("educ/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EducError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            token: None,
        })
    }

    /// Attach the session token to every subsequent request.
    pub fn with_session(mut self, session: &Session) -> Self {
        self.token = Some(session.token.clone());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, route: &str) -> EducResult<Url> {
        self.base
            .join(route)
            .map_err(|e| EducError::Config(format!("bad route {route}: {e}")))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.header(reqwest::header::AUTHORIZATION, format!("Token {token}")),
            None => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, &str)],
    ) -> EducResult<T> {
        let req = self.client.get(self.url(route)?).query(query);
        self.execute(route, self.authorize(req)).await
    }

    async fn post_json<B, T>(&self, route: &str, body: &B) -> EducResult<T>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let req = self.client.post(self.url(route)?).json(body);
        self.execute(route, self.authorize(req)).await
    }

    async fn execute<T: DeserializeOwned>(&self, route: &str, req: RequestBuilder) -> EducResult<T> {
        let response = req.send().await.map_err(|e| {
            tracing::debug!(route, error = %e, "request failed");
            EducError::Network(format!("{route}: {e}"))
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| EducError::Network(format!("{route}: reading response: {e}")))?;
        tracing::debug!(route, status = status.as_u16(), bytes = body.len(), "backend response");

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|e| {
                EducError::backend(status.as_u16(), format!("unexpected response from {route}: {e}"))
            });
        }

        let message = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| error_message(&v))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        Err(EducError::backend(status.as_u16(), message))
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Build a client from config.
///
/// If `enforce_tls` is true and the base URL uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_from_core_config(backend: &BackendConfig) -> EducResult<HttpBackend> {
    if backend.base_url.starts_with("http://") {
        if backend.enforce_tls {
            return Err(EducError::Config(format!(
                "backend URL uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set backend.enforce_tls = false for local development.",
                backend.base_url
            )));
        }
        tracing::warn!(
            base_url = %backend.base_url,
            "backend URL uses plaintext HTTP; passwords and ciphertexts travel unencrypted"
        );
    }
    HttpBackend::new(&backend.base_url, Duration::from_secs(backend.timeout_secs.max(1)))
}

#[async_trait]
impl AuthService for HttpBackend {
    async fn login(&self, request: &LoginRequest) -> EducResult<Session> {
        let response: LoginResponse = match self.post_json(routes::LOGIN, request).await {
            Ok(r) => r,
            Err(EducError::Backend {
                status: 401 | 403,
                message,
            }) => return Err(EducError::Session(message)),
            Err(e) => return Err(e),
        };
        let session = response.into_session()?;
        tracing::info!(email = %session.email, role = %session.role, "signed in");
        Ok(session)
    }
}

#[async_trait]
impl CourseRepository for HttpBackend {
    async fn courses_for_professor(&self, professor_email: &str) -> EducResult<Vec<Course>> {
        self.get_json(routes::PROFESSOR_COURSES, &[("professor_email", professor_email)])
            .await
    }
}

#[async_trait]
impl AssignmentRepository for HttpBackend {
    async fn list_for_student(&self, student_email: &str) -> EducResult<Vec<Assignment>> {
        self.get_json(routes::STUDENT_ASSIGNMENTS, &[("student_email", student_email)])
            .await
    }

    async fn publish(&self, assignment: &NewAssignment) -> EducResult<CreatedAssignment> {
        self.post_json(routes::CREATE_ASSIGNMENT, assignment).await
    }
}

#[async_trait]
impl SubmissionRepository for HttpBackend {
    async fn create(&self, submission: &NewSubmission) -> EducResult<SubmissionReceipt> {
        self.post_json(routes::CREATE_SUBMISSION, submission).await
    }

    async fn pending(&self, professor_email: &str) -> EducResult<Vec<PendingSubmission>> {
        self.get_json(routes::PENDING_SUBMISSIONS, &[("professor_email", professor_email)])
            .await
    }

    async fn history(&self, student_email: &str) -> EducResult<Vec<StudentSubmission>> {
        self.get_json(routes::STUDENT_SUBMISSIONS, &[("student_email", student_email)])
            .await
    }

    async fn grade(&self, record: &GradeRecord) -> EducResult<Ack> {
        self.post_json(routes::GRADE_SUBMISSION, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_join_under_api_root() {
        let backend = HttpBackend::new("http://127.0.0.1:8000/api", Duration::from_secs(5)).unwrap();
        assert_eq!(
            backend.url(routes::CREATE_SUBMISSION).unwrap().as_str(),
            "http://127.0.0.1:8000/api/student/create/submissions/"
        );

        let slashed = HttpBackend::new("http://127.0.0.1:8000/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            slashed.url(routes::LOGIN).unwrap().as_str(),
            "http://127.0.0.1:8000/api/auth/login/"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpBackend::new("not a url", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, EducError::Config(_)));
    }

    #[test]
    fn test_build_from_core_config_http_warning() {
        // HTTP with enforce_tls=false succeeds (with a warning)
        let cfg = BackendConfig {
            base_url: "http://localhost:8000/api".into(),
            enforce_tls: false,
            ..Default::default()
        };
        assert!(build_from_core_config(&cfg).is_ok());
    }

    #[test]
    fn test_build_from_core_config_http_enforce_tls() {
        let cfg = BackendConfig {
            base_url: "http://insecure:8000/api".into(),
            enforce_tls: true,
            ..Default::default()
        };
        let err = build_from_core_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_build_from_core_config_https() {
        let cfg = BackendConfig {
            base_url: "https://educ.example.com/api".into(),
            enforce_tls: true,
            ..Default::default()
        };
        assert!(build_from_core_config(&cfg).is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = Session {
            user_id: 1,
            name: "n".into(),
            email: "e@x".into(),
            role: educ_core::Role::Student,
            token: "token_1_e@x".into(),
        };
        let backend = HttpBackend::new("http://localhost/api", Duration::from_secs(1))
            .unwrap()
            .with_session(&session);
        assert!(!format!("{backend:?}").contains("token_1"));
    }
}

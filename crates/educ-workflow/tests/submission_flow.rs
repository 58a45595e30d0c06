//! Student submission state machine against the in-memory backend

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, TimeZone, Utc};
use educ_backend::{AssignmentRepository, AuthService, Backend, MemoryBackend};
use educ_core::types::{LoginRequest, NewAssignment};
use educ_core::{EducError, Role, Session};
use educ_crypto::{decrypt_submission, generate_key_pair, hash_identity, CryptoError, KeyPair, SealMode};
use educ_workflow::{list_assignments, FlowError, SubmissionFlow, SubmissionState};

fn key_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| generate_key_pair().unwrap())
}

struct World {
    mem: Arc<MemoryBackend>,
    backend: Arc<dyn Backend>,
    alice: Session,
    course_id: i64,
    now: DateTime<Utc>,
}

async fn world() -> World {
    let mem = Arc::new(MemoryBackend::new());
    mem.add_user("Grace Hopper", "prof@example.com", Role::Professor, "pw");
    mem.add_user("Alice", "alice@example.com", Role::Student, "pw");
    let course_id = mem.add_course("CRY101", "Cryptographie", "prof@example.com");
    mem.enroll(course_id, "alice@example.com");
    let now = Utc.with_ymd_and_hms(2030, 1, 10, 9, 0, 0).unwrap();
    mem.set_now(now);

    let alice = mem
        .login(&LoginRequest {
            email: "alice@example.com".into(),
            password: "pw".into(),
            role: Role::Student,
        })
        .await
        .unwrap();
    let backend: Arc<dyn Backend> = mem.clone();
    World {
        mem,
        backend,
        alice,
        course_id,
        now,
    }
}

async fn publish(w: &World, title: &str, due_in: Duration) -> i64 {
    w.mem
        .publish(&NewAssignment {
            title: title.into(),
            description: String::new(),
            course_id: w.course_id,
            due_date: w.now + due_in,
            public_key: key_pair().public_envelope().unwrap(),
            professor_email: "prof@example.com".into(),
        })
        .await
        .unwrap()
        .assignment
        .id
}

async fn flow(w: &World, assignment_id: i64, mode: SealMode) -> SubmissionFlow {
    SubmissionFlow::open(w.backend.clone(), &w.alice, assignment_id, mode, w.now)
        .await
        .unwrap()
}

#[tokio::test]
async fn submit_seals_single_block_with_trailer() {
    let w = world().await;
    let id = publish(&w, "TP RSA", Duration::days(7)).await;
    let mut f = flow(&w, id, SealMode::Single).await;
    assert_eq!(f.state(), SubmissionState::NotSubmitted);

    let receipt = f.submit("  Answer: 42\n", w.now).await.unwrap();
    assert_eq!(f.state(), SubmissionState::Submitted);
    assert_eq!(f.receipt().map(|r| r.submission_id), Some(receipt.submission_id));

    let stored = w.mem.submissions();
    assert_eq!(stored.len(), 1);
    let identity = hash_identity("alice@example.com");
    assert_eq!(stored[0].student_id_hash, identity.as_str());
    assert_eq!(stored[0].encrypted_content.len(), 344);

    let plaintext =
        decrypt_submission(&stored[0].encrypted_content, &key_pair().private_key()).unwrap();
    assert_eq!(
        plaintext,
        format!("Answer: 42\n\n--- Hash étudiant (anti-plagiat): {identity} ---")
    );
}

#[tokio::test]
async fn long_answer_goes_hybrid_in_auto_mode() {
    let w = world().await;
    let id = publish(&w, "Dissertation", Duration::days(7)).await;
    let answer = "La factorisation des grands entiers reste difficile. ".repeat(40);

    let mut single = flow(&w, id, SealMode::Single).await;
    let err = single.submit(&answer, w.now).await.unwrap_err();
    assert!(matches!(err, FlowError::Crypto(CryptoError::Encryption(_))));
    assert_eq!(single.state(), SubmissionState::NotSubmitted);
    assert_eq!(w.mem.post_count(), 1, "only the publish POST so far");

    let mut auto = flow(&w, id, SealMode::Auto).await;
    auto.submit(&answer, w.now).await.unwrap();
    let stored = w.mem.submissions();
    assert!(stored[0].encrypted_content.len() > 344);
    let plaintext =
        decrypt_submission(&stored[0].encrypted_content, &key_pair().private_key()).unwrap();
    assert!(plaintext.starts_with(answer.trim()));
}

#[tokio::test]
async fn network_failure_rolls_back_and_manual_retry_succeeds() {
    let w = world().await;
    let id = publish(&w, "TP RSA", Duration::days(7)).await;
    let mut f = flow(&w, id, SealMode::Auto).await;
    let posts_before = w.mem.post_count();

    w.mem.fail_next_post();
    let err = f.submit("Answer: 42", w.now).await.unwrap_err();
    assert!(matches!(err, FlowError::Educ(EducError::Network(_))));
    assert!(err.is_retryable());
    assert_eq!(f.state(), SubmissionState::NotSubmitted);
    assert!(w.mem.submissions().is_empty());
    assert_eq!(w.mem.post_count(), posts_before + 1, "no automatic retry");

    f.submit("Answer: 42", w.now).await.unwrap();
    assert_eq!(f.state(), SubmissionState::Submitted);
    assert_eq!(w.mem.submissions().len(), 1);
    assert_eq!(w.mem.post_count(), posts_before + 2);
}

#[tokio::test]
async fn overdue_assignment_blocks_submission() {
    let w = world().await;
    let id = publish(&w, "TP RSA", Duration::hours(1)).await;
    let mut f = flow(&w, id, SealMode::Auto).await;
    let posts_before = w.mem.post_count();

    let late = w.now + Duration::hours(2);
    let err = f.submit("Answer: 42", late).await.unwrap_err();
    assert!(matches!(err, FlowError::Overdue { assignment_id } if assignment_id == id));
    assert_eq!(f.state(), SubmissionState::Overdue);
    assert_eq!(w.mem.post_count(), posts_before);

    let again = f.submit("Answer: 42", w.now).await.unwrap_err();
    assert!(matches!(again, FlowError::Overdue { .. }));
}

#[tokio::test]
async fn refusals_before_any_crypto() {
    let w = world().await;
    let id = publish(&w, "TP RSA", Duration::days(7)).await;
    let mut f = flow(&w, id, SealMode::Auto).await;
    let posts_before = w.mem.post_count();

    let empty = f.submit("  \n\t", w.now).await.unwrap_err();
    assert!(matches!(empty, FlowError::Educ(EducError::Validation(_))));
    assert_eq!(f.state(), SubmissionState::NotSubmitted);
    assert_eq!(w.mem.post_count(), posts_before);

    f.submit("Answer: 42", w.now).await.unwrap();
    let twice = f.submit("Answer: 43", w.now).await.unwrap_err();
    assert!(matches!(
        twice,
        FlowError::InvalidTransition {
            state: SubmissionState::Submitted,
            action: "submit"
        }
    ));
    assert_eq!(w.mem.submissions().len(), 1);
}

#[tokio::test]
async fn reopened_flow_sees_existing_submission() {
    let w = world().await;
    let id = publish(&w, "TP RSA", Duration::days(7)).await;
    flow(&w, id, SealMode::Auto)
        .await
        .submit("Answer: 42", w.now)
        .await
        .unwrap();

    let reopened = flow(&w, id, SealMode::Auto).await;
    assert_eq!(reopened.state(), SubmissionState::Submitted);
}

#[tokio::test]
async fn professor_cannot_open_student_flow() {
    let w = world().await;
    let id = publish(&w, "TP RSA", Duration::days(7)).await;
    let prof = w
        .mem
        .login(&LoginRequest {
            email: "prof@example.com".into(),
            password: "pw".into(),
            role: Role::Professor,
        })
        .await
        .unwrap();

    let err = SubmissionFlow::open(w.backend.clone(), &prof, id, SealMode::Auto, w.now)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Educ(EducError::AccessDenied(_))));
}

#[tokio::test]
async fn listing_derives_state_per_assignment() {
    let w = world().await;
    let open_id = publish(&w, "Ouvert", Duration::days(7)).await;
    let closing_id = publish(&w, "Bientôt fermé", Duration::hours(1)).await;
    let done_id = publish(&w, "Rendu", Duration::days(7)).await;
    flow(&w, done_id, SealMode::Auto)
        .await
        .submit("fait", w.now)
        .await
        .unwrap();

    let later = w.now + Duration::hours(2);
    let rows = list_assignments(w.backend.as_ref(), &w.alice, later).await.unwrap();
    let state_of = |id: i64| rows.iter().find(|r| r.assignment.id == id).map(|r| r.state);

    assert_eq!(state_of(open_id), Some(SubmissionState::NotSubmitted));
    assert_eq!(state_of(closing_id), Some(SubmissionState::Overdue));
    assert_eq!(state_of(done_id), Some(SubmissionState::Submitted));
}

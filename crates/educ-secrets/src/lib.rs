//! educ-secrets: everything that touches a secret outside the crypto core
//!
//! Private key handoff (assignment creation), one of:
//!   - system clipboard
//!   - a new 0600 file under `handoff.key_dir` (never overwritten)
//!   - stdout
//!
//! Private key discovery chain (grading, in order of precedence):
//!   1. `--key-file <path>`
//!   2. $EDUC_PRIVATE_KEY_FILE (path to an envelope)
//!   3. $EDUC_PRIVATE_KEY (literal envelope, may be multi-line)
//!   4. interactive paste, terminated by the `END PRIVATE KEY` line

pub mod handoff;
pub mod session;
pub mod source;

pub use handoff::{handoff_for, ClipboardHandoff, FileHandoff, HandoffMethod, HandoffReceipt, KeyHandoff, StdoutHandoff};
pub use session::SessionStore;
pub use source::{find_private_key, read_pasted_key, KeySource};

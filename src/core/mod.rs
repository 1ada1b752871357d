pub mod audit;
pub mod audits;
pub mod control;
pub mod debounce;
pub mod editor;
pub mod grouping;
pub mod session;

pub use audit::{decode_payload, AuditView, DiffLine};
pub use audits::{AuditLog, AuditOutcome, AuditQuery, AuditTicket};
pub use control::{Control, ControlKind, RawValue};
pub use debounce::Debouncer;
pub use editor::{ConfigEditor, FetchOutcome, FetchTicket, ReleaseTarget, SaveOutcome, SaveTicket};
pub use grouping::{ConfigGroup, Segment};
pub use session::{EditSession, Modification};

pub mod backup_code;
pub mod enrollment;
pub mod totp;

pub use backup_code::{BackupCodeOutcome, BackupCodeService};
pub use enrollment::{ActivationOutcome, EnrollmentService};
pub use totp::TotpService;

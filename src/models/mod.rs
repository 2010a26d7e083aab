pub mod requests;
pub mod two_factor;

pub use requests::{ActivateRequest, EnrollRequest, VerifyBackupCodeRequest, VerifyLoginRequest};
pub use two_factor::{EnrollmentSession, TwoFactorState, TwoFactorUpdate};

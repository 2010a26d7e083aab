//! Aithor の二要素認証（TOTP）サブシステム
//!
//! シークレット生成、QRコードによる登録素材の作成、バックアップコードの
//! 発行と消費、2FAの有効化・無効化のライフサイクルを提供する。
//! トランスポート・永続化・アクセス制御は呼び出し側の責務であり、
//! このクレートは判定結果と永続化指示のみを返す（I/Oを行わない）。

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::AppError;
pub use models::{
    ActivateRequest, EnrollRequest, EnrollmentSession, TwoFactorState, TwoFactorUpdate,
    VerifyBackupCodeRequest, VerifyLoginRequest,
};
pub use services::{
    ActivationOutcome, BackupCodeOutcome, BackupCodeService, EnrollmentService, TotpService,
};

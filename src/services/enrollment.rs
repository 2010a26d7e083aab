use garde::Validate;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::config::Config;
use crate::error::AppError;
use crate::models::requests::{
    ActivateRequest, EnrollRequest, VerifyBackupCodeRequest, VerifyLoginRequest,
};
use crate::models::two_factor::{EnrollmentSession, TwoFactorUpdate};
use crate::services::backup_code::{BackupCodeOutcome, BackupCodeService};
use crate::services::totp::{TotpService, unix_now};

/// 2FA有効化の結果
#[derive(Debug, Serialize)]
pub struct ActivationOutcome {
    pub success: bool,
    /// 平文バックアップコード（有効化成功時に一度だけ返す）
    pub backup_codes: Option<Vec<String>>,
    /// 呼び出し側が原子的に永続化すべき更新指示
    pub update: Option<TwoFactorUpdate>,
}

impl ActivationOutcome {
    fn rejected() -> Self {
        Self {
            success: false,
            backup_codes: None,
            update: None,
        }
    }
}

/// 2FA登録ライフサイクルを統括するサービス
///
/// Disabled → (initiate) → 検証待ち → (verify成功) → Enabled → (disable) → Disabled。
/// 検証待ちの状態は EnrollmentSession として呼び出し側が保持し、
/// 検証が成功するまで永続状態には何も書かれない。
///
/// # Security
/// - シークレットは正しいTOTPコードの提示前に永続化指示へ含めない
/// - バックアップコードは平文のまま永続化指示へ含めない
#[derive(Clone)]
pub struct EnrollmentService {
    totp_service: TotpService,
    backup_code_count: usize,
}

impl EnrollmentService {
    /// 新しい EnrollmentService を作成
    pub fn new(totp_service: TotpService, backup_code_count: usize) -> Self {
        Self {
            totp_service,
            backup_code_count,
        }
    }

    /// 設定から EnrollmentService を構築
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let totp_service = TotpService::new(
            config.totp_issuer.clone(),
            config.encryption_key.expose_secret(),
        )?;
        Ok(Self::new(totp_service, config.backup_code_count))
    }

    /// 2FA設定を開始（シークレット・バックアップコード・QRコードの発行）
    ///
    /// # Note
    /// この時点では何も永続化しない。返したセッションは呼び出し側が
    /// verify_and_activate まで保持して持ち戻す
    pub fn initiate(&self, request: &EnrollRequest) -> Result<EnrollmentSession, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let secret = TotpService::generate_secret()?;
        let backup_codes = BackupCodeService::generate_codes(self.backup_code_count)?;
        let provisioning_uri = self
            .totp_service
            .provisioning_uri(&request.account_label, &secret)?;
        let qr_code = self
            .totp_service
            .generate_qr_code(&request.account_label, &secret)?;

        tracing::info!(account = %request.account_label, "2FA設定セッション発行");

        Ok(EnrollmentSession {
            secret,
            backup_codes,
            provisioning_uri,
            qr_code: format!("data:image/png;base64,{}", qr_code),
        })
    }

    /// 設定セッションに対する初回コード検証と有効化
    ///
    /// 成功時は封緘済みシークレットとハッシュ化済みバックアップコードを含む
    /// 永続化指示と、平文コード（一度だけ表示用）を返す。
    /// 失敗時は永続状態に影響を与えず、同じセッションでの再試行も
    /// 再initiateも呼び出し側の裁量
    pub fn verify_and_activate(
        &self,
        session: &EnrollmentSession,
        request: &ActivateRequest,
    ) -> Result<ActivationOutcome, AppError> {
        self.verify_and_activate_at(session, request, unix_now()?)
    }

    fn verify_and_activate_at(
        &self,
        session: &EnrollmentSession,
        request: &ActivateRequest,
        unix_time: u64,
    ) -> Result<ActivationOutcome, AppError> {
        if !self
            .totp_service
            .verify_code_at(&session.secret, &request.code, unix_time)
        {
            tracing::info!("2FA有効化失敗: コード不一致");
            return Ok(ActivationOutcome::rejected());
        }

        let secret_encrypted = self.totp_service.encrypt_secret(&session.secret)?;
        let hashed_backup_codes = session
            .backup_codes
            .iter()
            .map(|code| BackupCodeService::hash_code(code))
            .collect();

        tracing::info!("2FA有効化成功");

        Ok(ActivationOutcome {
            success: true,
            backup_codes: Some(session.backup_codes.clone()),
            update: Some(TwoFactorUpdate {
                secret_encrypted: Some(secret_encrypted),
                hashed_backup_codes: Some(hashed_backup_codes),
                enabled: true,
            }),
        })
    }

    /// ログイン時のTOTPコード検証
    ///
    /// # Security
    /// 封緘シークレットの復号失敗も含め、あらゆる失敗は false として
    /// 返し、不正入力と単なる不一致を区別させない
    pub fn verify_login(&self, secret_encrypted: &[u8], request: &VerifyLoginRequest) -> bool {
        let secret = match self.totp_service.decrypt_secret(secret_encrypted) {
            Ok(secret) => secret,
            Err(_) => return false,
        };

        self.totp_service.verify_code(&secret, &request.code)
    }

    /// バックアップコードの検証と消費
    ///
    /// # Note
    /// 返された remaining の永続化は呼び出し側の責務。同一アカウントへの
    /// 並行消費は呼び出し側の永続化層で直列化すること（楽観ロック等）
    pub fn verify_backup_code(
        &self,
        request: &VerifyBackupCodeRequest,
        hashed_codes: &[String],
    ) -> BackupCodeOutcome {
        let outcome = BackupCodeService::verify_and_consume(&request.code, hashed_codes);

        if outcome.valid {
            tracing::info!(remaining = outcome.remaining.len(), "バックアップコード消費");
        } else {
            tracing::info!("バックアップコード不一致");
        }

        outcome
    }

    /// 2FA無効化の永続化指示を発行
    ///
    /// この層では再検証を要求しない。追加の確認（パスワード再入力等）は
    /// 呼び出し側が重ねる
    pub fn disable(&self) -> TwoFactorUpdate {
        tracing::info!("2FA無効化指示を発行");
        TwoFactorUpdate::disabled()
    }
}

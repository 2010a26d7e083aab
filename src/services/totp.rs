use aes_gcm::{Aes256Gcm, KeyInit, Nonce, aead::Aead};
use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use rand::rngs::OsRng;
use totp_rs::{Algorithm, TOTP};

use crate::error::AppError;

/// TOTP (Time-based One-Time Password) サービス
///
/// # Security
/// - シークレットはAES-256-GCMで封緘してから永続化層へ渡す
/// - シークレット平文・検証コードはログに出力しない
#[derive(Clone)]
pub struct TotpService {
    issuer: String,
    encryption_key: [u8; 32],
}

impl TotpService {
    /// 新しい TotpService を作成
    ///
    /// # Arguments
    /// * `issuer` - TOTP発行者名（認証アプリに表示される）
    /// * `encryption_key_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(issuer: String, encryption_key_base64: &str) -> Result<Self, AppError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        let key_bytes = STANDARD.decode(encryption_key_base64).map_err(|e| {
            tracing::error!(error = ?e, "暗号化キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        if key_bytes.len() != 32 {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "暗号化キーの長さが不正"
            );
            return Err(AppError::Internal(anyhow::anyhow!(
                "encryption key must be 32 bytes"
            )));
        }

        let mut encryption_key = [0u8; 32];
        encryption_key.copy_from_slice(&key_bytes);

        Ok(Self {
            issuer,
            encryption_key,
        })
    }

    /// 20バイト（160ビット）のランダムシークレットを生成し、
    /// パディングなしBase32でエンコード
    ///
    /// # Note
    /// 乱数源の枯渇は致命的エラーとして伝播する（リトライしない）
    pub fn generate_secret() -> Result<String, AppError> {
        let mut bytes = [0u8; 20];
        OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
            tracing::error!(error = ?e, "乱数源からの読み出しに失敗");
            AppError::Internal(anyhow::anyhow!("randomness source failure"))
        })?;
        Ok(BASE32_NOPAD.encode(&bytes))
    }

    /// otpauth:// 形式のプロビジョニングURIを構築
    ///
    /// account_label はメール形式の検証をせず、そのままURIへ埋め込む
    pub fn provisioning_uri(&self, account_label: &str, secret: &str) -> Result<String, AppError> {
        let totp = self.create_totp(secret, Some(account_label))?;
        Ok(totp.get_url())
    }

    /// プロビジョニングURIをQRコードとして描画（PNG、Base64エンコード）
    ///
    /// 描画失敗は設定フローを止めるため、握りつぶさずエラーとして返す
    pub fn generate_qr_code(&self, account_label: &str, secret: &str) -> Result<String, AppError> {
        let totp = self.create_totp(secret, Some(account_label))?;

        totp.get_qr_base64().map_err(|e| {
            tracing::error!(error = %e, "QRコード生成エラー");
            AppError::QrGeneration(e)
        })
    }

    /// TOTPコードを現在時刻で検証
    ///
    /// # Note
    /// 前後1ステップの時間ウィンドウを許容（±30秒）
    pub fn verify_code(&self, secret: &str, code: &str) -> bool {
        match unix_now() {
            Ok(now) => self.verify_code_at(secret, code, now),
            Err(_) => false,
        }
    }

    /// TOTPコードを指定時刻で検証（時刻注入用）
    ///
    /// # Security
    /// - コード比較は totp-rs 内部で定数時間比較される
    /// - 不正な形式のコード・シークレットは例外にせず false を返し、
    ///   単なる不一致と区別させない
    pub fn verify_code_at(&self, secret: &str, code: &str, unix_time: u64) -> bool {
        // コードは6桁の数字のみ
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }

        match self.create_totp(secret, None) {
            // check は skew を考慮して前後1ステップも検証
            Ok(totp) => totp.check(code, unix_time),
            Err(_) => false,
        }
    }

    /// シークレットをAES-256-GCMで封緘
    ///
    /// # Returns
    /// 96ビットnonce (12バイト) + 暗号文
    pub fn encrypt_secret(&self, secret: &str) -> Result<Vec<u8>, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        // 96ビット (12バイト) のランダムnonce生成
        let mut nonce_bytes = [0u8; 12];
        OsRng.try_fill_bytes(&mut nonce_bytes).map_err(|e| {
            tracing::error!(error = ?e, "乱数源からの読み出しに失敗");
            AppError::Internal(anyhow::anyhow!("randomness source failure"))
        })?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレット封緘エラー");
            AppError::Internal(anyhow::anyhow!("encryption error"))
        })?;

        let mut result = Vec::with_capacity(12 + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// 封緘されたシークレットを復号
    pub fn decrypt_secret(&self, encrypted: &[u8]) -> Result<String, AppError> {
        if encrypted.len() < 12 {
            tracing::error!(len = encrypted.len(), "封緘データが短すぎる");
            return Err(AppError::Internal(anyhow::anyhow!(
                "encrypted data too short"
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        let (nonce_bytes, ciphertext) = encrypted.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|e| {
            tracing::error!(error = ?e, "シークレット復号エラー");
            AppError::Internal(anyhow::anyhow!("decryption error"))
        })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::error!(error = ?e, "復号データのUTF-8変換エラー");
            AppError::Internal(anyhow::anyhow!("invalid utf8 after decryption"))
        })
    }

    /// TOTP オブジェクトを作成
    ///
    /// account_label が Some の場合はURI/QR用に発行者情報を含め、
    /// None の場合は検証専用
    fn create_totp(&self, secret: &str, account_label: Option<&str>) -> Result<TOTP, AppError> {
        let secret_bytes = BASE32_NOPAD.decode(secret.as_bytes()).map_err(|e| {
            tracing::warn!(error = ?e, "シークレットのBase32デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid base32 secret"))
        })?;

        let (issuer, account_name) = match account_label {
            Some(label) => (Some(self.issuer.clone()), label.to_string()),
            None => (None, String::new()),
        };

        TOTP::new(
            Algorithm::SHA1,
            6,  // 6桁
            1,  // skew: 前後1ステップ許容
            30, // period: 30秒
            secret_bytes,
            issuer,
            account_name,
        )
        .map_err(|e| {
            tracing::warn!(error = %e, "TOTP作成エラー");
            AppError::Internal(anyhow::anyhow!("totp creation error"))
        })
    }
}

/// 現在のUNIX時刻（秒）
pub(crate) fn unix_now() -> Result<u64, AppError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| {
            tracing::error!(error = ?e, "システム時刻取得エラー");
            AppError::Internal(anyhow::anyhow!("system time error"))
        })?;
    Ok(now.as_secs())
}

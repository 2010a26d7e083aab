use serde::{Deserialize, Serialize};

/// 進行中の2FA設定セッション
///
/// initiate で生成され、verify まで呼び出し側（短命セッションストア等）が
/// そのまま保持して持ち戻す。コアは永続化しない。
///
/// # Security
/// - secret / backup_codes は平文。ログに出力禁止
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentSession {
    /// Base32エンコードされたTOTPシークレット（平文）
    pub secret: String,
    /// 平文バックアップコード（ユーザーへ一度だけ表示する）
    pub backup_codes: Vec<String>,
    /// otpauth:// 形式のプロビジョニングURI
    pub provisioning_uri: String,
    /// QRコード（PNG、data URL形式）
    pub qr_code: String,
}

/// 永続化層への更新指示
///
/// コア自身はI/Oを行わない。呼び出し側がこの内容を1アカウント分として
/// 原子的にコミットする。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoFactorUpdate {
    /// AES-256-GCMで封緘されたシークレット（nonce 12バイト + 暗号文）
    pub secret_encrypted: Option<Vec<u8>>,
    /// バックアップコードのSHA-256ハッシュ（16進64文字）
    pub hashed_backup_codes: Option<Vec<String>>,
    pub enabled: bool,
}

impl TwoFactorUpdate {
    /// 2FA無効化の指示（シークレット・コードを破棄）
    pub fn disabled() -> Self {
        Self {
            secret_encrypted: None,
            hashed_backup_codes: None,
            enabled: false,
        }
    }
}

/// アカウントの二要素認証状態
///
/// 「検証待ち」は EnrollmentSession 側にのみ存在し、永続状態は
/// 検証が成功するまで Disabled のまま
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TwoFactorState {
    Disabled,
    Enabled {
        secret_encrypted: Vec<u8>,
        hashed_backup_codes: Vec<String>,
    },
}

impl TwoFactorState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    /// 更新指示を適用した後の状態を返す
    pub fn apply(self, update: TwoFactorUpdate) -> Self {
        match update {
            TwoFactorUpdate {
                secret_encrypted: Some(secret_encrypted),
                hashed_backup_codes: Some(hashed_backup_codes),
                enabled: true,
            } => Self::Enabled {
                secret_encrypted,
                hashed_backup_codes,
            },
            _ => Self::Disabled,
        }
    }
}

use garde::Validate;
use serde::Deserialize;

/// 2FA設定開始リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct EnrollRequest {
    /// otpauth URIに埋め込むアカウントラベル（通常はメールアドレス）
    /// メール形式の検証は行わない。URIへそのまま引き渡される
    #[garde(length(chars, min = 1, max = 254))]
    pub account_label: String,
}

/// 2FA有効化リクエスト（設定セッションに対する初回コード検証）
///
/// コードの形式はここでは検証しない。不正な形式は検証失敗（false）として
/// 扱い、形式エラーと不一致を区別させない
#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub code: String,
}

/// ログイン時のTOTPコード検証リクエスト
#[derive(Debug, Deserialize)]
pub struct VerifyLoginRequest {
    pub code: String,
}

/// バックアップコード検証リクエスト
#[derive(Debug, Deserialize)]
pub struct VerifyBackupCodeRequest {
    pub code: String,
}

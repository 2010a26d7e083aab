use data_encoding::HEXUPPER;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// バックアップコード検証の結果
///
/// remaining は消費後のハッシュ列。呼び出し側がこれを永続化することで
/// 消費済みコードの再利用を防ぐ（コア自身は状態を持たない）
#[derive(Debug, Clone, PartialEq)]
pub struct BackupCodeOutcome {
    pub valid: bool,
    pub remaining: Vec<String>,
}

/// バックアップコード（リカバリーコード）サービス
///
/// # Security
/// - 平文コードは生成時に一度だけ返し、保存はSHA-256ハッシュのみ
/// - コード平文はログに出力しない
pub struct BackupCodeService;

impl BackupCodeService {
    /// `XXXX-XXXX` 形式のバックアップコードを count 個生成
    ///
    /// 各コードは4バイトの独立した乱数を大文字16進8文字に描画したもの。
    /// バッチ内の重複は排除しない（2^32空間で衝突確率は無視できる）
    pub fn generate_codes(count: usize) -> Result<Vec<String>, AppError> {
        let mut codes = Vec::with_capacity(count);

        for _ in 0..count {
            let mut bytes = [0u8; 4];
            OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
                tracing::error!(error = ?e, "乱数源からの読み出しに失敗");
                AppError::Internal(anyhow::anyhow!("randomness source failure"))
            })?;

            let hex = HEXUPPER.encode(&bytes);
            codes.push(format!("{}-{}", &hex[..4], &hex[4..]));
        }

        Ok(codes)
    }

    /// コードを正規化してSHA-256ハッシュ化（16進64文字）
    ///
    /// ハイフンの有無・大文字小文字の揺れは同一ハッシュに正規化される
    pub fn hash_code(code: &str) -> String {
        let normalized = normalize(code);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// 提示されたコードをハッシュ列と照合し、一致した1件を消費する
    ///
    /// 一致した場合は valid=true と、その1件（重複があれば先頭の一致のみ）を
    /// 元の順序を保って取り除いた remaining を返す。不一致の場合は
    /// ハッシュ列をそのまま返す
    pub fn verify_and_consume(submitted: &str, hashed_codes: &[String]) -> BackupCodeOutcome {
        let submitted_hash = Self::hash_code(submitted);

        let position = hashed_codes
            .iter()
            .position(|candidate| digest_eq(candidate, &submitted_hash));

        match position {
            Some(index) => {
                let mut remaining = hashed_codes.to_vec();
                remaining.remove(index);
                BackupCodeOutcome {
                    valid: true,
                    remaining,
                }
            }
            None => BackupCodeOutcome {
                valid: false,
                remaining: hashed_codes.to_vec(),
            },
        }
    }
}

/// 英数字以外を除去して大文字化し、8文字なら `XXXX-XXXX` に再グループ化
///
/// 8文字にならない入力はそのまま返す（どのハッシュとも一致しない）
fn normalize(code: &str) -> String {
    let alnum: String = code
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if alnum.len() == 8 {
        format!("{}-{}", &alnum[..4], &alnum[4..])
    } else {
        alnum
    }
}

/// ハッシュ同士の定数時間比較（短絡評価による漏洩を避ける）
fn digest_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_codes() -> Vec<String> {
        vec![
            "11A4-B2C3".to_string(),
            "D4E5-F607".to_string(),
            "0000-FFFF".to_string(),
            "89AB-CDEF".to_string(),
        ]
    }

    fn hashed(codes: &[String]) -> Vec<String> {
        codes.iter().map(|c| BackupCodeService::hash_code(c)).collect()
    }

    #[test]
    fn test_generate_codes_format() {
        let codes = BackupCodeService::generate_codes(10).unwrap();

        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 9);
            assert_eq!(&code[4..5], "-");
            let (head, tail) = (&code[..4], &code[5..]);
            assert!(head.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
            assert!(tail.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_generate_codes_custom_count() {
        let codes = BackupCodeService::generate_codes(5).unwrap();
        assert_eq!(codes.len(), 5);
    }

    #[test]
    fn test_hash_code_is_hex_sha256() {
        let hash = BackupCodeService::hash_code("11A4-B2C3");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_normalization_idempotence() {
        // ハイフン・大文字小文字の揺れは同一ハッシュになる
        let reference = BackupCodeService::hash_code("AB12-CD34");
        assert_eq!(BackupCodeService::hash_code("ab12-cd34"), reference);
        assert_eq!(BackupCodeService::hash_code("AB12CD34"), reference);
        assert_eq!(BackupCodeService::hash_code("ab12cd34"), reference);
        assert_eq!(BackupCodeService::hash_code(" ab12 cd34 "), reference);
    }

    #[test]
    fn test_verify_and_consume_round_trip() {
        let codes = fixed_codes();
        let stored = hashed(&codes);

        let outcome = BackupCodeService::verify_and_consume(&codes[2], &stored);

        assert!(outcome.valid);
        assert_eq!(outcome.remaining.len(), 3);
        // 消費したコードのハッシュだけが、元の相対順序を保って除かれる
        assert_eq!(outcome.remaining[0], stored[0]);
        assert_eq!(outcome.remaining[1], stored[1]);
        assert_eq!(outcome.remaining[2], stored[3]);
    }

    #[test]
    fn test_consumed_code_cannot_be_reused() {
        let codes = fixed_codes();
        let stored = hashed(&codes);

        let first = BackupCodeService::verify_and_consume(&codes[0], &stored);
        assert!(first.valid);

        let second = BackupCodeService::verify_and_consume(&codes[0], &first.remaining);
        assert!(!second.valid);
        assert_eq!(second.remaining, first.remaining);
    }

    #[test]
    fn test_two_sequential_consumptions() {
        let codes = fixed_codes();
        let stored = hashed(&codes);

        let first = BackupCodeService::verify_and_consume(&codes[1], &stored);
        let second = BackupCodeService::verify_and_consume(&codes[3], &first.remaining);

        assert!(first.valid);
        assert!(second.valid);
        assert_eq!(second.remaining, vec![stored[0].clone(), stored[2].clone()]);
    }

    #[test]
    fn test_verify_accepts_input_variants() {
        let stored = hashed(&fixed_codes());

        // ハイフンなし・小文字でも照合できる
        let outcome = BackupCodeService::verify_and_consume("11a4b2c3", &stored);
        assert!(outcome.valid);
        assert_eq!(outcome.remaining.len(), 3);
    }

    #[test]
    fn test_verify_unknown_code() {
        let stored = hashed(&fixed_codes());

        let outcome = BackupCodeService::verify_and_consume("FFFF-0000", &stored);
        assert!(!outcome.valid);
        assert_eq!(outcome.remaining, stored);
    }

    #[test]
    fn test_verify_malformed_input_is_rejection() {
        let stored = hashed(&fixed_codes());

        for submitted in ["", "###", "短い", "11A4-B2C3-EXTRA"] {
            let outcome = BackupCodeService::verify_and_consume(submitted, &stored);
            assert!(!outcome.valid);
            assert_eq!(outcome.remaining, stored);
        }
    }

    #[test]
    fn test_duplicate_hashes_consume_first_match_only() {
        let code = "11A4-B2C3".to_string();
        let hash = BackupCodeService::hash_code(&code);
        let stored = vec![hash.clone(), hash.clone()];

        let outcome = BackupCodeService::verify_and_consume(&code, &stored);

        assert!(outcome.valid);
        assert_eq!(outcome.remaining, vec![hash]);
    }
}

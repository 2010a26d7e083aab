#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("QRコード生成エラー: {0}")]
    QrGeneration(String),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

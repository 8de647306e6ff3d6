use thiserror::Error;

#[derive(Debug, Error)]
pub enum WropenError {
    #[error("wropen is not configured; call configure once")]
    NotConfigured,
    #[error("io error: {0}")]
    Io(String),
    #[error("response table parse error: {0}")]
    TableParse(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("cli error: {0}")]
    Cli(String),
}

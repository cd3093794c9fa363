use std::fmt;

/// Errors produced by the shortener core.
///
/// "Already shortened" is not in here: a conflicting `put` is reported as
/// [`crate::storage::PutOutcome::Conflict`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortenerError {
    NotFound(String),
    Retired(String),
    BackendUnreachable(String),
    IdentityInvalid(String),
    DatabaseConfig(String),
    DatabaseOperation(String),
    FileOperation(String),
    Serialization(String),
    Validation(String),
    Timeout(String),
    Config(String),
}

impl ShortenerError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ShortenerError::NotFound(_) => "E001",
            ShortenerError::Retired(_) => "E002",
            ShortenerError::BackendUnreachable(_) => "E003",
            ShortenerError::IdentityInvalid(_) => "E004",
            ShortenerError::DatabaseConfig(_) => "E005",
            ShortenerError::DatabaseOperation(_) => "E006",
            ShortenerError::FileOperation(_) => "E007",
            ShortenerError::Serialization(_) => "E008",
            ShortenerError::Validation(_) => "E009",
            ShortenerError::Timeout(_) => "E010",
            ShortenerError::Config(_) => "E011",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            ShortenerError::NotFound(_) => "Resource Not Found",
            ShortenerError::Retired(_) => "Resource Retired",
            ShortenerError::BackendUnreachable(_) => "Backend Unreachable",
            ShortenerError::IdentityInvalid(_) => "Identity Invalid",
            ShortenerError::DatabaseConfig(_) => "Database Configuration Error",
            ShortenerError::DatabaseOperation(_) => "Database Operation Error",
            ShortenerError::FileOperation(_) => "File Operation Error",
            ShortenerError::Serialization(_) => "Serialization Error",
            ShortenerError::Validation(_) => "Validation Error",
            ShortenerError::Timeout(_) => "Operation Timed Out",
            ShortenerError::Config(_) => "Configuration Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            ShortenerError::NotFound(msg)
            | ShortenerError::Retired(msg)
            | ShortenerError::BackendUnreachable(msg)
            | ShortenerError::IdentityInvalid(msg)
            | ShortenerError::DatabaseConfig(msg)
            | ShortenerError::DatabaseOperation(msg)
            | ShortenerError::FileOperation(msg)
            | ShortenerError::Serialization(msg)
            | ShortenerError::Validation(msg)
            | ShortenerError::Timeout(msg)
            | ShortenerError::Config(msg) => msg,
        }
    }

    /// Control values the immediate caller is expected to handle
    /// (not-found, retired, identity reissue). Everything else is an
    /// operational failure of the backend or the environment.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ShortenerError::NotFound(_)
                | ShortenerError::Retired(_)
                | ShortenerError::IdentityInvalid(_)
        )
    }

    /// 格式化为彩色输出
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for ShortenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for ShortenerError {}

// 便捷的构造函数
impl ShortenerError {
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        ShortenerError::NotFound(msg.into())
    }

    pub fn retired<T: Into<String>>(msg: T) -> Self {
        ShortenerError::Retired(msg.into())
    }

    pub fn backend_unreachable<T: Into<String>>(msg: T) -> Self {
        ShortenerError::BackendUnreachable(msg.into())
    }

    pub fn identity_invalid<T: Into<String>>(msg: T) -> Self {
        ShortenerError::IdentityInvalid(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        ShortenerError::DatabaseConfig(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        ShortenerError::DatabaseOperation(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        ShortenerError::FileOperation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        ShortenerError::Serialization(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ShortenerError::Validation(msg.into())
    }

    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        ShortenerError::Timeout(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        ShortenerError::Config(msg.into())
    }
}

impl From<sea_orm::DbErr> for ShortenerError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::Conn(_) | sea_orm::DbErr::ConnectionAcquire(_) => {
                ShortenerError::BackendUnreachable(err.to_string())
            }
            other => ShortenerError::DatabaseOperation(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ShortenerError {
    fn from(err: std::io::Error) -> Self {
        ShortenerError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for ShortenerError {
    fn from(err: serde_json::Error) -> Self {
        ShortenerError::Serialization(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ShortenerError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ShortenerError::IdentityInvalid(err.to_string())
    }
}

impl From<config::ConfigError> for ShortenerError {
    fn from(err: config::ConfigError) -> Self {
        ShortenerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let all = [
            ShortenerError::not_found("x"),
            ShortenerError::retired("x"),
            ShortenerError::backend_unreachable("x"),
            ShortenerError::identity_invalid("x"),
            ShortenerError::database_config("x"),
            ShortenerError::database_operation("x"),
            ShortenerError::file_operation("x"),
            ShortenerError::serialization("x"),
            ShortenerError::validation("x"),
            ShortenerError::timeout("x"),
            ShortenerError::config("x"),
        ];
        let mut codes: Vec<&str> = all.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_recoverable_taxonomy() {
        assert!(ShortenerError::not_found("k").is_recoverable());
        assert!(ShortenerError::retired("k").is_recoverable());
        assert!(ShortenerError::identity_invalid("t").is_recoverable());
        assert!(!ShortenerError::backend_unreachable("db").is_recoverable());
        assert!(!ShortenerError::timeout("db").is_recoverable());
    }

    #[test]
    fn test_display_uses_simple_format() {
        let err = ShortenerError::retired("abc");
        assert_eq!(err.to_string(), "Resource Retired: abc");
        assert_eq!(err.message(), "abc");
    }

    #[test]
    fn test_io_error_maps_to_file_operation() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ShortenerError = io.into();
        assert!(matches!(err, ShortenerError::FileOperation(_)));
    }
}

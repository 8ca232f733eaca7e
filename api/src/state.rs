use sqlx::PgPool;

/// How rate-limit denials are applied.
///
/// `Shadow` runs the full check-and-record pipeline but never blocks the
/// request; used when rolling out new policies against live traffic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnforcementMode {
    Enforce,
    Shadow,
}

impl EnforcementMode {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("RATE_LIMIT_MODE").unwrap_or_default())
    }

    fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "shadow" => Self::Shadow,
            _ => Self::Enforce,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::Shadow => "shadow",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub enforcement: EnforcementMode,
}

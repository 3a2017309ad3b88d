use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => e,
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

/// Configuration mistakes the user can fix map to [`RunError::InvalidInput`]; the rest is a
/// runtime failure.
impl From<stampede_core::Error> for RunError {
    fn from(err: stampede_core::Error) -> Self {
        use stampede_core::Error as E;
        match err {
            E::UnknownStep(_)
            | E::InvalidIterations
            | E::InvalidConcurrency
            | E::InvalidConcurrencyTarget { .. }
            | E::InvalidConsumers => Self::InvalidInput(err.into()),
            E::Join(_) | E::Value(_) | E::Bus(_) => Self::RuntimeError(err.into()),
        }
    }
}

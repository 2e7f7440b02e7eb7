use thiserror::Error;

/// Coarse error classes, used by callers that only care how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wiring mistake by the host application; fatal.
    Configuration,
    /// Something looked up by id does not exist (yet).
    NotFound,
    /// I/O that the runtime retries or recovers from on its own.
    TransientIo,
    /// The i18n engine failed to start; aborts initialization.
    Bootstrap,
}

/// Structured errors for the package runtime.
#[derive(Debug, Error)]
pub enum ArkError {
    // Configuration
    #[error("module id must not be empty")]
    EmptyModuleId,
    #[error("module '{id}' is already registered")]
    DuplicateModule { id: String },
    #[error("module '{module}' has views or components but no view connector was provided; call use_connector() before register_module()")]
    MissingConnector { module: String },
    #[error("no i18n engine attached; call use_i18n() before initialize()")]
    MissingI18n,
    #[error("'{operation}' requires an initialized package runtime")]
    NotInitialized { operation: &'static str },
    #[error("package runtime is already initialized")]
    AlreadyInitialized,
    #[error("theme '{id}' is already in the catalog")]
    DuplicateTheme { id: String },
    #[error("invalid theme type '{value}' (expected 'light' or 'dark')")]
    InvalidThemeType { value: String },
    #[error("invalid runtime mode '{value}' (expected 'browser' or 'server')")]
    InvalidMode { value: String },
    #[error("configuration environment '{name}' must be a JSON object")]
    InvalidEnvironment { name: String },
    #[error("configuration does not match the requested shape")]
    InvalidConfig(#[source] serde_json::Error),
    #[error("invalid configuration for provider '{provider}'")]
    ProviderConfig {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    // Not found
    #[error("theme '{id}' is not registered")]
    ThemeNotRegistered { id: String },
    #[error("module '{module}' cannot read state: the store has not been set up yet")]
    StoreNotReady { module: String },
    #[error("module '{module}' has no state slice")]
    NoStateSlice { module: String },
    #[error("module '{module}' declares no action named '{name}'")]
    UnknownAction { module: String, name: String },

    // Transient I/O
    #[error("theme '{id}' stylesheet did not load within {after_ms} ms")]
    ThemeLoadTimeout { id: String, after_ms: u128 },
    #[error("request to provider '{provider}' failed")]
    ProviderRequest {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    // Bootstrap / lifecycle
    #[error("i18n bootstrap failed")]
    Bootstrap(#[source] anyhow::Error),
    #[error("startup hook failed for module '{module}'")]
    ModuleStart {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ArkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArkError::EmptyModuleId
            | ArkError::DuplicateModule { .. }
            | ArkError::MissingConnector { .. }
            | ArkError::MissingI18n
            | ArkError::NotInitialized { .. }
            | ArkError::AlreadyInitialized
            | ArkError::DuplicateTheme { .. }
            | ArkError::InvalidThemeType { .. }
            | ArkError::InvalidMode { .. }
            | ArkError::InvalidEnvironment { .. }
            | ArkError::InvalidConfig(_)
            | ArkError::ProviderConfig { .. } => ErrorKind::Configuration,
            ArkError::ThemeNotRegistered { .. }
            | ArkError::StoreNotReady { .. }
            | ArkError::NoStateSlice { .. }
            | ArkError::UnknownAction { .. } => ErrorKind::NotFound,
            ArkError::ThemeLoadTimeout { .. } | ArkError::ProviderRequest { .. } => {
                ErrorKind::TransientIo
            }
            ArkError::Bootstrap(_) | ArkError::ModuleStart { .. } => ErrorKind::Bootstrap,
        }
    }
}

pub type ArkResult<T> = Result<T, ArkError>;

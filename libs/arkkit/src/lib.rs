//! # ArkKit - Pluggable Application Runtime
//!
//! A composition root for applications assembled from independent modules.
//!
//! ## Features
//!
//! - **Module registry**: modules declare action types, views, components and
//!   an optional reducer; the runtime namespaces and wires them once
//! - **Shared store**: one state slice per stateful module plus the core slice
//!   (authentication, theme, alerts)
//! - **Theme switching**: load-probe-commit with rollback on timeout
//! - **Service providers**: named, lazily created backend clients with
//!   per-module overrides
//! - **Configuration environments**: a `default` bag overlaid by the active one
//!
//! ## Basic Module Example
//!
//! ```rust,ignore
//! use arkkit::{async_trait, ActionTypes, AppModule, ModuleCtx};
//!
//! pub struct Notes;
//!
//! #[async_trait]
//! impl AppModule for Notes {
//!     fn module_type(&self) -> &str { "notes" }
//!
//!     fn action_types(&self) -> ActionTypes {
//!         ActionTypes::new().with("ADD", "ADD")
//!     }
//!
//!     async fn main(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
//!         ctx.dispatch(ctx.action("ADD", serde_json::json!("hello"))?)?;
//!         Ok(())
//!     }
//! }
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

pub mod client_hub;
pub mod config;
pub mod context;
pub mod contracts;
pub mod error;
pub mod i18n;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod theme;
pub mod view;

pub use client_hub::{
    ClientHub, HttpProviderFactory, HttpServiceClient, ProviderConfig, ProviderFactory,
    ProviderOverride, ServiceClient, MAIN_PROVIDER,
};
pub use config::{ConfigEnvironments, DEFAULT_ENVIRONMENT};
pub use context::ModuleCtx;
pub use contracts::{AppModule, Component, ComponentMap, Connector, Markup};
pub use error::{ArkError, ArkResult, ErrorKind};
pub use i18n::{I18nEngine, I18nOptions, StaticI18n};
pub use registry::{ActionTypes, ModuleEntry};
pub use runtime::{ContextFetchOptions, Package, PackageBuilder, PackageOptions, RuntimeMode};
pub use store::{
    reducer_fn, Action, AlertRecord, CoreState, CurrentUser, Reducer, StateSnapshot, Store,
    ThemeType,
};
pub use theme::{
    Document, FilePreferences, HeadlessDocument, LoadBehavior, MemoryPreferences,
    PreferenceStore, SwitchOutcome, Theme, ThemePhase, ThemeSwitch, ThemeTimings,
};
pub use view::{Props, StateBinding, StoreConnector};

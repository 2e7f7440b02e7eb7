//! Initialization sequence, module startup and the server-context fetch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use parking_lot::Mutex;
use serde_json::{json, Value};

use arkkit::{
    ActionTypes, AppModule, ArkError, ConfigEnvironments, ContextFetchOptions, ErrorKind,
    ModuleCtx, Package, PackageOptions, ProviderConfig, ProviderFactory, Reducer, RuntimeMode,
    ServiceClient, StaticI18n, reducer_fn,
};

type Journal = Arc<Mutex<Vec<String>>>;

/// Records its startup hook and what it could see from there.
struct Recorder {
    journal: Journal,
    wants_context: bool,
    fail: bool,
}

#[async_trait]
impl AppModule for Recorder {
    fn module_type(&self) -> &str {
        "recorder"
    }

    fn action_types(&self) -> ActionTypes {
        ActionTypes::new().with("PING", "PING")
    }

    fn reducer(&self, _action_types: &ActionTypes) -> Option<Arc<dyn Reducer>> {
        Some(reducer_fn(Vec::<String>::new(), |log: &Vec<String>, action| {
            action.kind.ends_with("-PING").then(|| {
                let mut next = log.clone();
                next.push(action.kind.clone());
                next
            })
        }))
    }

    fn initialize_server_context(&self) -> bool {
        self.wants_context
    }

    async fn main(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("refusing to start");
        }
        ctx.dispatch(ctx.action("PING", Value::Null)?)?;
        let seen = ctx.get_state::<Vec<String>>()?;
        self.journal
            .lock()
            .push(format!("{}:{}", ctx.id(), seen.join(",")));
        Ok(())
    }
}

fn recorder(journal: &Journal, wants_context: bool) -> Arc<Recorder> {
    Arc::new(Recorder {
        journal: journal.clone(),
        wants_context,
        fail: false,
    })
}

/// Client that fails a fixed number of times before answering.
struct Flaky {
    failures_left: AtomicUsize,
    calls: Arc<AtomicUsize>,
    body: Value,
}

#[async_trait]
impl ServiceClient for Flaky {
    fn name(&self) -> &str {
        "Main"
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(path, "/__context");
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            anyhow::bail!("connection refused");
        }
        Ok(self.body.clone())
    }

    async fn post_json(&self, _path: &str, _body: &Value) -> anyhow::Result<Value> {
        anyhow::bail!("not supported")
    }
}

struct FlakyFactory {
    failures: usize,
    calls: Arc<AtomicUsize>,
    body: Value,
}

impl ProviderFactory for FlakyFactory {
    fn create(&self, _name: &str, _config: &ProviderConfig) -> anyhow::Result<Arc<dyn ServiceClient>> {
        Ok(Arc::new(Flaky {
            failures_left: AtomicUsize::new(self.failures),
            calls: self.calls.clone(),
            body: self.body.clone(),
        }))
    }
}

fn flaky_package(failures: usize, calls: &Arc<AtomicUsize>) -> Arc<Package> {
    let package = Package::builder()
        .options(PackageOptions {
            context: ContextFetchOptions {
                retry_delay: Duration::from_millis(100),
                ..ContextFetchOptions::default()
            },
            ..PackageOptions::default()
        })
        .provider_factory(Arc::new(FlakyFactory {
            failures,
            calls: calls.clone(),
            body: json!({ "tenant": "acme" }),
        }))
        .build();
    package.use_i18n(Arc::new(StaticI18n::new()), None);
    package
}

#[tokio::test]
async fn modules_start_in_registration_order_with_store_ready() {
    let journal: Journal = Arc::default();
    let package = Package::new();
    package.use_i18n(Arc::new(StaticI18n::new()), None);
    package.register_module("first", recorder(&journal, false)).unwrap();
    package.register_module("second", recorder(&journal, false)).unwrap();

    package.initialize(RuntimeMode::Server, None).await.unwrap();

    // every reducer sees every action
    assert_eq!(
        *journal.lock(),
        vec!["first:first-PING", "second:first-PING,second-PING"]
    );
    // no module asked for server context
    assert!(package.take_context_task().is_none());
}

#[tokio::test]
async fn failing_startup_hook_aborts_initialize() {
    let journal: Journal = Arc::default();
    let package = Package::new();
    package.use_i18n(Arc::new(StaticI18n::new()), None);
    package.register_module("ok", recorder(&journal, false)).unwrap();
    package
        .register_module(
            "bad",
            Arc::new(Recorder {
                journal: journal.clone(),
                wants_context: false,
                fail: true,
            }),
        )
        .unwrap();
    package.register_module("never", recorder(&journal, false)).unwrap();

    let err = package
        .initialize(RuntimeMode::Server, None)
        .await
        .unwrap_err();
    assert!(matches!(&err, ArkError::ModuleStart { module, .. } if module == "bad"));
    assert_eq!(err.kind(), ErrorKind::Bootstrap);
    assert_eq!(*journal.lock(), vec!["ok:ok-PING"]);
}

#[tokio::test]
async fn broken_i18n_resources_abort_before_the_store_exists() {
    let package = Package::new();
    let mut options = arkkit::I18nOptions::default();
    options.lng = "fr".into();
    options.fallback_lng = "de".into();
    package.use_i18n(Arc::new(StaticI18n::new()), Some(options));

    let err = package
        .initialize(RuntimeMode::Browser, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ArkError::Bootstrap(_)));
    assert!(package.store().is_none());
}

#[tokio::test(start_paused = true)]
async fn context_fetch_retries_until_it_succeeds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let package = flaky_package(3, &calls);
    package
        .register_module("ctx", recorder(&Arc::default(), true))
        .unwrap();

    package.initialize(RuntimeMode::Browser, None).await.unwrap();
    let task = package.take_context_task().expect("context fetch started");
    task.await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let core = package.store().unwrap().get_state().core();
    assert!(core.has_initialized);
    assert_eq!(core.extra.get("tenant"), Some(&json!("acme")));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_a_failing_context_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let package = flaky_package(usize::MAX, &calls);
    package
        .register_module("ctx", recorder(&Arc::default(), true))
        .unwrap();
    package.initialize(RuntimeMode::Browser, None).await.unwrap();
    let task = package.take_context_task().unwrap();

    tokio::time::sleep(Duration::from_millis(1050)).await;
    let attempts = calls.load(Ordering::SeqCst);
    assert!(attempts >= 10, "only {attempts} attempts");

    package.shutdown();
    task.await.unwrap();
    assert!(!package.store().unwrap().get_state().core().has_initialized);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(calls.load(Ordering::SeqCst) <= attempts + 1);
}

/// Factory whose providers can never be built.
struct BrokenFactory;

impl ProviderFactory for BrokenFactory {
    fn create(&self, name: &str, _config: &ProviderConfig) -> anyhow::Result<Arc<dyn ServiceClient>> {
        anyhow::bail!("no transport for provider '{name}'")
    }
}

/// Formatted log output, shared with the subscriber.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn count(&self, level: &str, message: &str) -> usize {
        let raw = String::from_utf8_lossy(&self.0.lock()).to_string();
        raw.lines()
            .filter(|l| l.contains(level) && l.contains(message))
            .count()
    }
}

#[tokio::test(start_paused = true)]
async fn repeated_context_failures_warn_once() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let package = Package::builder()
        .options(PackageOptions {
            context: ContextFetchOptions {
                retry_delay: Duration::from_millis(100),
                ..ContextFetchOptions::default()
            },
            ..PackageOptions::default()
        })
        .provider_factory(Arc::new(BrokenFactory))
        .build();
    package.use_i18n(Arc::new(StaticI18n::new()), None);
    package
        .register_module("ctx", recorder(&Arc::default(), true))
        .unwrap();
    package.initialize(RuntimeMode::Browser, None).await.unwrap();
    let task = package.take_context_task().unwrap();

    tokio::time::sleep(Duration::from_millis(1050)).await;
    package.shutdown();
    task.await.unwrap();

    // still retrying, but only the first failure is a warning
    assert_eq!(logs.count("WARN", "context fetch failed; retrying"), 1);
    assert!(logs.count("DEBUG", "context fetch failed again") >= 9);
    assert!(!package.store().unwrap().get_state().core().has_initialized);
}

#[tokio::test]
async fn context_is_fetched_over_http_from_the_main_provider() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/__context");
            then.status(200).json_body(json!({ "tenant": "acme", "isAuthenticated": true }));
        })
        .await;

    let package = Package::new();
    package.configure_environments(
        ConfigEnvironments::default().with(
            "default",
            json!({ "Main": { "base_url": server.base_url() } })
                .as_object()
                .unwrap()
                .clone(),
        ),
    );
    package.use_i18n(Arc::new(StaticI18n::new()), None);
    package
        .register_module("ctx", recorder(&Arc::default(), true))
        .unwrap();
    package.initialize(RuntimeMode::Server, None).await.unwrap();

    let task = package.take_context_task().unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("context fetch finished")
        .unwrap();

    mock.assert_async().await;
    let core = package.store().unwrap().get_state().core();
    assert!(core.has_initialized);
    assert!(core.is_authenticated);
    assert!(package.is_authenticated());
}

#[tokio::test]
async fn module_provider_override_routes_to_named_provider() {
    let package = Package::new();
    package.configure_environments(
        ConfigEnvironments::default().with(
            "default",
            json!({
                "Main": { "base_url": "http://main.local" },
                "Billing": { "base_url": "http://billing.local" }
            })
            .as_object()
            .unwrap()
            .clone(),
        ),
    );
    package.override_module_provider(
        "invoices",
        "Main",
        arkkit::ProviderOverride::Named("Billing".into()),
    );
    package
        .register_module("invoices", recorder(&Arc::default(), false))
        .unwrap();
    package
        .register_module("notes", recorder(&Arc::default(), false))
        .unwrap();

    let invoices = package.module("invoices").unwrap();
    let notes = package.module("notes").unwrap();
    assert_eq!(invoices.ctx().get_service_provider("Main").unwrap().name(), "Billing");
    assert_eq!(notes.ctx().get_service_provider("Main").unwrap().name(), "Main");

    let billing = package.get_service_provider("Billing").unwrap();
    assert!(Arc::ptr_eq(
        &billing,
        &invoices.ctx().get_service_provider("Main").unwrap()
    ));
}

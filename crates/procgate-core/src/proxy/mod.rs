//! Restricted remote-control proxy.
//!
//! `RpcProxy` wraps exactly one privileged object and exposes the subset of
//! its commands named on an allowlist. Every remote call goes through
//! [`RpcProxy::handle`]:
//!
//! 1. `system.*` introspection names are answered from the allowlist.
//! 2. Names off the allowlist fail with `MethodNotSupported`; nothing runs.
//! 3. The proxy tier (built-ins and intercepts) is consulted before the
//!    exposed object's command table, so the proxy can shadow a command.
//! 4. A trailing `js:{...}` argument becomes keyword arguments when its keys
//!    match the target's declared parameters.
//! 5. Handler failures are logged and returned unchanged.
//!
//! # Example
//!
//! ```rust
//! use procgate_core::proxy::{CallArgs, Command, CommandTable, RpcProxy};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Calculator;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> procgate_core::Result<()> {
//! let commands = CommandTable::new().with(Command::from_fn(
//!     "add",
//!     &["a", "b"],
//!     |_: &Calculator, args: CallArgs| {
//!         let a = args.required(0, "a")?.as_i64().unwrap_or_default();
//!         let b = args.required(1, "b")?.as_i64().unwrap_or_default();
//!         Ok(json!(a + b))
//!     },
//! ));
//!
//! let proxy = RpcProxy::builder(commands)
//!     .allow(["add"])
//!     .build(Arc::new(Calculator))?;
//!
//! assert_eq!(proxy.dispatch("add", vec![json!(2), json!(3)]).await?, json!(5));
//! assert!(proxy.dispatch("sub", vec![]).await.is_err());
//! # Ok(())
//! # }
//! ```

mod command;
mod introspection;
mod overlay;

pub use command::{is_truthy, CallArgs, Command, CommandTable, HandlerFuture};
pub use introspection::{Allowlist, MethodInfo};
pub use overlay::{encode_overlay, extract_overlay, resolve_call_args};

use crate::config::ProxyConfig;
use crate::error::{ProcgateError, Result};
use serde_json::{json, Value};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type ExitHook<T> = Box<dyn Fn(&T) -> Result<()> + Send + Sync>;

/// State shared by proxy-tier commands.
pub struct ProxyContext<T> {
    exposed: Arc<T>,
    allowlist: Allowlist,
    terminate: AtomicBool,
}

impl<T> ProxyContext<T> {
    /// The wrapped object. Never reachable through the allowlist.
    pub fn exposed(&self) -> &Arc<T> {
        &self.exposed
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// Record the caller's termination intent. Advisory only.
    pub fn signal_termination(&self, terminate: bool) {
        self.terminate.store(terminate, Ordering::SeqCst);
    }

    pub fn termination_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }
}

/// Result of [`RpcProxy::run_exit_hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitHookStatus {
    /// The hook ran (or none was configured) and returned normally.
    Completed,
    /// The hook ran and returned an error, which was logged.
    Failed,
    /// The hook already ran earlier; it was not run again.
    AlreadyRan,
}

enum Target<'a, T> {
    Proxy(&'a Command<ProxyContext<T>>),
    Exposed(&'a Command<T>),
}

impl<T: Send + Sync + 'static> Target<'_, T> {
    fn params(&self) -> &'static [&'static str] {
        match self {
            Target::Proxy(command) => command.params(),
            Target::Exposed(command) => command.params(),
        }
    }
}

/// Allow-listed dispatch over one exposed object of type `T`.
pub struct RpcProxy<T> {
    context: Arc<ProxyContext<T>>,
    proxy_commands: CommandTable<ProxyContext<T>>,
    exposed_commands: CommandTable<T>,
    exit_hook: Option<ExitHook<T>>,
    exit_hook_ran: AtomicBool,
}

impl<T: Send + Sync + 'static> RpcProxy<T> {
    /// Start configuring a proxy over the given command table.
    pub fn builder(commands: CommandTable<T>) -> ProxyBuilder<T> {
        ProxyBuilder::new(commands)
    }

    /// Entry point for every wire call, including introspection.
    pub async fn handle(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        match method {
            "system.listMethods" => Ok(json!(self.list_methods())),
            "system.methodHelp" => {
                let args = CallArgs::positional(params);
                Ok(Value::String(self.method_help(args.required_str(0, "method")?)))
            }
            "system.methodSignature" => {
                let args = CallArgs::positional(params);
                Ok(self.method_signature(args.required_str(0, "method")?))
            }
            _ => self.dispatch(method, params).await,
        }
    }

    /// Check the allowlist, resolve the target, apply the overlay, invoke.
    pub async fn dispatch(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        if !self.context.allowlist.contains(method) {
            warn!("Rejected call to method outside the allowlist: {}", method);
            return Err(ProcgateError::MethodNotSupported {
                method: method.to_string(),
            });
        }

        let target = self
            .resolve(method)
            .ok_or_else(|| ProcgateError::MethodNotSupported {
                method: method.to_string(),
            })?;

        let args = resolve_call_args(params, target.params());
        debug!("RPC call: {}({:?})", method, args);

        let result = match target {
            Target::Proxy(command) => command.invoke(self.context.clone(), args.clone()).await,
            Target::Exposed(command) => {
                command
                    .invoke(self.context.exposed.clone(), args.clone())
                    .await
            }
        };

        result.inspect_err(|e| {
            error!(
                "Exception encountered while calling {} with params {:?}: {}",
                method, args, e
            );
        })
    }

    fn resolve(&self, method: &str) -> Option<Target<'_, T>> {
        if let Some(command) = self.proxy_commands.get(method) {
            return Some(Target::Proxy(command));
        }
        self.exposed_commands.get(method).map(Target::Exposed)
    }

    pub fn list_methods(&self) -> &[String] {
        self.context.allowlist.list_methods()
    }

    pub fn method_help(&self, method: &str) -> String {
        self.context.allowlist.method_help(method)
    }

    pub fn method_signature(&self, method: &str) -> Value {
        self.context.allowlist.method_signature(method)
    }

    /// The wrapped object, for same-process callers only.
    pub fn exposed_object(&self) -> Arc<T> {
        self.context.exposed.clone()
    }

    pub fn termination_requested(&self) -> bool {
        self.context.termination_requested()
    }

    /// Run the exit hook. Only the first call runs it; failures are logged.
    pub fn run_exit_hook(&self) -> ExitHookStatus {
        if self.exit_hook_ran.swap(true, Ordering::SeqCst) {
            debug!("Exit hook already ran, skipping");
            return ExitHookStatus::AlreadyRan;
        }

        let Some(hook) = &self.exit_hook else {
            return ExitHookStatus::Completed;
        };

        info!("Running RPC proxy exit hook");
        match hook(self.context.exposed.as_ref()) {
            Ok(()) => ExitHookStatus::Completed,
            Err(e) => {
                error!("RPC proxy exit hook failed: {}", e);
                ExitHookStatus::Failed
            }
        }
    }
}

/// Construction-time configuration for [`RpcProxy`].
pub struct ProxyBuilder<T> {
    allowlist: Vec<String>,
    exposed_commands: CommandTable<T>,
    intercepts: Vec<Command<ProxyContext<T>>>,
    exit_hook: Option<ExitHook<T>>,
}

impl<T: Send + Sync + 'static> ProxyBuilder<T> {
    fn new(exposed_commands: CommandTable<T>) -> Self {
        Self {
            allowlist: Vec::new(),
            exposed_commands,
            intercepts: Vec::new(),
            exit_hook: None,
        }
    }

    /// Append names to the allowlist. Order is preserved as given.
    pub fn allow<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist.extend(names.into_iter().map(Into::into));
        self
    }

    /// Register a proxy-tier command, shadowing any command of the same name.
    pub fn intercept(mut self, command: Command<ProxyContext<T>>) -> Self {
        self.intercepts.push(command);
        self
    }

    /// Cleanup to run once when the serving process shuts down.
    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.exit_hook = Some(Box::new(hook));
        self
    }

    /// Build the proxy around `exposed`, which must be a `T`.
    pub fn build(self, exposed: Arc<dyn Any + Send + Sync>) -> Result<RpcProxy<T>> {
        let exposed = exposed
            .downcast::<T>()
            .map_err(|_| ProcgateError::Configuration {
                message: format!("exposed object is not a {}", type_name::<T>()),
            })?;

        if let Some(reserved) = self
            .allowlist
            .iter()
            .find(|name| ProxyConfig::RESERVED_METHODS.contains(&name.as_str()))
        {
            return Err(ProcgateError::Configuration {
                message: format!("{} must never be allow-listed", reserved),
            });
        }

        let mut proxy_commands = builtin_commands::<T>();
        for command in self.intercepts {
            proxy_commands.insert(command);
        }

        let mut methods = HashMap::new();
        for name in &self.allowlist {
            let info = match (proxy_commands.get(name), self.exposed_commands.get(name)) {
                (Some(command), _) => method_info(command),
                (None, Some(command)) => method_info(command),
                (None, None) => {
                    return Err(ProcgateError::Configuration {
                        message: format!("allow-listed method {} has no handler", name),
                    });
                }
            };
            methods.insert(name.clone(), info);
        }

        info!(
            "RPC proxy ready for {} with {} allow-listed methods",
            type_name::<T>(),
            self.allowlist.len()
        );

        Ok(RpcProxy {
            context: Arc::new(ProxyContext {
                exposed,
                allowlist: Allowlist::new(self.allowlist, methods),
                terminate: AtomicBool::new(false),
            }),
            proxy_commands,
            exposed_commands: self.exposed_commands,
            exit_hook: self.exit_hook,
            exit_hook_ran: AtomicBool::new(false),
        })
    }
}

fn method_info<C: Send + Sync + 'static>(command: &Command<C>) -> MethodInfo {
    MethodInfo {
        params: command.params(),
    }
}

fn builtin_commands<T: Send + Sync + 'static>() -> CommandTable<ProxyContext<T>> {
    CommandTable::new()
        .with(Command::from_fn(
            "signal_termination",
            &["terminate"],
            |ctx: &ProxyContext<T>, args: CallArgs| {
                let terminate = is_truthy(args.required(0, "terminate")?);
                info!("Termination signalled by remote caller: {}", terminate);
                ctx.signal_termination(terminate);
                Ok(Value::Null)
            },
        ))
        .with(Command::from_fn(
            "listMethods",
            &[],
            |ctx: &ProxyContext<T>, _| Ok(json!(ctx.allowlist().list_methods())),
        ))
        .with(Command::from_fn(
            "methodHelp",
            &["method"],
            |ctx: &ProxyContext<T>, args: CallArgs| {
                Ok(Value::String(
                    ctx.allowlist().method_help(args.required_str(0, "method")?),
                ))
            },
        ))
        .with(Command::from_fn(
            "methodSignature",
            &["method"],
            |ctx: &ProxyContext<T>, args: CallArgs| {
                Ok(ctx
                    .allowlist()
                    .method_signature(args.required_str(0, "method")?))
            },
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Workers {
        calls: AtomicUsize,
        last_args: Mutex<Option<CallArgs>>,
    }

    impl Workers {
        fn record(&self, args: &CallArgs) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_args.lock().unwrap() = Some(args.clone());
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_args(&self) -> CallArgs {
            self.last_args.lock().unwrap().clone().unwrap()
        }
    }

    fn commands() -> CommandTable<Workers> {
        CommandTable::new()
            .with(Command::from_fn(
                "echo",
                &["text", "repeat"],
                |w: &Workers, args: CallArgs| {
                    w.record(&args);
                    let text = args.required_str(0, "text")?;
                    let repeat = args.optional_i64(1, "repeat")?.unwrap_or(1);
                    Ok(json!(text.repeat(repeat.max(0) as usize)))
                },
            ))
            .with(Command::from_fn(
                "capture",
                &["a", "b", "c"],
                |w: &Workers, args: CallArgs| {
                    w.record(&args);
                    Ok(Value::Null)
                },
            ))
            .with(Command::from_fn(
                "signal_termination",
                &["terminate"],
                |w: &Workers, args: CallArgs| {
                    w.record(&args);
                    Ok(json!("exposed"))
                },
            ))
            .with(Command::from_fn("explode", &[], |w: &Workers, args| {
                w.record(&args);
                Err(ProcgateError::Other("worker pool exhausted".into()))
            }))
            .with(Command::from_fn("get_exposed_object", &[], |_: &Workers, _| {
                Ok(json!("leaked"))
            }))
            .with(Command::from_fn("hidden", &[], |w: &Workers, args| {
                w.record(&args);
                Ok(Value::Null)
            }))
    }

    fn proxy(allow: &[&str]) -> (RpcProxy<Workers>, Arc<Workers>) {
        let workers = Arc::new(Workers::default());
        let proxy = RpcProxy::builder(commands())
            .allow(allow.iter().copied())
            .build(workers.clone())
            .unwrap();
        (proxy, workers)
    }

    #[tokio::test]
    async fn test_method_off_allowlist_is_rejected_without_invocation() {
        let (proxy, workers) = proxy(&["echo"]);

        let err = proxy.dispatch("hidden", vec![]).await.unwrap_err();
        assert!(matches!(err, ProcgateError::MethodNotSupported { ref method } if method == "hidden"));

        let err = proxy.dispatch("no_such_thing", vec![]).await.unwrap_err();
        assert!(matches!(err, ProcgateError::MethodNotSupported { .. }));
        assert_eq!(workers.calls(), 0);
    }

    #[tokio::test]
    async fn test_proxy_tier_shadows_exposed_command() {
        let (proxy, workers) = proxy(&["signal_termination"]);

        let result = proxy
            .dispatch("signal_termination", vec![json!(true)])
            .await
            .unwrap();

        assert_eq!(result, Value::Null);
        assert!(proxy.termination_requested());
        assert_eq!(workers.calls(), 0);
    }

    #[tokio::test]
    async fn test_signal_termination_uses_truthiness() {
        let (proxy, _) = proxy(&["signal_termination"]);

        proxy.dispatch("signal_termination", vec![json!(1)]).await.unwrap();
        assert!(proxy.termination_requested());

        proxy.dispatch("signal_termination", vec![json!("")]).await.unwrap();
        assert!(!proxy.termination_requested());
    }

    #[tokio::test]
    async fn test_overlay_supplies_keyword_arguments() {
        let (proxy, workers) = proxy(&["echo"]);

        let result = proxy
            .dispatch("echo", vec![json!("42"), json!("js:{\"repeat\":5}")])
            .await
            .unwrap();

        assert_eq!(result, json!("4242424242"));
        let args = workers.last_args();
        assert_eq!(args.positional, vec![json!("42")]);
        assert_eq!(args.keywords.get("repeat"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_bad_overlay_is_passed_through_positionally() {
        let (proxy, workers) = proxy(&["capture"]);

        for params in [
            vec![json!("42"), json!("js:not valid json")],
            vec![json!("42"), json!("js:{\"unknown_param\":1}")],
        ] {
            proxy.dispatch("capture", params.clone()).await.unwrap();
            let args = workers.last_args();
            assert_eq!(args.positional, params);
            assert!(args.keywords.is_empty());
        }
    }

    #[tokio::test]
    async fn test_invocation_error_is_returned_unchanged() {
        let (proxy, workers) = proxy(&["explode"]);

        let err = proxy.dispatch("explode", vec![]).await.unwrap_err();
        assert!(matches!(err, ProcgateError::Other(_)));
        assert_eq!(err.to_string(), "worker pool exhausted");
        assert_eq!(workers.calls(), 1);
    }

    #[tokio::test]
    async fn test_introspection_through_handle() {
        let (proxy, _) = proxy(&["echo", "capture"]);

        assert_eq!(
            proxy.handle("system.listMethods", vec![]).await.unwrap(),
            json!(["echo", "capture"])
        );
        assert_eq!(
            proxy
                .handle("system.methodHelp", vec![json!("example_method")])
                .await
                .unwrap(),
            json!("example_method(2,3) => 5")
        );
        assert_eq!(
            proxy
                .handle("system.methodHelp", vec![json!("anything_else")])
                .await
                .unwrap(),
            json!("")
        );
        assert_eq!(
            proxy
                .handle("system.methodSignature", vec![json!("echo")])
                .await
                .unwrap(),
            json!(["text", "repeat"])
        );
    }

    #[tokio::test]
    async fn test_builtin_introspection_callable_when_allow_listed() {
        let (proxy, _) = proxy(&["listMethods", "methodHelp"]);

        assert_eq!(
            proxy.dispatch("listMethods", vec![]).await.unwrap(),
            json!(["listMethods", "methodHelp"])
        );
        assert_eq!(
            proxy
                .dispatch("methodHelp", vec![json!("example_method")])
                .await
                .unwrap(),
            json!("example_method(2,3) => 5")
        );
    }

    #[test]
    fn test_empty_allowlist() {
        let (proxy, _) = proxy(&[]);
        assert!(proxy.list_methods().is_empty());
    }

    #[test]
    fn test_wrong_exposed_type_is_configuration_error() {
        let result = RpcProxy::builder(commands())
            .allow(["echo"])
            .build(Arc::new(String::from("not a worker pool")));

        assert!(matches!(
            result,
            Err(ProcgateError::Configuration { ref message }) if message.contains("Workers")
        ));
    }

    #[test]
    fn test_reserved_name_cannot_be_allow_listed() {
        let result = RpcProxy::builder(commands())
            .allow(["echo", "get_exposed_object"])
            .build(Arc::new(Workers::default()));

        assert!(matches!(result, Err(ProcgateError::Configuration { .. })));
    }

    #[test]
    fn test_allow_listed_name_without_handler_is_rejected() {
        let result = RpcProxy::builder(commands())
            .allow(["echo", "teleport"])
            .build(Arc::new(Workers::default()));

        assert!(matches!(
            result,
            Err(ProcgateError::Configuration { ref message }) if message.contains("teleport")
        ));
    }

    #[tokio::test]
    async fn test_intercept_replaces_builtin() {
        let workers = Arc::new(Workers::default());
        let proxy = RpcProxy::builder(commands())
            .allow(["listMethods"])
            .intercept(Command::from_fn(
                "listMethods",
                &[],
                |_: &ProxyContext<Workers>, _| Ok(json!(["redacted"])),
            ))
            .build(workers)
            .unwrap();

        assert_eq!(
            proxy.dispatch("listMethods", vec![]).await.unwrap(),
            json!(["redacted"])
        );
    }

    #[test]
    fn test_exit_hook_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let proxy = {
            let runs = runs.clone();
            RpcProxy::builder(commands())
                .on_exit(move |_: &Workers| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build(Arc::new(Workers::default()))
                .unwrap()
        };

        assert_eq!(proxy.run_exit_hook(), ExitHookStatus::Completed);
        assert_eq!(proxy.run_exit_hook(), ExitHookStatus::AlreadyRan);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_exit_hook_is_reported_not_raised() {
        let proxy = RpcProxy::builder(commands())
            .on_exit(|_: &Workers| Err(ProcgateError::Other("flush failed".into())))
            .build(Arc::new(Workers::default()))
            .unwrap();

        assert_eq!(proxy.run_exit_hook(), ExitHookStatus::Failed);
        assert_eq!(proxy.run_exit_hook(), ExitHookStatus::AlreadyRan);
    }

    #[test]
    fn test_exposed_object_is_the_wrapped_instance() {
        let workers = Arc::new(Workers::default());
        let proxy = RpcProxy::builder(commands())
            .build(workers.clone())
            .unwrap();

        assert!(Arc::ptr_eq(&proxy.exposed_object(), &workers));
    }
}

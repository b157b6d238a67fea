//! Pre- and post-migration hooks.
//!
//! Hooks run against the variables of the migrated instance:
//! - rhai scripts see every variable in their scope and write back every
//!   scope value when they finish
//! - class delegates are looked up by name in the [`DelegateRegistry`]
//! - delegate expressions evaluate to the name of a registered delegate

use rhai::{Dynamic, Engine, Scope};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::expression::ExpressionEvaluator;
use crate::migration::document::{MigrationDocument, MigrationHook};

/// Callable run as a migration hook.
pub trait MigrationDelegate: Send + Sync {
    fn execute(&self, variables: &mut Map<String, Value>) -> AppResult<()>;
}

impl<F> MigrationDelegate for F
where
    F: Fn(&mut Map<String, Value>) -> AppResult<()> + Send + Sync,
{
    fn execute(&self, variables: &mut Map<String, Value>) -> AppResult<()> {
        self(variables)
    }
}

/// Named migration delegates.
#[derive(Clone, Default)]
pub struct DelegateRegistry {
    delegates: HashMap<String, Arc<dyn MigrationDelegate>>,
}

impl DelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delegate under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, delegate: Arc<dyn MigrationDelegate>) {
        self.delegates.insert(name.into(), delegate);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MigrationDelegate>> {
        self.delegates.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.delegates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Runs migration hooks.
pub struct HookInvoker {
    engine: Engine,
    delegates: DelegateRegistry,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl HookInvoker {
    /// Create a new hook invoker.
    pub fn new(delegates: DelegateRegistry, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        let mut engine = Engine::new();

        engine.register_fn("log", |msg: &str| {
            info!(target: "migration_control_plane::hooks", "{}", msg);
        });

        Self {
            engine,
            delegates,
            evaluator,
        }
    }

    /// Fail on hook targets that can be resolved without an instance.
    pub fn check(&self, doc: &MigrationDocument) -> AppResult<()> {
        for hook in [doc.pre_hook(), doc.post_hook()].into_iter().flatten() {
            match hook {
                MigrationHook::ClassDelegate(name) => {
                    self.delegate(name)?;
                }
                MigrationHook::Script { script, .. } => {
                    self.engine
                        .compile(script)
                        .map_err(|e| AppError::Config(format!("Invalid hook script: {}", e)))?;
                }
                MigrationHook::DelegateExpression(_) => {}
            }
        }
        Ok(())
    }

    /// Run a hook against an instance's variables.
    pub fn invoke(&self, hook: &MigrationHook, variables: &mut Map<String, Value>) -> AppResult<()> {
        match hook {
            MigrationHook::Script { script, .. } => self.run_script(script, variables),
            MigrationHook::ClassDelegate(name) => {
                debug!(delegate = %name, "Invoking migration delegate");
                self.delegate(name)?.execute(variables)
            }
            MigrationHook::DelegateExpression(expression) => {
                let name = match self.evaluator.evaluate(expression, variables)? {
                    Value::String(name) => name,
                    other => {
                        return Err(AppError::Config(format!(
                            "Delegate expression '{}' resolved to {}, expected a delegate name",
                            expression, other
                        )));
                    }
                };
                debug!(delegate = %name, expression = %expression, "Invoking migration delegate");
                self.delegate(&name)?.execute(variables)
            }
        }
    }

    fn delegate(&self, name: &str) -> AppResult<Arc<dyn MigrationDelegate>> {
        self.delegates.get(name).ok_or_else(|| {
            AppError::Config(format!(
                "Migration delegate '{}' is not registered (known: {})",
                name,
                self.delegates.names().join(", ")
            ))
        })
    }

    fn run_script(&self, script: &str, variables: &mut Map<String, Value>) -> AppResult<()> {
        let mut scope = Scope::new();
        for (name, value) in variables.iter() {
            let value: Dynamic = rhai::serde::to_dynamic(value)
                .map_err(|e| AppError::Script(format!("Variable '{}': {}", name, e)))?;
            scope.push_dynamic(name.clone(), value);
        }

        self.engine
            .run_with_scope(&mut scope, script)
            .map_err(|e| AppError::Script(format!("Rhai script error: {}", e)))?;

        for (name, _, value) in scope.iter() {
            let value: Value = rhai::serde::from_dynamic(&value)
                .map_err(|e| AppError::Script(format!("Variable '{}': {}", name, e)))?;
            variables.insert(name.to_string(), value);
        }
        Ok(())
    }
}

//! Host functions exposed to script program text
//!
//! Every script scope gets these as globals and as members of its `script`
//! object. Natives hold the context weakly, so a dropped script never stays
//! alive through its own scope.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::{Rc, Weak};

use hearth_runtime::{EvalError, NativeFunction, TypeDescriptor, Value};
use tracing::info;

use crate::capabilities::{CommandHandler, EventHandler, EventPriority, TaskCallback, TaskId, Timing};
use crate::context::ScriptContext;
use crate::error::HostError;
use crate::registry::Host;

type NativeBody = dyn Fn(&ScriptContext, Vec<Value>) -> Result<Value, EvalError>;

/// Names bound into every script scope, besides `script` and `config`
pub const HOST_FUNCTIONS: &[&str] = &[
    "require",
    "on",
    "onCommand",
    "runTask",
    "runTaskAsynchronously",
    "runTaskLater",
    "runTaskLaterAsynchronously",
    "runTaskTimer",
    "runTaskTimerAsynchronously",
    "cancelTask",
    "log",
];

/// Bind the host functions, the `script` object and `config` into the context scope
pub fn install(context: &Rc<ScriptContext>, file: &Path, data_folder: &Path, config: &Value) {
    let scope = context.scope();
    let mut script = BTreeMap::new();
    script.insert("id".to_string(), Value::str(context.owner()));
    script.insert("file".to_string(), Value::str(file.display().to_string()));
    script.insert(
        "dataFolder".to_string(),
        Value::str(data_folder.display().to_string()),
    );

    for name in HOST_FUNCTIONS {
        let Some(function) = host_function(context, name) else {
            continue;
        };
        scope.declare_builtin(*name, function.clone());
        script.insert(name.to_string(), function);
    }

    scope.declare_builtin("script", Value::object(script));
    scope.declare_builtin("config", config.clone());
}

fn host_function(context: &Rc<ScriptContext>, name: &'static str) -> Option<Value> {
    let value = match name {
        "require" => native(context, name, require),
        "on" => native(context, name, subscribe),
        "onCommand" => native(context, name, command),
        "runTask" => task(context, name, false, |_| Ok(Timing::Now)),
        "runTaskAsynchronously" => task(context, name, true, |_| Ok(Timing::Now)),
        "runTaskLater" => task(context, name, false, later),
        "runTaskLaterAsynchronously" => task(context, name, true, later),
        "runTaskTimer" => task(context, name, false, repeating),
        "runTaskTimerAsynchronously" => task(context, name, true, repeating),
        "cancelTask" => native(context, name, cancel),
        "log" => native(context, name, log),
        _ => return None,
    };
    Some(value)
}

fn native<F>(context: &Rc<ScriptContext>, name: &'static str, body: F) -> Value
where
    F: Fn(&ScriptContext, Vec<Value>) -> Result<Value, EvalError> + 'static,
{
    let weak: Weak<ScriptContext> = Rc::downgrade(context);
    let body: Box<NativeBody> = Box::new(body);
    NativeFunction::new(name, move |args| {
        let context = weak
            .upgrade()
            .ok_or_else(|| EvalError::native(name, HostError::HostUnavailable))?;
        body(&context, args)
    })
    .into_value()
}

fn host_of(context: &ScriptContext, function: &str) -> Result<Host, EvalError> {
    context
        .host()
        .upgrade()
        .map_err(|e| EvalError::native(function, e))
}

fn callable_arg(args: &[Value], index: usize, function: &str) -> Result<Value, EvalError> {
    match args.get(index) {
        Some(value) if value.is_callable() => Ok(value.clone()),
        Some(value) => Err(EvalError::runtime(format!(
            "{}: expected a function, got {}",
            function,
            value.type_name()
        ))),
        None => Err(EvalError::runtime(format!(
            "{}: expected a function argument",
            function
        ))),
    }
}

fn str_arg<'a>(args: &'a [Value], index: usize, function: &str) -> Result<&'a str, EvalError> {
    args.get(index).and_then(Value::as_str).ok_or_else(|| {
        EvalError::runtime(format!("{}: expected a string argument", function))
    })
}

/// Tick count argument; negative counts mean no delay
fn ticks_arg(args: &[Value], index: usize, function: &str) -> Result<u64, EvalError> {
    args.get(index)
        .and_then(Value::as_number)
        .map(|n| n.max(0.0) as u64)
        .ok_or_else(|| EvalError::runtime(format!("{}: expected a tick count", function)))
}

fn require(context: &ScriptContext, args: Vec<Value>) -> Result<Value, EvalError> {
    let id = str_arg(&args, 0, "require")?;
    context
        .require(id)
        .map_err(|e| EvalError::native("require", e))?;
    Ok(Value::Null)
}

/// `on(Type | "Name", handler, priority?)`
fn subscribe(context: &ScriptContext, args: Vec<Value>) -> Result<Value, EvalError> {
    let host = host_of(context, "on")?;
    let event = match args.first() {
        Some(Value::HostType(ty)) => ty.descriptor().clone(),
        Some(Value::Str(name)) => lookup_type(&host, name)
            .ok_or_else(|| EvalError::runtime(format!("on: unknown event type {}", name)))?,
        _ => return Err(EvalError::runtime("on: expected an event type")),
    };
    if !event.is_event() {
        return Err(EvalError::runtime(format!(
            "on: {} is not an event type",
            event.qualified_name
        )));
    }
    let callback = callable_arg(&args, 1, "on")?;
    let priority = match args.get(2) {
        Some(Value::Str(name)) => name
            .parse::<EventPriority>()
            .map_err(|e| EvalError::native("on", e))?,
        _ => EventPriority::Normal,
    };

    let id = host
        .capabilities()
        .subscribe_event(context.owner(), &event, priority, event_handler(&host, callback));
    Ok(Value::Number(id.0 as f64))
}

fn lookup_type(host: &Host, name: &str) -> Option<TypeDescriptor> {
    let registry = host.importer().types();
    registry.get(name).cloned().or_else(|| {
        registry
            .values()
            .find(|descriptor| descriptor.qualified_name == name)
            .cloned()
    })
}

pub(crate) fn event_handler(host: &Host, callback: Value) -> EventHandler {
    let evaluator = host.evaluator();
    Rc::new(move |payload: &Value| {
        evaluator
            .invoke(&callback, vec![payload.clone()])
            .map(|_| ())
    })
}

/// `onCommand(name, handler(sender, args))`
fn command(context: &ScriptContext, args: Vec<Value>) -> Result<Value, EvalError> {
    let host = host_of(context, "onCommand")?;
    let name = str_arg(&args, 0, "onCommand")?;
    let callback = callable_arg(&args, 1, "onCommand")?;

    let evaluator = host.evaluator();
    let handler: CommandHandler = Rc::new(move |sender: &str, arguments: &[String]| {
        let arguments = Value::array(arguments.iter().map(Value::str).collect());
        let result = evaluator.invoke(&callback, vec![Value::str(sender), arguments])?;
        // Anything but an explicit `false` counts as handled
        Ok(result.as_bool().unwrap_or(true))
    });

    let registered = host
        .capabilities()
        .register_command(context.owner(), name, handler);
    Ok(Value::Bool(registered))
}

fn task<T>(context: &Rc<ScriptContext>, name: &'static str, background: bool, timing: T) -> Value
where
    T: Fn(&[Value]) -> Result<Timing, EvalError> + 'static,
{
    native(context, name, move |context, args| {
        let host = host_of(context, name)?;
        let callback = callable_arg(&args, 0, name)?;
        let timing = timing(&args)?;

        let evaluator = host.evaluator();
        let run: TaskCallback =
            Rc::new(move || evaluator.invoke(&callback, Vec::new()).map(|_| ()));
        let id = host
            .capabilities()
            .schedule(context.owner(), run, timing, background);
        Ok(task_value(id))
    })
}

fn later(args: &[Value]) -> Result<Timing, EvalError> {
    Ok(Timing::Later {
        delay: ticks_arg(args, 1, "runTaskLater")?,
    })
}

fn repeating(args: &[Value]) -> Result<Timing, EvalError> {
    Ok(Timing::Repeating {
        delay: ticks_arg(args, 1, "runTaskTimer")?,
        period: ticks_arg(args, 2, "runTaskTimer")?,
    })
}

fn task_value(id: TaskId) -> Value {
    Value::Number(id.as_u64() as f64)
}

fn cancel(context: &ScriptContext, args: Vec<Value>) -> Result<Value, EvalError> {
    let host = host_of(context, "cancelTask")?;
    let id = args
        .first()
        .and_then(Value::as_number)
        .ok_or_else(|| EvalError::runtime("cancelTask: expected a task id"))?;
    if id < 0.0 {
        return Ok(Value::Bool(false));
    }
    let cancelled = host.capabilities().cancel_task(TaskId::from_u64(id as u64));
    Ok(Value::Bool(cancelled))
}

fn log(context: &ScriptContext, args: Vec<Value>) -> Result<Value, EvalError> {
    let message = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    info!(target: "script", "[{}] {}", context.owner(), message);
    Ok(Value::Null)
}

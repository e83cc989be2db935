//! In-process host capabilities: event bus, command table and task scheduler

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use hearth_runtime::{TypeDescriptor, Value};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::capabilities::{
    CommandHandler, EventHandler, EventPriority, HostCapabilities, SubscriptionId, TaskCallback,
    TaskId, Timing,
};
use crate::timer::TimerManager;

struct Subscription {
    id: SubscriptionId,
    owner: String,
    event: TypeDescriptor,
    priority: EventPriority,
    handler: EventHandler,
}

struct Command {
    owner: String,
    handler: CommandHandler,
}

struct Task {
    owner: String,
    callback: TaskCallback,
    repeating: bool,
    /// Set for background tasks timed on the tokio runtime
    worker: Option<JoinHandle<()>>,
}

/// Host capabilities driven from the control thread.
///
/// Foreground tasks are timed by a [`TimerManager`] checked in
/// [`LocalHost::run_pending`]. Background tasks are timed by a tokio task that
/// posts the task id back over a channel; their callbacks still run in
/// `run_pending`, on the control thread.
pub struct LocalHost {
    subscriptions: RefCell<Vec<Subscription>>,
    next_subscription: Cell<u64>,
    commands: RefCell<BTreeMap<String, Command>>,
    timers: RefCell<TimerManager>,
    tasks: RefCell<HashMap<TaskId, Task>>,
    due_tx: UnboundedSender<TaskId>,
    due_rx: RefCell<UnboundedReceiver<TaskId>>,
    runtime: Option<Handle>,
}

impl LocalHost {
    pub fn new() -> Self {
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        Self {
            subscriptions: RefCell::new(Vec::new()),
            next_subscription: Cell::new(0),
            commands: RefCell::new(BTreeMap::new()),
            timers: RefCell::new(TimerManager::new()),
            tasks: RefCell::new(HashMap::new()),
            due_tx,
            due_rx: RefCell::new(due_rx),
            runtime: None,
        }
    }

    /// Time background tasks on `handle` instead of the ambient runtime
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Deliver an event to its subscribers, matched by qualified or simple
    /// type name. Returns the number of handlers run.
    pub fn fire(&self, event: &str, payload: &Value) -> usize {
        let mut handlers: Vec<(EventPriority, SubscriptionId, String, EventHandler)> = self
            .subscriptions
            .borrow()
            .iter()
            .filter(|s| s.event.qualified_name == event || s.event.simple_name == event)
            .map(|s| (s.priority, s.id, s.owner.clone(), s.handler.clone()))
            .collect();
        handlers.sort_by_key(|(priority, id, _, _)| (*priority, *id));

        for (_, _, owner, handler) in &handlers {
            if let Err(e) = handler(payload) {
                warn!(target: "scripting", "Event handler of {} failed on {}: {}", owner, event, e);
                if !e.stack().is_empty() {
                    warn!(target: "scripting", "Script stack:\n{}", e.script_stack());
                }
            }
        }
        handlers.len()
    }

    /// Run a console command line. `None` when no command has that name.
    pub fn dispatch_command(&self, sender: &str, line: &str) -> Option<bool> {
        let mut words = line.split_whitespace();
        let name = words.next()?;
        let args: Vec<String> = words.map(str::to_string).collect();

        let (owner, handler) = {
            let commands = self.commands.borrow();
            let command = commands.get(name)?;
            (command.owner.clone(), command.handler.clone())
        };

        match handler(sender, &args) {
            Ok(handled) => Some(handled),
            Err(e) => {
                warn!(target: "scripting", "Command {} of {} failed: {}", name, owner, e);
                Some(false)
            }
        }
    }

    /// Run every task due at `now`, in id order. Returns the number run.
    pub fn run_pending(&self, now: Instant) -> usize {
        let mut due = self.timers.borrow_mut().tick(now);
        {
            let mut rx = self.due_rx.borrow_mut();
            while let Ok(id) = rx.try_recv() {
                due.push(id);
            }
        }
        due.sort();

        let mut ran = 0;
        for id in due {
            let Some((owner, callback)) = self.take_due(id) else {
                continue;
            };
            ran += 1;
            if let Err(e) = callback() {
                warn!(target: "scripting", "Task {} of {} failed: {}", id.as_u64(), owner, e);
            }
        }
        ran
    }

    /// Callback of a due task; one-shot tasks are removed before they run
    fn take_due(&self, id: TaskId) -> Option<(String, TaskCallback)> {
        let mut tasks = self.tasks.borrow_mut();
        let task = tasks.get(&id)?;
        let due = (task.owner.clone(), task.callback.clone());
        if !task.repeating {
            tasks.remove(&id);
        }
        Some(due)
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.borrow().keys().cloned().collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    fn spawn_worker(&self, id: TaskId, timing: Timing) -> Option<JoinHandle<()>> {
        let handle = self.runtime.clone().or_else(|| Handle::try_current().ok())?;
        let tx = self.due_tx.clone();
        let delay = timing.delay();
        let period = timing.period();

        Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            loop {
                if tx.send(id).is_err() {
                    break;
                }
                match period {
                    Some(period) => tokio::time::sleep(period).await,
                    None => break,
                }
            }
        }))
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCapabilities for LocalHost {
    fn subscribe_event(
        &self,
        owner: &str,
        event: &TypeDescriptor,
        priority: EventPriority,
        handler: EventHandler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.subscriptions.borrow_mut().push(Subscription {
            id,
            owner: owner.to_string(),
            event: event.clone(),
            priority,
            handler,
        });
        debug!(target: "scripting", "{} subscribed to {} at {}", owner, event, priority);
        id
    }

    fn register_command(&self, owner: &str, name: &str, handler: CommandHandler) -> bool {
        let mut commands = self.commands.borrow_mut();
        commands.insert(
            format!("{}:{}", owner, name),
            Command {
                owner: owner.to_string(),
                handler: handler.clone(),
            },
        );

        let taken = commands
            .get(name)
            .is_some_and(|existing| existing.owner != owner);
        if taken {
            warn!(
                target: "scripting",
                "Command {} is already registered, {} gets {}:{} only",
                name, owner, owner, name
            );
            return false;
        }

        commands.insert(
            name.to_string(),
            Command {
                owner: owner.to_string(),
                handler,
            },
        );
        true
    }

    fn schedule(
        &self,
        owner: &str,
        callback: TaskCallback,
        timing: Timing,
        background: bool,
    ) -> TaskId {
        let now = Instant::now();
        let (id, worker) = if background {
            let id = self.timers.borrow_mut().reserve();
            match self.spawn_worker(id, timing) {
                Some(worker) => (id, Some(worker)),
                None => {
                    debug!(target: "scripting", "No async runtime, timing task of {} on the control thread", owner);
                    let id = self.timers.borrow_mut().schedule(timing, now);
                    (id, None)
                }
            }
        } else {
            (self.timers.borrow_mut().schedule(timing, now), None)
        };

        self.tasks.borrow_mut().insert(
            id,
            Task {
                owner: owner.to_string(),
                callback,
                repeating: timing.is_repeating(),
                worker,
            },
        );
        id
    }

    fn cancel_task(&self, id: TaskId) -> bool {
        self.timers.borrow_mut().cancel(id);
        match self.tasks.borrow_mut().remove(&id) {
            Some(task) => {
                if let Some(worker) = task.worker {
                    worker.abort();
                }
                true
            }
            None => false,
        }
    }

    fn release(&self, owner: &str) {
        self.subscriptions.borrow_mut().retain(|s| s.owner != owner);
        self.commands.borrow_mut().retain(|_, c| c.owner != owner);

        let released: Vec<Task> = {
            let mut tasks = self.tasks.borrow_mut();
            let ids: Vec<TaskId> = tasks
                .iter()
                .filter(|(_, task)| task.owner == owner)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    self.timers.borrow_mut().cancel(id);
                    tasks.remove(&id)
                })
                .collect()
        };
        for task in &released {
            if let Some(worker) = &task.worker {
                worker.abort();
            }
        }
        debug!(target: "scripting", "Released {} task(s) of {}", released.len(), owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ticks;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<u32>>, TaskCallback) {
        let count = Rc::new(Cell::new(0));
        let inner = count.clone();
        let callback: TaskCallback = Rc::new(move || {
            inner.set(inner.get() + 1);
            Ok(())
        });
        (count, callback)
    }

    #[test]
    fn test_foreground_tasks() {
        let host = LocalHost::new();
        let (now_count, now_task) = counter();
        let (later_count, later_task) = counter();
        let (timer_count, timer_task) = counter();

        host.schedule("a", now_task, Timing::Now, false);
        host.schedule("a", later_task, Timing::Later { delay: 2 }, false);
        let timer = host.schedule("a", timer_task, Timing::Repeating { delay: 0, period: 1 }, false);

        let start = Instant::now();
        host.run_pending(start + ticks(1));
        assert_eq!(now_count.get(), 1);
        assert_eq!(later_count.get(), 0);
        assert_eq!(timer_count.get(), 1);

        host.run_pending(start + ticks(3));
        assert_eq!(now_count.get(), 1);
        assert_eq!(later_count.get(), 1);
        assert_eq!(timer_count.get(), 2);

        assert!(host.cancel_task(timer));
        host.run_pending(start + ticks(10));
        assert_eq!(timer_count.get(), 2);
        assert_eq!(host.task_count(), 0);
    }

    #[test]
    fn test_background_without_runtime_runs_on_timer() {
        let host = LocalHost::new();
        let (count, task) = counter();
        host.schedule("a", task, Timing::Now, true);
        host.run_pending(Instant::now());
        assert_eq!(count.get(), 1);
    }

    #[tokio::test]
    async fn test_background_task_delivered() {
        let host = LocalHost::new();
        let (count, task) = counter();
        host.schedule("a", task, Timing::Later { delay: 1 }, true);

        assert_eq!(host.run_pending(Instant::now()), 0);
        tokio::time::sleep(ticks(3)).await;
        assert_eq!(host.run_pending(Instant::now()), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(host.task_count(), 0);
    }

    #[test]
    fn test_event_priority_order() {
        let host = LocalHost::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let event = TypeDescriptor::event("org.example.JoinEvent");

        for (owner, priority) in [
            ("monitor", EventPriority::Monitor),
            ("low", EventPriority::Low),
            ("normal", EventPriority::Normal),
            ("high", EventPriority::High),
        ] {
            let order = order.clone();
            host.subscribe_event(owner, &event, priority, Rc::new(move |_: &Value| {
                order.borrow_mut().push(owner);
                Ok(())
            }));
        }

        assert_eq!(host.fire("JoinEvent", &Value::Null), 4);
        assert_eq!(*order.borrow(), vec!["low", "normal", "high", "monitor"]);
        assert_eq!(host.fire("org.example.JoinEvent", &Value::Null), 4);
        assert_eq!(host.fire("QuitEvent", &Value::Null), 0);
    }

    #[test]
    fn test_command_conflicts_get_prefixed_name() {
        let host = LocalHost::new();
        let handler: CommandHandler = Rc::new(|_: &str, args: &[String]| Ok(!args.is_empty()));

        assert!(host.register_command("a", "greet", handler.clone()));
        assert!(!host.register_command("b", "greet", handler));
        assert_eq!(host.command_names(), vec!["a:greet", "b:greet", "greet"]);

        assert_eq!(host.dispatch_command("console", "greet bob"), Some(true));
        assert_eq!(host.dispatch_command("console", "b:greet"), Some(false));
        assert_eq!(host.dispatch_command("console", "missing"), None);
    }

    #[test]
    fn test_release_drops_owner_registrations() {
        let host = LocalHost::new();
        let event = TypeDescriptor::event("org.example.JoinEvent");
        host.subscribe_event("a", &event, EventPriority::Normal, Rc::new(|_: &Value| Ok(())));
        host.subscribe_event("b", &event, EventPriority::Normal, Rc::new(|_: &Value| Ok(())));
        host.register_command("a", "greet", Rc::new(|_: &str, _: &[String]| Ok(true)));
        let (count, task) = counter();
        host.schedule("a", task, Timing::Later { delay: 1 }, false);

        host.release("a");
        assert_eq!(host.subscription_count(), 1);
        assert!(host.command_names().is_empty());
        assert_eq!(host.task_count(), 0);
        host.run_pending(Instant::now() + ticks(5));
        assert_eq!(count.get(), 0);
    }
}

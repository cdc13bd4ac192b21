//! Host-facing VM facade
//!
//! `Vm` owns a `Runtime` and drives it in bounded turns. Each turn fires due
//! timers, then dispatches ready contexts one slice at a time until the
//! ready queue drains or the turn window is used up, and finally asks the
//! host for a continuation if anything is left to do.

use crate::bytecode::{assemble, ClassFile};
use crate::vm::context::{ContextId, MethodTimeline, NORMAL_PRIORITY};
use crate::vm::exceptions::UncaughtException;
use crate::vm::interpreter::{ExecutionResult, Interpreter};
use crate::vm::options::VmOptions;
use crate::vm::runtime::Runtime;
use crate::vm::scheduler::{Clock, Host, PollingHost, SchedulerStats, SystemClock};
use crate::vm::value::Value;
use crate::vm::{Context, VmError, VmResult};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A context that ended abnormally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextFailure {
    /// A Java exception propagated past the bottom frame
    Uncaught(UncaughtException),
    /// The engine could not continue executing the context
    Fatal {
        /// Killed context
        context: ContextId,
        /// Engine error
        message: String,
    },
}

impl ContextFailure {
    /// Context that failed
    pub fn context(&self) -> ContextId {
        match self {
            ContextFailure::Uncaught(report) => report.context,
            ContextFailure::Fatal { context, .. } => *context,
        }
    }
}

impl fmt::Display for ContextFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextFailure::Uncaught(report) => write!(f, "{}", report),
            ContextFailure::Fatal { context, message } => {
                write!(f, "{} killed: {}", context, message)
            }
        }
    }
}

/// Outcome of `Vm::run_until_idle`
#[derive(Debug, Clone, PartialEq)]
pub struct IdleReport {
    /// Contexts that returned normally so far
    pub finished: usize,
    /// Contexts still parked with nothing left to wake them
    pub blocked: Vec<ContextId>,
    /// Abnormal terminations so far
    pub failures: Vec<ContextFailure>,
    /// Host turns executed by this call
    pub turns: u64,
}

impl IdleReport {
    /// Every context finished normally
    pub fn is_clean(&self) -> bool {
        self.blocked.is_empty() && self.failures.is_empty()
    }
}

/// CLDC virtual machine
pub struct Vm {
    runtime: Runtime,
    failures: Vec<ContextFailure>,
    results: FxHashMap<ContextId, Option<Value>>,
    timelines: FxHashMap<ContextId, MethodTimeline>,
}

impl Vm {
    /// Create a VM on the wall clock
    pub fn new(options: VmOptions) -> VmResult<Self> {
        Self::with_clock(options, Arc::new(SystemClock::new()))
    }

    /// Create a VM on an explicit clock
    pub fn with_clock(options: VmOptions, clock: Arc<dyn Clock>) -> VmResult<Self> {
        Ok(Self {
            runtime: Runtime::new(options, clock)?,
            failures: Vec::new(),
            results: FxHashMap::default(),
            timelines: FxHashMap::default(),
        })
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Assemble `.jasm` source and define every class in it. Returns the
    /// defined class names.
    pub fn load_source(&mut self, source: &str) -> VmResult<Vec<String>> {
        let mut names = Vec::new();
        for class in assemble(source)? {
            names.push(class.name.clone());
            self.define(class)?;
        }
        Ok(names)
    }

    /// Define one class; it is linked on first use
    pub fn define(&mut self, class: ClassFile) -> VmResult<()> {
        self.runtime.classes.define(class)
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    /// Start a context running `class.name(descriptor)` at normal priority
    pub fn spawn(&mut self, class: &str, name: &str, descriptor: &str, args: Vec<Value>) -> VmResult<ContextId> {
        self.spawn_with_priority(class, name, descriptor, args, NORMAL_PRIORITY)
    }

    /// Start a context running `class.name(descriptor)` with its own
    /// `java/lang/Thread` object at `priority`
    pub fn spawn_with_priority(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
        priority: i32,
    ) -> VmResult<ContextId> {
        let id = self
            .runtime
            .classes
            .load(class)
            .map_err(|e| VmError::Link(e.to_string()))?;
        let method = self
            .runtime
            .classes
            .find_method(id, name, descriptor)
            .ok_or_else(|| VmError::MethodNotFound(format!("{}.{}{}", class, name, descriptor)))?;
        let thread = self.runtime.new_thread_object(priority)?;
        self.runtime.spawn(method, args, priority, Some(thread))
    }

    /// Start `class.main`, preferring `main([Ljava/lang/String;)V` with an
    /// empty argument array over `main()V`
    pub fn run_main(&mut self, class: &str) -> VmResult<ContextId> {
        let id = self
            .runtime
            .classes
            .load(class)
            .map_err(|e| VmError::Link(e.to_string()))?;
        if self
            .runtime
            .classes
            .find_method(id, "main", "([Ljava/lang/String;)V")
            .is_some()
        {
            let string = self.runtime.classes.well_known().string;
            let array_class = self
                .runtime
                .classes
                .array_of(string)
                .map_err(|e| VmError::Link(e.to_string()))?;
            let args = self
                .runtime
                .new_array(array_class, 0)?
                .ok_or_else(|| VmError::Internal("no heap left for main arguments".into()))?;
            return self.spawn(class, "main", "([Ljava/lang/String;)V", vec![Value::Ref(args)]);
        }
        self.spawn(class, "main", "()V", Vec::new())
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Run one bounded host turn.
    ///
    /// The turn window is checked before each dispatch, and the running
    /// context is preempted at an instruction boundary once the window is
    /// used up. Work left over is reported through
    /// `host.schedule_continuation`: immediately when contexts are ready,
    /// otherwise at the next timer deadline.
    pub fn run_turn(&mut self, host: &mut dyn Host) -> VmResult<()> {
        self.runtime.fire_timers()?;
        self.runtime.scheduler.begin_turn();

        while !self.runtime.scheduler.window_exceeded() {
            let Some(id) = self.runtime.scheduler.next() else {
                break;
            };
            let Some(mut ctx) = self.runtime.contexts.remove(&id) else {
                tracing::warn!(context = %id, "ready context is missing");
                continue;
            };
            self.runtime.scheduler.begin_slice(&ctx);
            let outcome = Interpreter::new(&mut self.runtime, &mut ctx).run();
            self.runtime.scheduler.end_slice(&mut ctx);
            self.dispose(ctx, outcome)?;
            self.runtime.fire_timers()?;
        }

        if !self.runtime.scheduler.is_empty() {
            host.schedule_continuation(Duration::ZERO);
        } else if let Some(deadline) = self.runtime.timers.next_deadline() {
            let now = self.runtime.scheduler.now();
            host.schedule_continuation(deadline.saturating_sub(now));
        }
        Ok(())
    }

    fn dispose(&mut self, mut ctx: Context, outcome: VmResult<ExecutionResult>) -> VmResult<()> {
        let id = ctx.id();
        match outcome {
            Ok(ExecutionResult::Preempted) | Ok(ExecutionResult::Yielded) => {
                self.runtime.scheduler.enqueue(&mut ctx);
                self.runtime.contexts.insert(id, ctx);
            }
            Ok(ExecutionResult::Suspended(reason)) => {
                tracing::trace!(context = %id, ?reason, "context suspended");
                self.runtime.contexts.insert(id, ctx);
            }
            Ok(ExecutionResult::Finished(value)) => {
                self.kill(&mut ctx)?;
                self.results.insert(id, value);
            }
            Ok(ExecutionResult::Failed(report)) => {
                tracing::error!(context = %id, "uncaught exception: {}", report);
                self.kill(&mut ctx)?;
                self.failures.push(ContextFailure::Uncaught(report));
            }
            Err(error) => {
                tracing::error!(context = %id, %error, "context killed by engine error");
                self.kill(&mut ctx)?;
                self.failures.push(ContextFailure::Fatal {
                    context: id,
                    message: error.to_string(),
                });
            }
        }
        Ok(())
    }

    fn kill(&mut self, ctx: &mut Context) -> VmResult<()> {
        self.runtime.terminate(ctx)?;
        if let Some(timeline) = ctx.timeline.take() {
            self.timelines.insert(ctx.id(), timeline);
        }
        Ok(())
    }

    /// Drive turns until nothing is ready and no timer is pending, sleeping
    /// on the VM clock between turns when only timers remain
    pub fn run_until_idle(&mut self) -> VmResult<IdleReport> {
        let mut host = PollingHost::default();
        let mut turns = 0;
        loop {
            self.run_turn(&mut host)?;
            turns += 1;
            let Some(delay) = host.take() else {
                break;
            };
            if !delay.is_zero() {
                let clock = self.runtime.scheduler.clock().clone();
                clock.sleep_until(clock.now() + delay);
            }
        }
        Ok(IdleReport {
            finished: self.results.len(),
            blocked: self.runtime.context_ids(),
            failures: self.failures.clone(),
            turns,
        })
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Value returned by a finished context's bottom frame
    pub fn result(&self, id: ContextId) -> Option<Option<Value>> {
        self.results.get(&id).copied()
    }

    /// Whether a context is still ready or parked
    pub fn is_alive(&self, id: ContextId) -> bool {
        self.runtime.contexts.contains_key(&id)
    }

    /// Abnormal terminations so far
    pub fn failures(&self) -> &[ContextFailure] {
        &self.failures
    }

    /// Method timeline of a terminated context, when profiling
    pub fn timeline(&self, id: ContextId) -> Option<&MethodTimeline> {
        self.timelines.get(&id)
    }

    /// Read a static field by name, without triggering initialization
    pub fn static_field(&self, class: &str, name: &str) -> VmResult<Value> {
        let classes = &self.runtime.classes;
        let id = classes
            .lookup(class)
            .ok_or_else(|| VmError::Link(format!("class {} is not loaded", class)))?;
        let slot = classes
            .get(id)?
            .static_fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| VmError::Link(format!("no static field {}.{}", class, name)))?;
        classes.static_value(id, slot)
    }

    /// Contents of a string value; `None` for null or non-strings
    pub fn string(&self, value: Value) -> VmResult<Option<String>> {
        match value.as_object()? {
            Some(object) => Ok(self.runtime.heap.string(object)?.map(str::to_string)),
            None => Ok(None),
        }
    }

    /// Console output written so far
    pub fn console_output(&self) -> String {
        String::from_utf8_lossy(self.runtime.console()).into_owned()
    }

    /// Scheduler statistics
    pub fn stats(&self) -> &SchedulerStats {
        self.runtime.scheduler.stats()
    }

    /// Machine state
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Machine state, mutably
    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("runtime", &self.runtime)
            .field("finished", &self.results.len())
            .field("failures", &self.failures.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::scheduler::ManualClock;

    fn vm() -> Vm {
        Vm::with_clock(VmOptions::default(), Arc::new(ManualClock::new())).unwrap()
    }

    #[test]
    fn test_run_main_with_string_array() {
        let mut vm = vm();
        vm.load_source(
            r#"
.class public app/Hello
.method public static main([Ljava/lang/String;)V
    ldc "hi"
    invokestatic app/Hello.say(Ljava/lang/String;)V
    return
.end method
.method static say(Ljava/lang/String;)V
    aload_0
    invokestatic com/sun/cldchi/io/ConsoleOutputStream.print(Ljava/lang/String;)V
    return
.end method
.end class
"#,
        )
        .unwrap();
        let id = vm.run_main("app/Hello").unwrap();
        let report = vm.run_until_idle().unwrap();
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(vm.result(id), Some(None));
        assert_eq!(vm.console_output(), "hi");
    }

    #[test]
    fn test_missing_entry_point() {
        let mut vm = vm();
        vm.load_source(".class public app/Empty\n.end class\n").unwrap();
        assert!(matches!(
            vm.spawn("app/Empty", "main", "()V", vec![]),
            Err(VmError::MethodNotFound(_))
        ));
        assert!(matches!(vm.run_main("app/Nope"), Err(VmError::Link(_))));
    }

    #[test]
    fn test_idle_with_nothing_to_do() {
        let mut vm = vm();
        let report = vm.run_until_idle().unwrap();
        assert_eq!(report.turns, 1);
        assert!(report.is_clean());
        assert_eq!(vm.stats().turns, 1);
    }
}

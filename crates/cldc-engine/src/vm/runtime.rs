//! Machine state shared by every context
//!
//! `Runtime` owns the heap, the class registry, the scheduler and every
//! context that is not currently executing. The interpreter borrows it
//! mutably for the length of one slice; there is no ambient global state.

use crate::vm::classes::{ArrayElement, ClassId, ClassRegistry, InitOutcome, InitState, Method};
use crate::vm::context::{Context, ContextId, ContextState, MethodTimeline, SuspendReason, NORMAL_PRIORITY};
use crate::vm::frame::FramePool;
use crate::vm::heap::{ArrayData, ElementType, Heap, ObjectBody};
use crate::vm::interpreter::InlineCache;
use crate::vm::monitor::LockOutcome;
use crate::vm::natives::NativeRegistry;
use crate::vm::options::VmOptions;
use crate::vm::scheduler::{Clock, Scheduler, TimerAction, TimerQueue};
use crate::vm::value::{ObjectRef, Value};
use crate::vm::{VmError, VmResult};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Heap, classes, scheduler and parked contexts of one VM
pub struct Runtime {
    /// Options the VM was created with
    pub options: VmOptions,
    /// Loaded and linked classes
    pub classes: ClassRegistry,
    /// Object arena
    pub heap: Heap,
    /// Native method table
    pub natives: NativeRegistry,
    /// Ready queue and preemption clock
    pub scheduler: Scheduler,
    /// Recycled activation frames
    pub frame_pool: FramePool,

    pub(crate) timers: TimerQueue,
    /// Contexts not currently executing: ready ones and parked ones
    pub(crate) contexts: FxHashMap<ContextId, Context>,
    pub(crate) inline_cache: InlineCache,
    pub(crate) init_waiters: FxHashMap<ClassId, Vec<ContextId>>,
    /// Live threads by their `java/lang/Thread` object
    pub(crate) threads: FxHashMap<ObjectRef, ContextId>,
    pub(crate) started_threads: FxHashSet<ObjectRef>,
    console: Vec<u8>,
}

impl Runtime {
    /// Create a runtime with the core library loaded
    pub fn new(options: VmOptions, clock: Arc<dyn Clock>) -> VmResult<Self> {
        let classes = ClassRegistry::new()?;
        let scheduler = Scheduler::new(&options, clock);
        Ok(Self {
            frame_pool: FramePool::new(options.frame_pool_size),
            options,
            classes,
            heap: Heap::new(),
            natives: NativeRegistry::with_builtins(),
            scheduler,
            timers: TimerQueue::new(),
            contexts: FxHashMap::default(),
            inline_cache: InlineCache::default(),
            init_waiters: FxHashMap::default(),
            threads: FxHashMap::default(),
            started_threads: FxHashSet::default(),
            console: Vec::new(),
        })
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    /// Make a parked context runnable again.
    ///
    /// Only paused contexts are affected, so a context woken twice is
    /// enqueued once.
    pub fn resume(&mut self, id: ContextId) -> VmResult<()> {
        let now = self.scheduler.now();
        let ctx = self
            .contexts
            .get_mut(&id)
            .ok_or(VmError::UnknownContext(id))?;
        if ctx.state == ContextState::Pausing {
            ctx.resume(now);
            self.scheduler.enqueue(ctx);
        }
        Ok(())
    }

    /// Create a context whose bottom frame runs `method`.
    ///
    /// A static entry point initializes its class first, and a synchronized
    /// one locks its receiver or class object, exactly as an invocation
    /// would. The context is ready unless either of those has to wait.
    pub fn spawn(
        &mut self,
        method: Arc<Method>,
        args: Vec<Value>,
        priority: i32,
        thread: Option<ObjectRef>,
    ) -> VmResult<ContextId> {
        if method.is_native() || method.is_abstract() {
            return Err(VmError::Link(format!(
                "{} has no bytecode to run",
                method.qualified_name()
            )));
        }
        if method.is_static() && self.classes.get(method.class)?.init_state == InitState::Erroneous {
            return Err(VmError::Link(format!(
                "class {} failed to initialize",
                method.class_name
            )));
        }

        let mut ctx = Context::new(priority);
        ctx.thread = thread;
        if self.options.profile {
            ctx.timeline = Some(MethodTimeline::default());
        }
        let id = ctx.id();
        let lock = match (method.is_synchronized(), args.first()) {
            (false, _) => None,
            (true, Some(receiver)) if !method.is_static() => receiver.as_object()?,
            (true, _) => Some(self.class_mirror(method.class)?),
        };
        let mut frame = self.frame_pool.create(method.clone(), args);
        frame.lock_object = lock;
        ctx.push_frame(frame, self.scheduler.now());

        let mut parked = None;
        if method.is_static() {
            match self.ensure_initialized(&mut ctx, method.class)? {
                InitOutcome::Ready | InitOutcome::Pushed => {}
                InitOutcome::Blocked(_) if lock.is_some() => {
                    return Err(VmError::Link(format!(
                        "class {} is being initialized",
                        method.class_name
                    )));
                }
                InitOutcome::Blocked(reason) => parked = Some(reason),
                InitOutcome::Failed(name) => {
                    return Err(VmError::Link(format!("class {} failed to initialize", name)));
                }
            }
        }
        if let Some(object) = lock {
            if self.monitor_enter(&mut ctx, object)? == LockOutcome::Blocked {
                parked = Some(SuspendReason::MonitorEnter { object });
            }
        }

        if let Some(thread) = thread {
            self.threads.insert(thread, id);
            self.started_threads.insert(thread);
        }
        match parked {
            Some(reason) => ctx.pause(reason, self.scheduler.now()),
            None => self.scheduler.enqueue(&mut ctx),
        }
        tracing::debug!(context = %id, priority = ctx.priority, "spawned context");
        self.contexts.insert(id, ctx);
        Ok(id)
    }

    /// Start a new context running `thread.run()`
    pub fn start_thread(&mut self, thread: ObjectRef) -> VmResult<ContextId> {
        let class = self.heap.class_of(thread)?;
        let run = self
            .classes
            .find_virtual(class, "run", "()V")
            .ok_or_else(|| VmError::MethodNotFound("run()V".into()))?;
        let priority = self.thread_priority(thread)?;
        self.spawn(run, vec![Value::Ref(thread)], priority, Some(thread))
    }

    fn thread_priority(&self, thread: ObjectRef) -> VmResult<i32> {
        let class = self.classes.well_known().thread;
        match self.classes.instance_field_slot(class, "priority") {
            Some(slot) => self.heap.field(thread, slot)?.as_int(),
            None => Ok(NORMAL_PRIORITY),
        }
    }

    /// Allocate a `java/lang/Thread` for a context that has none, without
    /// running its constructor
    pub fn new_thread_object(&mut self, priority: i32) -> VmResult<ObjectRef> {
        let class = self.classes.well_known().thread;
        let thread = self.instantiate(class)?;
        if let Some(slot) = self.classes.instance_field_slot(class, "priority") {
            self.heap.set_field(thread, slot, Value::Int(priority))?;
        }
        Ok(thread)
    }

    /// Tear down a context that has stopped: release its monitors, wake
    /// joiners and anything blocked on it, and recycle its frames
    pub fn terminate(&mut self, ctx: &mut Context) -> VmResult<()> {
        ctx.stop();
        let id = ctx.id();
        self.scheduler.remove(id);
        if let Some(thread) = ctx.thread {
            self.threads.remove(&thread);
        }
        self.release_monitors_of(ctx)?;
        for frame in ctx.take_frames() {
            if let Some(class) = frame.init_class {
                self.finish_initialization(class, false)?;
            }
            self.frame_pool.free(frame);
        }
        tracing::debug!(context = %id, vr = ctx.virtual_runtime, "killed context");
        Ok(())
    }

    /// Parked or ready context by id
    pub fn context(&self, id: ContextId) -> Option<&Context> {
        self.contexts.get(&id)
    }

    /// Ids of every context that is not executing
    pub fn context_ids(&self) -> Vec<ContextId> {
        let mut ids: Vec<ContextId> = self.contexts.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Fire every timer whose deadline has passed
    pub fn fire_timers(&mut self) -> VmResult<()> {
        let now = self.scheduler.now();
        for action in self.timers.pop_expired(now) {
            match action {
                TimerAction::Sleep { ctx } => {
                    if let Some(sleeper) = self.contexts.get_mut(&ctx) {
                        sleeper.lock_timer = None;
                        self.resume(ctx)?;
                    }
                }
                TimerAction::WaitTimeout { ctx, object } => self.wait_timed_out(ctx, object)?,
            }
        }
        Ok(())
    }

    /// Pending timers
    pub fn timers(&mut self) -> &mut TimerQueue {
        &mut self.timers
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// New instance of `class` with every field at its zero value
    pub fn instantiate(&mut self, class: ClassId) -> VmResult<ObjectRef> {
        let fields = self
            .classes
            .get(class)?
            .instance_fields
            .iter()
            .map(|f| Value::default_for(f.kind))
            .collect();
        Ok(self.heap.allocate(class, ObjectBody::Instance(fields)))
    }

    /// New, uninterned string
    pub fn new_string(&mut self, text: &str) -> ObjectRef {
        let class = self.classes.well_known().string;
        self.heap.allocate(class, ObjectBody::Str(text.to_string()))
    }

    /// Canonical string for a literal
    pub fn intern_string(&mut self, text: &str) -> ObjectRef {
        let class = self.classes.well_known().string;
        self.heap.intern(class, text)
    }

    /// The `java/lang/Class` object of `class`, created on first request
    pub fn class_mirror(&mut self, class: ClassId) -> VmResult<ObjectRef> {
        if let Some(mirror) = self.classes.get(class)?.mirror {
            return Ok(mirror);
        }
        let class_class = self.classes.well_known().class;
        let mirror = self.heap.allocate(class_class, ObjectBody::Mirror(class));
        self.classes.get_mut(class)?.mirror = Some(mirror);
        Ok(mirror)
    }

    /// Zero-filled array of array class `class`
    pub fn new_array(&mut self, class: ClassId, len: usize) -> VmResult<Option<ObjectRef>> {
        let element = match self.classes.get(class)?.element {
            Some(ArrayElement::Primitive(element)) => element,
            Some(ArrayElement::Class(_)) => ElementType::Reference,
            None => return Err(VmError::Internal(format!("class {} is not an array", class.index()))),
        };
        let bytes = (len as u64).saturating_mul(element.width());
        if !self.heap.reserve(bytes, self.options.heap_limit_bytes) {
            tracing::debug!(len, bytes, used = self.heap.array_bytes(), "array allocation over heap limit");
            return Ok(None);
        }
        Ok(Some(self.heap.allocate(class, ObjectBody::Array(ArrayData::new(element, len)))))
    }

    /// Nested arrays for `multianewarray`; `counts` are already checked to
    /// be non-negative. Dimensions past `counts` stay null. `None` once the
    /// heap limit is hit.
    pub fn new_multi_array(&mut self, class: ClassId, counts: &[usize]) -> VmResult<Option<ObjectRef>> {
        let Some((&len, rest)) = counts.split_first() else {
            return Err(VmError::Internal("multianewarray without dimensions".into()));
        };
        let Some(array) = self.new_array(class, len)? else {
            return Ok(None);
        };
        if rest.is_empty() {
            return Ok(Some(array));
        }
        let sub = match self.classes.get(class)?.element {
            Some(ArrayElement::Class(sub)) => sub,
            _ => return Err(VmError::Internal("multianewarray dimension mismatch".into())),
        };
        for index in 0..len {
            let Some(child) = self.new_multi_array(sub, rest)? else {
                return Ok(None);
            };
            if let Some(data) = self.heap.array_mut(array)? {
                data.store(index, Value::Ref(child))?;
            }
        }
        Ok(Some(array))
    }

    // ========================================================================
    // Console
    // ========================================================================

    /// Append bytes written by `ConsoleOutputStream`
    pub fn console_write(&mut self, bytes: &[u8]) {
        self.console.extend_from_slice(bytes);
    }

    /// Everything written to the console so far
    pub fn console(&self) -> &[u8] {
        &self.console
    }

    /// Drain the console buffer
    pub fn take_console(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.console)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("classes", &self.classes.len())
            .field("objects", &self.heap.len())
            .field("contexts", &self.contexts.len())
            .field("scheduler", &self.scheduler)
            .field("timers", &self.timers)
            .finish()
    }
}

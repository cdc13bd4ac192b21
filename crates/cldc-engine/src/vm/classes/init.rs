//! Class initialization
//!
//! `<clinit>` runs as an ordinary frame pushed on the context that first
//! needs the class. The triggering instruction is rewound and executes again
//! once the initializer returns, which also picks up the next class down the
//! hierarchy: superclasses are always initialized before subclasses.

use super::{ClassId, InitState};
use crate::vm::context::{Context, SuspendReason};
use crate::vm::runtime::Runtime;
use crate::vm::VmResult;

/// Result of an initialization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// The class and its superclasses are usable
    Ready,
    /// An initializer frame was pushed on the context
    Pushed,
    /// Another context is running an initializer; the caller must suspend
    Blocked(SuspendReason),
    /// An initializer previously failed; throw `NoClassDefFoundError`
    Failed(String),
}

impl Runtime {
    /// Make sure `class` is initialized before `ctx` uses it
    pub fn ensure_initialized(&mut self, ctx: &mut Context, class: ClassId) -> VmResult<InitOutcome> {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.classes.get(id)?;
            if c.init_state == InitState::Initialized {
                break;
            }
            chain.push(id);
            current = c.super_class;
        }

        for &id in chain.iter().rev() {
            let c = self.classes.get(id)?;
            match c.init_state {
                InitState::Initialized => {}
                InitState::Erroneous => return Ok(InitOutcome::Failed(c.name.replace('/', "."))),
                // recursive request from inside our own initializer
                InitState::InProgress(owner) if owner == ctx.id() => {}
                InitState::InProgress(owner) => {
                    let reason = SuspendReason::ClassInit {
                        class: c.name.to_string(),
                    };
                    tracing::debug!(context = %ctx.id(), class = %c.name, initializer = %owner, "waiting for class initialization");
                    self.init_waiters.entry(id).or_default().push(ctx.id());
                    return Ok(InitOutcome::Blocked(reason));
                }
                InitState::Linked => match c.clinit().cloned() {
                    None => self.classes.get_mut(id)?.init_state = InitState::Initialized,
                    Some(clinit) => {
                        tracing::debug!(context = %ctx.id(), class = %c.name, "initializing class");
                        self.classes.get_mut(id)?.init_state = InitState::InProgress(ctx.id());
                        let mut frame = self.frame_pool.create(clinit, Vec::new());
                        frame.init_class = Some(id);
                        let now = self.scheduler.now();
                        ctx.push_frame(frame, now);
                        return Ok(InitOutcome::Pushed);
                    }
                },
            }
        }
        Ok(InitOutcome::Ready)
    }

    /// Record the end of a `<clinit>` frame and wake every context waiting
    /// on it
    pub(crate) fn finish_initialization(&mut self, class: ClassId, succeeded: bool) -> VmResult<()> {
        let state = if succeeded {
            InitState::Initialized
        } else {
            InitState::Erroneous
        };
        let c = self.classes.get_mut(class)?;
        c.init_state = state;
        tracing::debug!(class = %c.name, ?state, "class initialization finished");
        for waiter in self.init_waiters.remove(&class).unwrap_or_default() {
            self.resume(waiter)?;
        }
        Ok(())
    }
}

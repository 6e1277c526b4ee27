//! Event dispatch glue (spec §4.10, C10): a pure router from `(EntityId,
//! EventTag)` to the owning component's handler. gridsim never implements
//! [EventKernel] — it only consumes it — so this is the only thing
//! resembling a "main loop" in the whole crate: a lookup table of boxed
//! closures populated once at construction, generalizing the teacher's
//! single per-partition dispatch switch (one `match` over a fixed event
//! tag taxonomy, here over [EventTag] instead of a fixed set of OS
//! signals) to an arbitrary number of entities.
use std::collections::HashMap;

use gridsim_core::context::SimContext;
use gridsim_core::event::{EventData, EventKernel, EventTag};
use gridsim_core::types::{EntityId, SimTime};
use gridsim_core::TypedResult;

/// A single entity's reaction to one event. Handlers receive the raw
/// [EventData] and downcast it themselves — the dispatcher stays generic
/// over every payload type the scheduler/network/data-grid crates define.
pub type Handler<'a> = Box<dyn FnMut(EventData, SimTime, &SimContext, &dyn EventKernel) -> TypedResult<()> + 'a>;

/// Routes `(entity, tag)` pairs to the handler registered for them.
/// Unregistered pairs are logged and dropped (spec §4.10's "dispatch to
/// the appropriate component's handler" implies every reachable pair is
/// registered up front; an unmatched pair signals a wiring bug, not a
/// normal simulation outcome).
#[derive(Default)]
pub struct Dispatcher<'a> {
    handlers: HashMap<(EntityId, EventTag), Handler<'a>>,
}

impl<'a> Dispatcher<'a> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` to run for every event tagged `tag` addressed
    /// to `entity`. Registering the same pair twice replaces the handler.
    pub fn register(&mut self, entity: EntityId, tag: EventTag, handler: Handler<'a>) {
        self.handlers.insert((entity, tag), handler);
    }

    pub fn is_registered(&self, entity: EntityId, tag: EventTag) -> bool {
        self.handlers.contains_key(&(entity, tag))
    }

    /// Dispatches one event. Returns `Ok(())` for an unregistered pair
    /// (logged at `warn!`) rather than an error: a missing handler is a
    /// configuration defect the caller should notice via logs, not a
    /// per-event failure that aborts the run.
    pub fn dispatch(
        &mut self,
        entity: EntityId,
        tag: EventTag,
        data: EventData,
        now: SimTime,
        ctx: &SimContext,
        kernel: &dyn EventKernel,
    ) -> TypedResult<()> {
        match self.handlers.get_mut(&(entity, tag)) {
            Some(handler) => handler(data, now, ctx, kernel),
            None => {
                log::warn!("no handler registered for entity {entity} tag {tag:?}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct NullKernel;
    impl EventKernel for NullKernel {
        fn schedule(&self, _: EntityId, _: SimTime, _: EventTag, _: EventData) {}
        fn clock(&self) -> SimTime {
            0
        }
    }

    #[test]
    fn dispatch_invokes_the_registered_handler() {
        let calls = RefCell::new(0u32);
        let mut d = Dispatcher::new();
        d.register(
            EntityId(1),
            EventTag::GridletSubmit,
            Box::new(|_, _, _, _| {
                *calls.borrow_mut() += 1;
                Ok(())
            }),
        );
        let ctx = SimContext::new();
        let kernel = NullKernel;
        d.dispatch(EntityId(1), EventTag::GridletSubmit, EventData::None, 0, &ctx, &kernel)
            .unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn dispatch_on_an_unregistered_pair_is_a_no_op_ok() {
        let mut d = Dispatcher::new();
        let ctx = SimContext::new();
        let kernel = NullKernel;
        assert!(d
            .dispatch(EntityId(1), EventTag::GridletSubmit, EventData::None, 0, &ctx, &kernel)
            .is_ok());
    }

    #[test]
    fn re_registering_a_pair_replaces_the_handler() {
        let mut d = Dispatcher::new();
        d.register(EntityId(1), EventTag::GridletSubmit, Box::new(|_, _, _, _| Ok(())));
        assert!(d.is_registered(EntityId(1), EventTag::GridletSubmit));
        d.register(
            EntityId(1),
            EventTag::GridletSubmit,
            Box::new(|_, _, _, _| Err(anyhow::anyhow!("replaced"))
                .map_err(|e| gridsim_core::TypedError::new(gridsim_core::SystemError::InvalidArgument, e))),
        );
        let ctx = SimContext::new();
        let kernel = NullKernel;
        assert!(d
            .dispatch(EntityId(1), EventTag::GridletSubmit, EventData::None, 0, &ctx, &kernel)
            .is_err());
    }
}

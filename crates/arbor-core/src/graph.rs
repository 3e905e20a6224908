//! Event graph operations: bind, unbind, emit

use crate::connector::{checked_key, Endpoint, Event, Payload};
use crate::{EntityId, EntityKey, Error, Result, Value, World};
use std::rc::Rc;
use tracing::debug;

impl World {
    /// Bind an emitter channel of one entity to a handler channel of another
    ///
    /// Both entities must be mounted. Binding to a `"<key>UpdateBefore"`
    /// channel re-runs the pipeline for `key`, so the new check applies to the
    /// current value at once. If that run fails the edge is removed again.
    pub fn bind(
        &mut self,
        emitter: EntityKey,
        emitter_channel: &str,
        handler: EntityKey,
        handler_channel: &str,
    ) -> Result<()> {
        self.entity(emitter)?.expect_mounted()?;
        self.entity(handler)?.expect_mounted()?;
        self.link(emitter, emitter_channel, handler, handler_channel)?;
        debug!(
            emitter = %self.entity(emitter)?.id(),
            emitter_channel,
            handler = %self.entity(handler)?.id(),
            handler_channel,
            "bound"
        );
        if let Some(field) = checked_key(emitter_channel) {
            if let Err(err) = self.refresh_state(emitter, field) {
                self.unlink(emitter, emitter_channel, handler, handler_channel)?;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Bind to a handler found through the identity registry
    pub fn bind_by_id(
        &mut self,
        emitter: EntityKey,
        emitter_channel: &str,
        handler: &EntityId,
        handler_channel: &str,
    ) -> Result<()> {
        let handler = self.resolve(emitter, handler)?;
        self.bind(emitter, emitter_channel, handler, handler_channel)
    }

    /// Remove a bound edge from both of its endpoints
    pub fn unbind(
        &mut self,
        emitter: EntityKey,
        emitter_channel: &str,
        handler: EntityKey,
        handler_channel: &str,
    ) -> Result<()> {
        self.entity(emitter)?.expect_mounted()?;
        self.entity(handler)?.expect_mounted()?;
        self.unlink(emitter, emitter_channel, handler, handler_channel)?;
        debug!(
            emitter = %self.entity(emitter)?.id(),
            emitter_channel,
            handler = %self.entity(handler)?.id(),
            handler_channel,
            "unbound"
        );
        if let Some(field) = checked_key(emitter_channel) {
            if let Err(err) = self.refresh_state(emitter, field) {
                self.link(emitter, emitter_channel, handler, handler_channel)?;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Check if an edge is bound
    pub fn is_bound(
        &self,
        emitter: EntityKey,
        emitter_channel: &str,
        handler: EntityKey,
        handler_channel: &str,
    ) -> bool {
        let target = Endpoint::new(handler, handler_channel);
        self.entities
            .get(&emitter)
            .and_then(|e| e.emitters.get(emitter_channel))
            .is_some_and(|c| c.contains(&target))
    }

    /// Emit a signal on one of an entity's channels
    ///
    /// Handlers run synchronously in bind order; nested emissions finish
    /// before the next handler of this one runs.
    pub fn emit(
        &mut self,
        source: EntityKey,
        channel: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let entity = self.entity(source)?;
        if !entity.accepts_emitter(channel) {
            return Err(Error::UnknownChannel {
                id: entity.id().clone(),
                channel: channel.to_string(),
            });
        }
        let mut event = Event::new(source, channel, Payload::Signal(value.into()));
        self.dispatch(&mut event)
    }

    /// Deliver an event to the handlers bound when delivery starts
    ///
    /// Handlers whose entity is no longer mounted by the time their turn
    /// comes are skipped.
    pub(crate) fn dispatch(&mut self, event: &mut Event) -> Result<()> {
        let targets = match self
            .entity(event.source())?
            .emitters
            .get(event.channel())
        {
            Some(connector) if !connector.is_empty() => connector.endpoints().to_vec(),
            _ => return Ok(()),
        };
        if self.depth >= self.config.max_event_depth() {
            return Err(Error::EventDepthExceeded(self.config.max_event_depth()));
        }
        self.depth += 1;
        let delivered = self.deliver(targets, event);
        self.depth -= 1;
        delivered
    }

    fn deliver(&mut self, targets: Vec<Endpoint>, event: &mut Event) -> Result<()> {
        for target in targets {
            let callback = match self.entities.get(&target.entity) {
                Some(entity) if entity.is_mounted() => entity
                    .handlers
                    .get(&target.channel)
                    .map(|slot| Rc::clone(&slot.callback)),
                _ => None,
            };
            if let Some(callback) = callback {
                callback(self, target.entity, event)?;
            }
        }
        Ok(())
    }

    /// Record an edge on both endpoints, without lifecycle checks
    ///
    /// All validation happens before either side is touched.
    pub(crate) fn link(
        &mut self,
        emitter: EntityKey,
        emitter_channel: &str,
        handler: EntityKey,
        handler_channel: &str,
    ) -> Result<()> {
        let source = self.entity(emitter)?;
        if !source.accepts_emitter(emitter_channel) {
            return Err(Error::UnknownChannel {
                id: source.id().clone(),
                channel: emitter_channel.to_string(),
            });
        }
        let sink = self.entity(handler)?;
        if !sink.handlers.contains_key(handler_channel) {
            return Err(Error::UnknownChannel {
                id: sink.id().clone(),
                channel: handler_channel.to_string(),
            });
        }
        if self.is_bound(emitter, emitter_channel, handler, handler_channel) {
            return Err(Error::EdgeAlreadyBound {
                emitter: source.id().clone(),
                emitter_channel: emitter_channel.to_string(),
                handler: sink.id().clone(),
                handler_channel: handler_channel.to_string(),
            });
        }

        self.entity_mut(emitter)?
            .emitters
            .entry(emitter_channel.to_string())
            .or_default()
            .attach(Endpoint::new(handler, handler_channel));
        if let Some(slot) = self.entity_mut(handler)?.handlers.get_mut(handler_channel) {
            slot.connector.attach(Endpoint::new(emitter, emitter_channel));
        }
        Ok(())
    }

    /// Remove an edge from both endpoints, without lifecycle checks
    pub(crate) fn unlink(
        &mut self,
        emitter: EntityKey,
        emitter_channel: &str,
        handler: EntityKey,
        handler_channel: &str,
    ) -> Result<()> {
        let to_handler = Endpoint::new(handler, handler_channel);
        let to_emitter = Endpoint::new(emitter, emitter_channel);
        let source = self.entity(emitter)?;
        let sink = self.entity(handler)?;
        let forward = source
            .emitters
            .get(emitter_channel)
            .is_some_and(|c| c.contains(&to_handler));
        let backward = sink
            .handlers
            .get(handler_channel)
            .is_some_and(|slot| slot.connector.contains(&to_emitter));
        if !forward || !backward {
            return Err(Error::EdgeNotBound {
                emitter: source.id().clone(),
                emitter_channel: emitter_channel.to_string(),
                handler: sink.id().clone(),
                handler_channel: handler_channel.to_string(),
            });
        }

        if let Some(connector) = self.entity_mut(emitter)?.emitters.get_mut(emitter_channel) {
            connector.detach(&to_handler);
        }
        if let Some(slot) = self.entity_mut(handler)?.handlers.get_mut(handler_channel) {
            slot.connector.detach(&to_emitter);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::fixtures;
    use crate::{update_before, Error, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_bind_unbind_symmetry() {
        let mut world = fixtures::world();
        let (_, timer, bunny) = fixtures::mounted_garden(&mut world);

        world.bind(timer, "tickDone", bunny, "timeUpdateDone").unwrap();
        assert!(world.is_bound(timer, "tickDone", bunny, "timeUpdateDone"));
        assert_eq!(world.entity(timer).unwrap().bound_handlers("tickDone").len(), 1);
        assert_eq!(
            world.entity(bunny).unwrap().bound_emitters("timeUpdateDone").len(),
            1
        );

        world.unbind(timer, "tickDone", bunny, "timeUpdateDone").unwrap();
        assert!(!world.is_bound(timer, "tickDone", bunny, "timeUpdateDone"));
        assert!(world.entity(timer).unwrap().bound_handlers("tickDone").is_empty());
        assert!(world
            .entity(bunny)
            .unwrap()
            .bound_emitters("timeUpdateDone")
            .is_empty());
    }

    #[test]
    fn test_double_bind_and_missing_unbind_fail() {
        let mut world = fixtures::world();
        let (_, timer, bunny) = fixtures::mounted_garden(&mut world);

        world.bind(timer, "tickDone", bunny, "timeUpdateDone").unwrap();
        assert!(matches!(
            world.bind(timer, "tickDone", bunny, "timeUpdateDone"),
            Err(Error::EdgeAlreadyBound { .. })
        ));
        assert!(matches!(
            world.unbind(timer, "tickBefore", bunny, "timeUpdateDone"),
            Err(Error::EdgeNotBound { .. })
        ));
        assert_eq!(world.entity(timer).unwrap().bound_handlers("tickDone").len(), 1);
    }

    #[test]
    fn test_unknown_channels_are_rejected() {
        let mut world = fixtures::world();
        let (_, timer, bunny) = fixtures::mounted_garden(&mut world);

        assert!(matches!(
            world.bind(timer, "explode", bunny, "timeUpdateDone"),
            Err(Error::UnknownChannel { .. })
        ));
        assert!(matches!(
            world.bind(timer, "tickDone", bunny, "nothing"),
            Err(Error::UnknownChannel { .. })
        ));
        assert!(matches!(
            world.emit(timer, "explode", Value::Null),
            Err(Error::UnknownChannel { .. })
        ));
    }

    #[test]
    fn test_bind_requires_mounted_endpoints() {
        let mut world = fixtures::world();
        let (_, timer, _) = fixtures::mounted_garden(&mut world);
        let loose = world.instantiate(&fixtures::bunny_config(0, 100)).unwrap();

        let err = world
            .bind(timer, "tickDone", loose, "timeUpdateDone")
            .unwrap_err();
        assert!(matches!(err, Error::NotMounted(_)));
        assert!(!world.is_bound(timer, "tickDone", loose, "timeUpdateDone"));
    }

    #[test]
    fn test_bind_by_id() {
        let mut world = fixtures::world();
        let (_, timer, bunny) = fixtures::mounted_garden(&mut world);
        let bunny_id = world.entity(bunny).unwrap().id().clone();

        world
            .bind_by_id(timer, "tickDone", &bunny_id, "timeUpdateDone")
            .unwrap();
        assert!(world.is_bound(timer, "tickDone", bunny, "timeUpdateDone"));
    }

    #[test]
    fn test_handlers_run_in_bind_order() {
        let mut world = fixtures::world();
        let (root, timer, first) = fixtures::mounted_garden(&mut world);
        let second = fixtures::spawn_bunny(&mut world, root, 0, 100);
        let log = Rc::new(RefCell::new(Vec::new()));

        for bunny in [second, first] {
            let log = Rc::clone(&log);
            world
                .add_state_observer(bunny, move |_| log.borrow_mut().push(bunny))
                .unwrap();
            world.bind(timer, "tickDone", bunny, "timeUpdateDone").unwrap();
        }
        fixtures::tick(&mut world, timer, 1).unwrap();

        assert_eq!(*log.borrow(), vec![second, first]);
    }

    #[test]
    fn test_handler_unbinding_a_later_handler_keeps_snapshot() {
        let mut world = fixtures::world();
        let (root, timer, first) = fixtures::mounted_garden(&mut world);
        let second = fixtures::spawn_bunny(&mut world, root, 0, 100);
        let meddler = fixtures::spawn_meddler(&mut world, root, second);

        world.bind(timer, "tickDone", meddler, "meddle").unwrap();
        world.bind(timer, "tickDone", first, "timeUpdateDone").unwrap();
        world.bind(timer, "tickDone", second, "timeUpdateDone").unwrap();

        fixtures::tick(&mut world, timer, 1).unwrap();
        // The meddler unbound `second` mid-delivery; the snapshot still reached it.
        assert_eq!(world.entity(second).unwrap().get_int("curAge"), Some(1));
        assert!(!world.is_bound(timer, "tickDone", second, "timeUpdateDone"));

        fixtures::tick(&mut world, timer, 1).unwrap();
        assert_eq!(world.entity(first).unwrap().get_int("curAge"), Some(2));
        assert_eq!(world.entity(second).unwrap().get_int("curAge"), Some(1));
    }

    #[test]
    fn test_binding_a_check_refreshes_current_value() {
        let mut world = fixtures::world();
        let (root, _, _) = fixtures::mounted_garden(&mut world);
        let gauge = fixtures::spawn_gauge(&mut world, root, 150);
        let limiter = fixtures::spawn_limiter(&mut world, root, 0, 100);
        assert_eq!(world.get(gauge, "level").unwrap(), Value::Int(150));

        world
            .bind(gauge, &update_before("level"), limiter, "clamp")
            .unwrap();
        assert_eq!(world.get(gauge, "level").unwrap(), Value::Int(100));
        assert_eq!(
            world.entity(gauge).unwrap().origin().get("level"),
            Some(&Value::Int(150))
        );

        world
            .unbind(gauge, &update_before("level"), limiter, "clamp")
            .unwrap();
        assert_eq!(world.get(gauge, "level").unwrap(), Value::Int(150));
    }

    #[test]
    fn test_runaway_emission_hits_depth_limit() {
        let mut world = fixtures::world_with_depth(4);
        let (root, _, _) = fixtures::mounted_garden(&mut world);
        let echo = fixtures::spawn_echo(&mut world, root);
        world.bind(echo, "ping", echo, "echo").unwrap();

        assert_eq!(
            world.emit(echo, "ping", Value::Null),
            Err(Error::EventDepthExceeded(4))
        );
        assert_eq!(world.depth, 0);
    }
}

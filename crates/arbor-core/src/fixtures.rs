//! Entity kinds and helpers shared by the unit tests

use crate::{
    Config, EntityId, EntityKey, Error, Factory, Result, Template, Value, World, WorldConfig,
};

pub(crate) fn timer_config() -> Config {
    Config::new("timer")
}

pub(crate) fn bunny_config(cur_age: i64, max_age: i64) -> Config {
    Config::new("bunny")
        .with_state("curAge", cur_age)
        .with_state("maxAge", max_age)
}

/// Error returned by the kinds that always fail
pub(crate) fn refused() -> Error {
    Error::MalformedBundle("refused".into())
}

fn int(value: Option<&Value>) -> i64 {
    value.and_then(Value::as_int).unwrap_or_default()
}

pub(crate) fn factory() -> Factory {
    let mut factory = Factory::new();
    factory
        .register("root", |_| {
            Ok(Template::new()
                .state("progress", 0)
                .list(vec![bunny_config(0, 100)])
                .slot("timer", Some(timer_config())))
        })
        .unwrap();
    factory
        .register("timer", |_| {
            Ok(Template::new()
                .state("time", 0)
                .emitter("tickBefore")
                .emitter("tickDone"))
        })
        .unwrap();
    factory
        .register("bunny", |_| {
            Ok(Template::new()
                .state("curAge", 0)
                .state("maxAge", 100)
                .slot("features", Some(Config::new("features")))
                .handler("timeUpdateDone", |world, me, _| {
                    world.modify_state(me, "curAge", |age| age.offset(1).unwrap_or_default())?;
                    Ok(())
                }))
        })
        .unwrap();
    factory
        .register("features", |_| Ok(Template::new().state("speed", 1)))
        .unwrap();
    factory
        .register("gauge", |_| Ok(Template::new().state("level", 0)))
        .unwrap();
    factory
        .register("limiter", |_| {
            Ok(Template::new()
                .state("min", 0)
                .state("max", 100)
                .handler("clamp", |world, me, event| {
                    let min = int(world.entity(me)?.get("min"));
                    let max = int(world.entity(me)?.get("max"));
                    if let Some(update) = event.update_mut() {
                        if let Some(next) = update.next.as_int() {
                            update.next = Value::Int(next.clamp(min, max));
                        }
                    }
                    Ok(())
                }))
        })
        .unwrap();
    factory
        .register("recorder", |_| {
            Ok(Template::new()
                .state("seen", 0)
                .state("prev", Value::Null)
                .state("last", Value::Null)
                .handler("record", |world, me, event| {
                    let (prev, last) = match (event.update(), event.value(), event.children()) {
                        (Some(update), _, _) => (update.prev().clone(), update.next.clone()),
                        (_, Some(value), _) => (Value::Null, value.clone()),
                        (_, _, Some(children)) => (Value::Null, Value::from(children.len() as i64)),
                        _ => (Value::Null, Value::Null),
                    };
                    world.modify_state(me, "seen", |n| n.offset(1).unwrap_or_default())?;
                    world.set_state(me, "prev", prev)?;
                    world.set_state(me, "last", last)?;
                    Ok(())
                }))
        })
        .unwrap();
    factory
        .register("recheck", |_| {
            Ok(Template::new().handler("recheck", |world, _, event| {
                if let Some(update) = event.update() {
                    let (key, next) = (update.key().to_string(), update.next.clone());
                    world.set_state(event.source(), &key, next)?;
                }
                Ok(())
            }))
        })
        .unwrap();
    factory
        .register("decay", |_| {
            Ok(Template::new().handler("decay", |world, _, event| {
                if let Some(update) = event.update() {
                    let next = update.next.as_int().unwrap_or_default();
                    if next > 0 {
                        let key = update.key().to_string();
                        world.set_state(event.source(), &key, next - 1)?;
                    }
                }
                Ok(())
            }))
        })
        .unwrap();
    factory
        .register("forager", |_| {
            Ok(Template::new()
                .state("meals", 0)
                .handler("eat", |world, me, _| {
                    world.modify_state(me, "meals", |n| n.offset(1).unwrap_or_default())?;
                    Ok(())
                })
                .on_mount(|world, me| {
                    let timer = world
                        .root()
                        .and_then(|root| world.entity(root).ok())
                        .and_then(|root| root.slot("timer"));
                    match timer {
                        Some(timer) => world.bind(timer, "tickDone", me, "eat"),
                        None => Ok(()),
                    }
                }))
        })
        .unwrap();
    factory
        .register("meddler", |_| {
            Ok(Template::new()
                .state("target", "")
                .handler("meddle", |world, me, event| {
                    let target = world
                        .entity(me)?
                        .get("target")
                        .and_then(Value::as_str)
                        .map(EntityId::new)
                        .unwrap_or_else(|| EntityId::new(""));
                    let target = world.resolve(me, &target)?;
                    let (source, channel) = (event.source(), event.channel().to_string());
                    if world.is_bound(source, &channel, target, "timeUpdateDone") {
                        world.unbind(source, &channel, target, "timeUpdateDone")?;
                    }
                    Ok(())
                }))
        })
        .unwrap();
    factory
        .register("grumpy", |_| {
            Ok(Template::new()
                .state("mood", "sour")
                .slot("features", Some(Config::new("features")))
                .on_mount(|_, _| Err(refused())))
        })
        .unwrap();
    factory
        .register("faulty", |_| {
            Ok(Template::new().handler("fail", |_, _, _| Err(refused())))
        })
        .unwrap();
    factory
        .register("echo", |_| {
            Ok(Template::new()
                .emitter("ping")
                .handler("echo", |world, me, _| world.emit(me, "ping", Value::Null)))
        })
        .unwrap();
    factory
}

pub(crate) fn world() -> World {
    world_with_prefix("w")
}

pub(crate) fn world_with_prefix(prefix: &str) -> World {
    World::with_config(factory(), WorldConfig::default().with_id_prefix(prefix))
}

pub(crate) fn world_with_depth(depth: usize) -> World {
    let config = WorldConfig::default()
        .with_id_prefix("w")
        .with_max_event_depth(depth);
    World::with_config(factory(), config)
}

/// Mount a root holding one bunny and a timer; returns `(root, timer, bunny)`
pub(crate) fn mounted_garden(world: &mut World) -> (EntityKey, EntityKey, EntityKey) {
    let root = world.instantiate(&Config::new("root")).unwrap();
    world.mount_root(root).unwrap();
    let entity = world.entity(root).unwrap();
    let timer = entity.slot("timer").unwrap();
    let bunny = entity.list()[0];
    (root, timer, bunny)
}

/// Instantiate a config and append it to `parent`'s list slot
pub(crate) fn spawn(world: &mut World, parent: EntityKey, config: Config) -> EntityKey {
    let key = world.instantiate(&config).unwrap();
    world.append_child(parent, key).unwrap();
    key
}

pub(crate) fn spawn_kind(world: &mut World, parent: EntityKey, code: &str) -> EntityKey {
    spawn(world, parent, Config::new(code))
}

pub(crate) fn spawn_bunny(
    world: &mut World,
    parent: EntityKey,
    cur_age: i64,
    max_age: i64,
) -> EntityKey {
    spawn(world, parent, bunny_config(cur_age, max_age))
}

pub(crate) fn spawn_gauge(world: &mut World, parent: EntityKey, level: i64) -> EntityKey {
    spawn(world, parent, Config::new("gauge").with_state("level", level))
}

pub(crate) fn spawn_limiter(world: &mut World, parent: EntityKey, min: i64, max: i64) -> EntityKey {
    let config = Config::new("limiter")
        .with_state("min", min)
        .with_state("max", max);
    spawn(world, parent, config)
}

pub(crate) fn spawn_recorder(world: &mut World, parent: EntityKey) -> EntityKey {
    spawn_kind(world, parent, "recorder")
}

pub(crate) fn spawn_forager(world: &mut World, parent: EntityKey) -> EntityKey {
    spawn_kind(world, parent, "forager")
}

pub(crate) fn spawn_echo(world: &mut World, parent: EntityKey) -> EntityKey {
    spawn_kind(world, parent, "echo")
}

pub(crate) fn spawn_meddler(world: &mut World, parent: EntityKey, target: EntityKey) -> EntityKey {
    let target = world.entity(target).unwrap().id().as_str().to_string();
    spawn(world, parent, Config::new("meddler").with_state("target", target))
}

/// Advance a timer: `tickBefore`, then `time += dt`, then `tickDone`
pub(crate) fn tick(world: &mut World, timer: EntityKey, dt: i64) -> Result<()> {
    world.emit(timer, "tickBefore", dt)?;
    world.modify_state(timer, "time", |t| t.offset(dt).unwrap_or_default())?;
    world.emit(timer, "tickDone", dt)
}

//! Warren Example
//!
//! Demonstrates arbor with a small bunny warren.
//! A timer drives the bunnies' ages, the root tracks progress, and the
//! whole tree is saved to a slot and restored with its edges intact.

use arbor_archive::{Archive, ArchiveConfig, MemoryStorage};
use arbor_core::{Config, EntityKey, Factory, Template, Value, World};
use std::cell::Cell;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

fn bunny(max_age: i64) -> Config {
    Config::new("bunny").with_state("maxAge", max_age)
}

fn timer_of(world: &World) -> Option<EntityKey> {
    world
        .root()
        .and_then(|root| world.entity(root).ok())
        .and_then(|root| root.slot("timer"))
}

fn factory() -> arbor_core::Result<Factory> {
    let mut factory = Factory::new();
    factory.register("warren", |_| {
        Ok(Template::new()
            .state("progress", 0.0)
            .list(vec![bunny(4), bunny(8)])
            .slot("timer", Some(Config::new("timer")))
            .handler("onTick", |world, me, event| {
                let time = event
                    .update()
                    .and_then(|update| update.next.as_float())
                    .unwrap_or_default();
                world.set_state(me, "progress", (time / 10.0).min(1.0))?;
                Ok(())
            })
            .on_mount(|world, me| match timer_of(world) {
                Some(timer) if !world.is_bound(timer, "timeUpdateDone", me, "onTick") => {
                    world.bind(timer, "timeUpdateDone", me, "onTick")
                }
                _ => Ok(()),
            }))
    })?;
    factory.register("timer", |_| Ok(Template::new().state("time", 0)))?;
    factory.register("bunny", |_| {
        Ok(Template::new()
            .state("curAge", 0)
            .state("maxAge", 10)
            .slot("features", Some(Config::new("features")))
            .handler("age", |world, me, _| {
                world.modify_state(me, "curAge", |age| age.offset(1).unwrap_or_default())?;
                Ok(())
            })
            .handler("fence", |world, me, event| {
                let max_age = world.entity(me)?.get_int("maxAge").unwrap_or(i64::MAX);
                if let Some(update) = event.update_mut() {
                    if let Some(next) = update.next.as_int() {
                        update.next = Value::Int(next.min(max_age));
                    }
                }
                Ok(())
            })
            .on_mount(|world, me| {
                if !world.is_bound(me, "curAgeUpdateBefore", me, "fence") {
                    world.bind(me, "curAgeUpdateBefore", me, "fence")?;
                }
                match timer_of(world) {
                    Some(timer) if !world.is_bound(timer, "timeUpdateDone", me, "age") => {
                        world.bind(timer, "timeUpdateDone", me, "age")
                    }
                    _ => Ok(()),
                }
            }))
    })?;
    factory.register("features", |_| {
        Ok(Template::new().state("speed", 1).state("color", "brown"))
    })?;
    Ok(factory)
}

fn tick(world: &mut World, steps: i64) -> arbor_core::Result<()> {
    let Some(timer) = timer_of(world) else {
        return Ok(());
    };
    for _ in 0..steps {
        world.modify_state(timer, "time", |t| t.offset(1).unwrap_or_default())?;
    }
    Ok(())
}

fn main() -> arbor_archive::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .without_time()
        .init();

    println!("=== Arbor Warren Example ===\n");

    let mut world = World::new(factory()?);
    let root = world.instantiate(&Config::new("warren"))?;
    world.mount_root(root)?;

    let Some(&first) = world.entity(root)?.list().first() else {
        println!("The warren is empty");
        return Ok(());
    };
    let births = Rc::new(Cell::new(0));
    let counter = Rc::clone(&births);
    world.add_children_observer(root, move |children| {
        counter.set(counter.get() + 1);
        println!("  warren now holds {} children", children.len());
    })?;
    world.add_state_observer(first, |state| {
        if let Some(age) = state.get("curAge") {
            println!("  first bunny is {age}");
        }
    })?;

    println!("Running for 5 ticks...\n");
    tick(&mut world, 5)?;

    println!("\nA bunny is born...\n");
    let newborn = world.instantiate(&bunny(3))?;
    world.append_child(root, newborn)?;
    tick(&mut world, 5)?;

    println!("\n{}", world.describe(root)?);
    println!("Children observer fired {} times\n", births.get());

    let mut archive = Archive::open(MemoryStorage::new(), ArchiveConfig::default())?;
    archive.create(&mut world, "spring", &Config::new("warren"))?;
    archive.load(0)?;
    archive.save(&world, root)?;
    for slot in archive.slots() {
        println!(
            "Saved slot {} ({}): {:.0}% done",
            slot.id,
            slot.display_name,
            slot.progress * 100.0
        );
    }

    let old = world.unmount_root()?;
    world.destroy(old)?;

    let bundle = archive.load(0)?;
    let restored = world.deserialize(&bundle)?;
    world.mount_root(restored)?;
    println!("\nRestored {} entities, ticking twice more...\n", bundle.count());
    tick(&mut world, 2)?;
    println!("{}", world.describe(restored)?);

    println!("=== Simulation Complete ===");
    Ok(())
}

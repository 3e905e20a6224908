//! Property tests over random tree shapes and binding sequences

use crate::fixtures;
use crate::{Bundle, Config, EntityKey, Error, World};
use proptest::prelude::*;
use std::collections::HashSet;

fn arb_bunnies() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..200, 1i64..300), 0..6)
}

fn garden(world: &mut World, bunnies: &[(i64, i64)]) -> (EntityKey, EntityKey, Vec<EntityKey>) {
    let config = Config::new("root").with_children(
        bunnies
            .iter()
            .map(|(cur, max)| fixtures::bunny_config(*cur, *max))
            .collect(),
    );
    let root = world.instantiate(&config).unwrap();
    world.mount_root(root).unwrap();
    let entity = world.entity(root).unwrap();
    let timer = entity.slot("timer").unwrap();
    (root, timer, entity.list().to_vec())
}

proptest! {
    #[test]
    fn registry_matches_mounted_tree(
        bunnies in arb_bunnies(),
        removed in prop::collection::vec(any::<prop::sample::Index>(), 0..3),
    ) {
        let mut world = fixtures::world();
        let (root, _, keys) = garden(&mut world, &bunnies);

        let mut live: Vec<EntityKey> = keys;
        for index in removed {
            if live.is_empty() {
                break;
            }
            let key = live.remove(index.index(live.len()));
            world.remove_child(root, key).unwrap();
            prop_assert_eq!(world.lookup(world.entity(key).unwrap().id()), None);
        }

        let subtree = world.subtree(root).unwrap();
        prop_assert_eq!(world.registry().len(), subtree.len());
        let ids: HashSet<_> = subtree
            .iter()
            .map(|key| world.entity(*key).unwrap().id().clone())
            .collect();
        prop_assert_eq!(ids.len(), subtree.len());
        for key in &subtree {
            prop_assert_eq!(world.lookup(world.entity(*key).unwrap().id()), Some(*key));
        }

        world.unmount_root().unwrap();
        prop_assert!(world.registry().is_empty());
    }

    #[test]
    fn bind_unbind_stay_symmetric(
        bunnies in arb_bunnies(),
        ops in prop::collection::vec((any::<prop::sample::Index>(), any::<bool>()), 0..20),
    ) {
        let mut world = fixtures::world();
        let (_, timer, keys) = garden(&mut world, &bunnies);
        prop_assume!(!keys.is_empty());

        let mut model: Vec<EntityKey> = Vec::new();
        for (index, bind) in ops {
            let bunny = keys[index.index(keys.len())];
            let bound = model.contains(&bunny);
            if bind {
                let result = world.bind(timer, "tickDone", bunny, "timeUpdateDone");
                prop_assert_eq!(result.is_ok(), !bound);
                if !bound {
                    model.push(bunny);
                } else {
                    prop_assert!(
                        matches!(result, Err(Error::EdgeAlreadyBound { .. })),
                        "expected EdgeAlreadyBound"
                    );
                }
            } else {
                let result = world.unbind(timer, "tickDone", bunny, "timeUpdateDone");
                prop_assert_eq!(result.is_ok(), bound);
                model.retain(|k| *k != bunny);
            }

            let handlers: Vec<EntityKey> = world
                .entity(timer)
                .unwrap()
                .bound_handlers("tickDone")
                .iter()
                .map(|endpoint| endpoint.entity)
                .collect();
            prop_assert_eq!(&handlers, &model);
            for key in &keys {
                let emitters = world.entity(*key).unwrap().bound_emitters("timeUpdateDone").len();
                prop_assert_eq!(emitters, usize::from(model.contains(key)));
            }
        }
    }

    #[test]
    fn bundles_round_trip(
        bunnies in arb_bunnies(),
        wiring in prop::collection::vec(any::<bool>(), 0..6),
        ticks in 0i64..4,
    ) {
        let mut world = fixtures::world();
        let (root, timer, keys) = garden(&mut world, &bunnies);
        for (key, wired) in keys.iter().zip(wiring) {
            if wired {
                world.bind(timer, "tickDone", *key, "timeUpdateDone").unwrap();
            }
        }
        for _ in 0..ticks {
            fixtures::tick(&mut world, timer, 1).unwrap();
        }

        let bundle = world.serialize(root).unwrap();
        let json = bundle.to_json().unwrap();
        world.unmount_root().unwrap();

        let mut restored = fixtures::world_with_prefix("r");
        let copy = restored.deserialize(&Bundle::from_json(&json).unwrap()).unwrap();
        restored.mount_root(copy).unwrap();
        prop_assert_eq!(restored.serialize(copy).unwrap(), bundle);
    }

    #[test]
    fn setting_the_current_value_never_commits(bunnies in arb_bunnies()) {
        let mut world = fixtures::world();
        let (_, _, keys) = garden(&mut world, &bunnies);
        for key in keys {
            let age = world.get(key, "curAge").unwrap();
            prop_assert_eq!(world.set_state(key, "curAge", age), Ok(false));
        }
    }
}

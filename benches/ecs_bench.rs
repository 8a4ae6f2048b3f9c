//! Core hot-path benchmarks: entity churn, queries, full ticks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use columnar_ecs::{
    fn_system, ComponentData, ComponentTypeId, FieldKind, Phase, Schema, World,
};

const TRANSFORM: ComponentTypeId = ComponentTypeId(1);
const VELOCITY: ComponentTypeId = ComponentTypeId(2);

fn seeded_world(entities: u32) -> World {
    let mut world = World::new();
    world
        .register_component(
            TRANSFORM,
            Schema::new("Transform")
                .with("pos_x", FieldKind::F32)
                .with("pos_y", FieldKind::F32),
        )
        .unwrap();
    world
        .register_component(
            VELOCITY,
            Schema::new("Velocity")
                .with("lin_x", FieldKind::F32)
                .with("lin_y", FieldKind::F32),
        )
        .unwrap();

    for i in 0..entities {
        let e = world.create_entity().unwrap();
        world
            .add_component(
                e,
                TRANSFORM,
                ComponentData::new().set("pos_x", i as f32),
            )
            .unwrap();
        // Half the population moves
        if i % 2 == 0 {
            world
                .add_component(
                    e,
                    VELOCITY,
                    ComponentData::new().set("lin_x", 1.0f32).set("lin_y", 0.5f32),
                )
                .unwrap();
        }
    }
    world
}

fn bench_spawn(c: &mut Criterion) {
    c.bench_function("spawn_1k_two_components", |b| {
        b.iter(|| black_box(seeded_world(1_000)));
    });
}

fn bench_query(c: &mut Criterion) {
    let world = seeded_world(10_000);
    c.bench_function("query_10k_driver_selection", |b| {
        b.iter(|| black_box(world.query(&[TRANSFORM, VELOCITY], &[]).unwrap()));
    });
}

fn bench_tick(c: &mut Criterion) {
    let mut world = seeded_world(10_000);
    world
        .register_system(
            "Movement",
            Phase::Fixed,
            &[],
            fn_system(|dt, world| {
                for h in world.query(&[TRANSFORM, VELOCITY], &[])? {
                    let lx = world.get_component(h, VELOCITY)?.get_f32("lin_x")?;
                    let px = world.get_component(h, TRANSFORM)?.get_f32("pos_x")?;
                    world
                        .get_component_mut(h, TRANSFORM)?
                        .set("pos_x", px + lx * dt)?;
                }
                Ok(())
            }),
        )
        .unwrap();

    c.bench_function("tick_10k_movement", |b| {
        b.iter(|| world.update(black_box(1.0 / 60.0)));
    });
}

criterion_group!(benches, bench_spawn, bench_query, bench_tick);
criterion_main!(benches);

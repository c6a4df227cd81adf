use glam::Vec2;
use momentum2d::{
    core::{
        body::{BodyType, RigidBody},
        fixture::FixtureDef,
    },
    world::World,
    Shape, StepConf,
};

fn thin_wall_world(bullet_speed: f32) -> (World, momentum2d::EntityId) {
    let mut world = World::new(Vec2::ZERO);

    // Thin static wall at x = 5.
    let wall = world
        .create_body(
            RigidBody::builder()
                .position(Vec2::new(5.0, 0.0))
                .build(),
        )
        .unwrap();
    world
        .create_fixture(
            wall,
            FixtureDef::new(Shape::rect(0.05, 4.0).unwrap()).restitution(0.0),
        )
        .unwrap();

    // Fast bullet crossing several meters per step.
    let bullet = world
        .create_body(
            RigidBody::builder()
                .body_type(BodyType::Dynamic)
                .position(Vec2::ZERO)
                .linear_velocity(Vec2::new(bullet_speed, 0.0))
                .bullet(true)
                .build(),
        )
        .unwrap();
    world
        .create_fixture(
            bullet,
            FixtureDef::new(Shape::circle(0.1).unwrap())
                .density(1.0)
                .restitution(0.0),
        )
        .unwrap();

    (world, bullet)
}

#[test]
fn fast_bullet_is_stopped_by_a_thin_wall() {
    let (mut world, bullet) = thin_wall_world(600.0);
    let conf = StepConf::default();

    for _ in 0..3 {
        world.step(&conf).unwrap();
    }

    let body = world.body(bullet).unwrap();
    assert!(
        body.position().x < 5.0,
        "bullet tunneled to {}",
        body.position().x
    );
    // Came to rest against the wall face (restitution zero).
    assert!(
        body.linear_velocity().x.abs() < 1.0,
        "bullet kept speed {}",
        body.linear_velocity().x
    );
}

#[test]
fn the_same_bullet_tunnels_without_toi() {
    let (mut world, bullet) = thin_wall_world(600.0);
    let conf = StepConf {
        do_toi: false,
        ..Default::default()
    };

    world.step(&conf).unwrap();

    // 10 m in one step blows straight through the 0.1 m wall.
    let body = world.body(bullet).unwrap();
    assert!(
        body.position().x > 5.5,
        "expected tunneling, stopped at {}",
        body.position().x
    );
}

#[test]
fn bullet_hitting_a_dynamic_box_transfers_momentum() {
    let mut world = World::new(Vec2::ZERO);

    let target = world
        .create_body(
            RigidBody::builder()
                .body_type(BodyType::Dynamic)
                .position(Vec2::new(2.0, 0.0))
                .build(),
        )
        .unwrap();
    world
        .create_fixture(
            target,
            FixtureDef::new(Shape::rect(0.5, 0.5).unwrap()).density(1.0),
        )
        .unwrap();
    let target_mass = world.body(target).unwrap().mass();

    // Same mass as the box so the zero-restitution impact shares velocity
    // equally.
    let bullet = world
        .create_body(
            RigidBody::builder()
                .body_type(BodyType::Dynamic)
                .position(Vec2::new(0.0, 0.0))
                .linear_velocity(Vec2::new(100.0, 0.0))
                .bullet(true)
                .build(),
        )
        .unwrap();
    let radius = (target_mass / std::f32::consts::PI).sqrt();
    world
        .create_fixture(
            bullet,
            FixtureDef::new(Shape::circle(radius).unwrap()).density(1.0),
        )
        .unwrap();

    let conf = StepConf {
        allow_sleep: false,
        ..Default::default()
    };
    world.step(&conf).unwrap();

    let bullet_body = world.body(bullet).unwrap();
    let target_body = world.body(target).unwrap();

    // The impact happened inside the step: momentum moved into the target.
    assert!(
        target_body.linear_velocity().x > 10.0,
        "target barely moved: {}",
        target_body.linear_velocity().x
    );
    let total_momentum = bullet_body.mass() * bullet_body.linear_velocity().x
        + target_body.mass() * target_body.linear_velocity().x;
    let expected = bullet_body.mass() * 100.0;
    assert!(
        (total_momentum - expected).abs() / expected < 0.05,
        "momentum drifted: {total_momentum} vs {expected}"
    );

    // No tunneling: the bullet stayed on the near side of the target.
    assert!(bullet_body.position().x < target_body.position().x);
    let gap = target_body.position().x - bullet_body.position().x;
    assert!(
        gap >= 0.5 + radius - 10.0 * conf.linear_slop,
        "bodies interpenetrate: gap {gap}"
    );
}

#[test]
fn toi_substep_counters_are_bounded() {
    // A bullet bouncing around a closed box of walls exercises repeated TOI
    // sub-steps without exceeding the per-contact cap.
    let mut world = World::new(Vec2::ZERO);
    let walls = [
        (Vec2::new(0.0, 3.0), Shape::rect(3.0, 0.1).unwrap()),
        (Vec2::new(0.0, -3.0), Shape::rect(3.0, 0.1).unwrap()),
        (Vec2::new(3.0, 0.0), Shape::rect(0.1, 3.0).unwrap()),
        (Vec2::new(-3.0, 0.0), Shape::rect(0.1, 3.0).unwrap()),
    ];
    for (position, shape) in walls {
        let wall = world
            .create_body(RigidBody::builder().position(position).build())
            .unwrap();
        world
            .create_fixture(wall, FixtureDef::new(shape).restitution(1.0))
            .unwrap();
    }
    let bullet = world
        .create_body(
            RigidBody::builder()
                .body_type(BodyType::Dynamic)
                .linear_velocity(Vec2::new(170.0, 90.0))
                .bullet(true)
                .build(),
        )
        .unwrap();
    world
        .create_fixture(
            bullet,
            FixtureDef::new(Shape::circle(0.2).unwrap())
                .density(1.0)
                .restitution(1.0),
        )
        .unwrap();

    let conf = StepConf {
        allow_sleep: false,
        ..Default::default()
    };
    for _ in 0..30 {
        let stats = world.step(&conf).unwrap();
        assert!(stats.toi_islands <= conf.max_substeps as usize);
        let p = world.body(bullet).unwrap().position();
        assert!(
            p.x.abs() < 3.2 && p.y.abs() < 3.2,
            "bullet escaped the box: {p:?}"
        );
    }
}

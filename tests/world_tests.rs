use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;
use momentum2d::{
    collision::manifold::ManifoldType,
    core::{
        body::{BodyType, RigidBody},
        fixture::FixtureDef,
    },
    world::{ContactListener, World},
    Contact, ContactImpulses, Shape, StepConf,
};

fn ground_edge(world: &mut World) -> momentum2d::EntityId {
    let ground = world.create_body(RigidBody::new(BodyType::Static)).unwrap();
    world
        .create_fixture(
            ground,
            FixtureDef::new(
                Shape::edge(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)).unwrap(),
            ),
        )
        .unwrap();
    ground
}

#[test]
fn falling_disk_comes_to_rest_on_the_ground() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    ground_edge(&mut world);

    let disk = world
        .create_body(
            RigidBody::builder()
                .body_type(BodyType::Dynamic)
                .position(Vec2::new(0.0, 2.0))
                .build(),
        )
        .unwrap();
    world
        .create_fixture(disk, FixtureDef::new(Shape::circle(1.0).unwrap()).density(1.0))
        .unwrap();

    let conf = StepConf::default();
    for _ in 0..120 {
        world.step(&conf).unwrap();
    }

    let body = world.body(disk).unwrap();
    let y = body.position().y;
    assert!((y - 1.0).abs() < 0.02, "rest height was {y}");
    assert!(
        body.linear_velocity().y.abs() <= 0.1,
        "vertical velocity was {}",
        body.linear_velocity().y
    );

    // The manifold is a ground-face manifold with one point under the disk
    // center, carrying a positive normal impulse.
    let (_, contact) = world
        .contacts()
        .find(|(_, c)| c.is_touching())
        .expect("disk should be touching the ground");
    assert_eq!(contact.manifold().kind, ManifoldType::FaceA);
    assert_eq!(contact.manifold().point_count(), 1);
    assert!(contact.manifold().points()[0].normal_impulse > 0.0);

    let world_manifold = momentum2d::WorldManifold::new(
        contact.manifold(),
        &world.body(contact.body_a()).unwrap().transform(),
        world
            .fixture(contact.fixture_a())
            .unwrap()
            .shape()
            .vertex_radius(),
        &world.body(contact.body_b()).unwrap().transform(),
        world
            .fixture(contact.fixture_b())
            .unwrap()
            .shape()
            .vertex_radius(),
    );
    assert!(world_manifold.points[0].x.abs() < 0.05);
    assert!(world_manifold.points[0].y.abs() < 0.05);
}

#[test]
fn stacked_squares_settle_and_sleep() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    ground_edge(&mut world);

    let mut boxes = Vec::new();
    for i in 0..5 {
        let body = world
            .create_body(
                RigidBody::builder()
                    .body_type(BodyType::Dynamic)
                    .position(Vec2::new(0.0, 0.5 + i as f32))
                    .build(),
            )
            .unwrap();
        world
            .create_fixture(
                body,
                FixtureDef::new(Shape::rect(0.5, 0.5).unwrap())
                    .density(1.0)
                    .friction(0.5),
            )
            .unwrap();
        boxes.push(body);
    }

    let conf = StepConf::default();
    for _ in 0..240 {
        world.step(&conf).unwrap();
    }

    for (i, body_id) in boxes.iter().enumerate() {
        let body = world.body(*body_id).unwrap();
        assert!(
            body.linear_velocity().y.abs() <= conf.linear_sleep_tolerance,
            "box {i} still moving at {}",
            body.linear_velocity().y
        );
        assert!(!body.is_awake(), "box {i} failed to sleep");
    }
    for pair in boxes.windows(2) {
        let lower = world.body(pair[0]).unwrap().position().y;
        let upper = world.body(pair[1]).unwrap().position().y;
        let gap = (upper - lower - 1.0).abs();
        assert!(gap <= 3.0 * conf.linear_slop, "inter-box gap was {gap}");
    }
}

#[test]
fn sleeping_world_steps_are_no_ops() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    ground_edge(&mut world);
    let body = world
        .create_body(
            RigidBody::builder()
                .body_type(BodyType::Dynamic)
                .position(Vec2::new(0.0, 0.5))
                .build(),
        )
        .unwrap();
    world
        .create_fixture(body, FixtureDef::new(Shape::rect(0.5, 0.5).unwrap()).density(1.0))
        .unwrap();

    let conf = StepConf::default();
    for _ in 0..240 {
        world.step(&conf).unwrap();
    }
    assert!(!world.body(body).unwrap().is_awake());

    let position = world.body(body).unwrap().position();
    let events = Rc::new(RefCell::new(0usize));
    world.set_contact_listener(Box::new(CountingListener {
        begins: Rc::clone(&events),
        ends: Rc::new(RefCell::new(0)),
        pre_solves: Rc::new(RefCell::new(0)),
        post_solves: Rc::new(RefCell::new(0)),
    }));
    for _ in 0..10 {
        let stats = world.step(&conf).unwrap();
        assert_eq!(stats.islands_found, 0);
        assert_eq!(stats.toi_islands, 0);
    }
    assert_eq!(world.body(body).unwrap().position(), position);
    assert_eq!(*events.borrow(), 0);
}

#[test]
fn empty_world_step_reports_zero_work() {
    let mut world = World::default();
    let stats = world.step(&StepConf::default()).unwrap();
    assert_eq!(stats.pairs_emitted, 0);
    assert_eq!(stats.islands_found, 0);
    assert_eq!(stats.contacts_created, 0);
}

struct CountingListener {
    begins: Rc<RefCell<usize>>,
    ends: Rc<RefCell<usize>>,
    pre_solves: Rc<RefCell<usize>>,
    post_solves: Rc<RefCell<usize>>,
}

impl ContactListener for CountingListener {
    fn begin_contact(&mut self, _contact: &Contact) {
        *self.begins.borrow_mut() += 1;
    }
    fn end_contact(&mut self, _contact: &Contact) {
        *self.ends.borrow_mut() += 1;
    }
    fn pre_solve(&mut self, _contact: &mut Contact, _old: &momentum2d::Manifold) {
        *self.pre_solves.borrow_mut() += 1;
    }
    fn post_solve(&mut self, _contact: &Contact, impulses: &ContactImpulses) {
        assert!(impulses.count >= 1);
        *self.post_solves.borrow_mut() += 1;
    }
}

#[test]
fn listener_sees_begin_before_solve_reports() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    ground_edge(&mut world);
    let disk = world
        .create_body(
            RigidBody::builder()
                .body_type(BodyType::Dynamic)
                .position(Vec2::new(0.0, 1.5))
                .build(),
        )
        .unwrap();
    world
        .create_fixture(disk, FixtureDef::new(Shape::circle(1.0).unwrap()).density(1.0))
        .unwrap();

    let begins = Rc::new(RefCell::new(0));
    let ends = Rc::new(RefCell::new(0));
    let pre_solves = Rc::new(RefCell::new(0));
    let post_solves = Rc::new(RefCell::new(0));
    world.set_contact_listener(Box::new(CountingListener {
        begins: Rc::clone(&begins),
        ends: Rc::clone(&ends),
        pre_solves: Rc::clone(&pre_solves),
        post_solves: Rc::clone(&post_solves),
    }));

    let conf = StepConf::default();
    for _ in 0..60 {
        world.step(&conf).unwrap();
    }

    assert_eq!(*begins.borrow(), 1, "exactly one begin_contact");
    assert_eq!(*ends.borrow(), 0);
    assert!(*pre_solves.borrow() > 0);
    assert!(*post_solves.borrow() > 0);
    assert!(*pre_solves.borrow() >= *post_solves.borrow());
}

#[test]
fn origin_shift_preserves_the_simulation() {
    let build = |offset: Vec2| {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let ground = world
            .create_body(RigidBody::builder().position(offset).build())
            .unwrap();
        world
            .create_fixture(
                ground,
                FixtureDef::new(
                    Shape::edge(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)).unwrap(),
                ),
            )
            .unwrap();
        let mut ids = Vec::new();
        for i in 0..2 {
            let body = world
                .create_body(
                    RigidBody::builder()
                        .body_type(BodyType::Dynamic)
                        .position(offset + Vec2::new(i as f32 * 1.5, 2.0 + i as f32))
                        .build(),
                )
                .unwrap();
            world
                .create_fixture(
                    body,
                    FixtureDef::new(Shape::rect(0.5, 0.5).unwrap()).density(1.0),
                )
                .unwrap();
            ids.push(body);
        }
        (world, ids)
    };

    let conf = StepConf::default();

    let (mut reference, reference_ids) = build(Vec2::ZERO);
    for _ in 0..60 {
        reference.step(&conf).unwrap();
    }

    // Same scene built far from the origin, then shifted back onto it.
    let offset = Vec2::new(10000.0, 10000.0);
    let (mut shifted, shifted_ids) = build(offset);
    shifted.shift_origin(offset).unwrap();
    for _ in 0..60 {
        shifted.step(&conf).unwrap();
    }

    for (a, b) in reference_ids.iter().zip(shifted_ids.iter()) {
        let pa = reference.body(*a).unwrap().position();
        let pb = shifted.body(*b).unwrap().position();
        assert!(
            (pa - pb).length() < 1e-4,
            "positions diverged: {pa:?} vs {pb:?}"
        );
        let va = reference.body(*a).unwrap().linear_velocity();
        let vb = shifted.body(*b).unwrap().linear_velocity();
        assert!((va - vb).length() < 1e-4);
    }
}

#[test]
fn kinetic_energy_does_not_grow_in_frictionless_impacts() {
    let mut world = World::new(Vec2::ZERO);
    for (x, vx) in [(-2.0, 1.0), (2.0, -1.0)] {
        let body = world
            .create_body(
                RigidBody::builder()
                    .body_type(BodyType::Dynamic)
                    .position(Vec2::new(x, 0.0))
                    .linear_velocity(Vec2::new(vx, 0.0))
                    .build(),
            )
            .unwrap();
        world
            .create_fixture(
                body,
                FixtureDef::new(Shape::circle(1.0).unwrap())
                    .density(1.0)
                    .friction(0.0)
                    .restitution(0.0),
            )
            .unwrap();
    }

    let conf = StepConf {
        do_warm_start: false,
        allow_sleep: false,
        ..Default::default()
    };
    let initial = world.kinetic_energy();
    for _ in 0..120 {
        world.step(&conf).unwrap();
        let energy = world.kinetic_energy();
        assert!(
            energy <= initial * 1.001 + 1e-4,
            "kinetic energy grew to {energy} (from {initial})"
        );
    }
}

use glam::Vec2;
use momentum2d::{
    collision::{broadphase::DynamicTree, Aabb, RayCastInput},
    core::{
        body::{BodyType, RigidBody},
        fixture::FixtureDef,
    },
    world::World,
    Shape, StepConf,
};

fn grid_tree(count: usize) -> (DynamicTree<u32>, Vec<u32>) {
    let mut tree = DynamicTree::new();
    let mut proxies = Vec::with_capacity(count);
    for i in 0..count {
        let x = (i % 32) as f32 * 1.25;
        let y = (i / 32) as f32 * 1.25;
        let aabb = Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0));
        proxies.push(tree.create_proxy(aabb, 0.1, i as u32));
    }
    (tree, proxies)
}

/// Fraction along the segment at which it enters `aabb`, if it does.
fn segment_vs_aabb(p1: Vec2, p2: Vec2, aabb: &Aabb) -> Option<f32> {
    let d = p2 - p1;
    let mut t_min = 0.0f32;
    let mut t_max = 1.0f32;
    for axis in 0..2 {
        let (origin, dir, lo, hi) = if axis == 0 {
            (p1.x, d.x, aabb.min.x, aabb.max.x)
        } else {
            (p1.y, d.y, aabb.min.y, aabb.max.y)
        };
        if dir.abs() < f32::EPSILON {
            if origin < lo || origin > hi {
                return None;
            }
        } else {
            let inv = 1.0 / dir;
            let (t1, t2) = ((lo - origin) * inv, (hi - origin) * inv);
            let (t1, t2) = (t1.min(t2), t1.max(t2));
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
    }
    Some(t_min)
}

#[test]
fn tree_stays_balanced_over_a_large_grid() {
    let (tree, _) = grid_tree(1000);
    assert_eq!(tree.proxy_count(), 1000);
    assert!(tree.validate());
    // A balanced binary tree over 1000 leaves is around height 10; the AVL
    // rotations must keep it within a small factor of that.
    assert!(tree.height() < 24, "degenerate height {}", tree.height());
    assert!(tree.max_balance() <= 1 + tree.height() / 2);
}

#[test]
fn tree_ray_cast_matches_brute_force() {
    let count = 1000;
    let (tree, proxies) = grid_tree(count);

    let p1 = Vec2::new(-1.0, 0.5);
    let p2 = Vec2::new(50.0, 0.5);

    // Brute force: nearest AABB entry along the ray.
    let mut expected: Option<(u32, f32)> = None;
    for id in &proxies {
        if let Some(t) = segment_vs_aabb(p1, p2, &tree.fat_aabb(*id)) {
            if expected.is_none_or(|(_, best)| t < best) {
                expected = Some((*id, t));
            }
        }
    }
    let expected = expected.expect("the ray crosses the first grid row");

    // Tree cast, clipping to each hit so only nearer leaves remain.
    let mut best: Option<(u32, f32)> = None;
    let mut visited = 0;
    tree.ray_cast(
        &RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        },
        |input, id| {
            visited += 1;
            match segment_vs_aabb(input.p1, input.p2, &tree.fat_aabb(id)) {
                Some(t) if t <= input.max_fraction => {
                    best = Some(match best {
                        Some((_, current)) if current <= t => best.unwrap(),
                        _ => (id, t),
                    });
                    t.max(f32::EPSILON)
                }
                _ => input.max_fraction,
            }
        },
    );

    let best = best.expect("tree cast found nothing");
    assert_eq!(best.0, expected.0);
    assert!((best.1 - expected.1).abs() < 1e-6);
    // The clipped cast prunes almost the whole grid.
    assert!(visited < 100, "visited {visited} of {count} leaves");
}

#[test]
fn world_query_aabb_finds_fixture_children() {
    let mut world = World::new(Vec2::ZERO);
    let body = world
        .create_body(
            RigidBody::builder()
                .body_type(BodyType::Dynamic)
                .position(Vec2::new(3.0, 4.0))
                .build(),
        )
        .unwrap();
    let fixture = world
        .create_fixture(body, FixtureDef::new(Shape::circle(0.5).unwrap()))
        .unwrap();

    let mut hits = Vec::new();
    world.query_aabb(
        &Aabb::new(Vec2::new(2.0, 3.0), Vec2::new(4.0, 5.0)),
        |fixture_id, child| {
            hits.push((fixture_id, child));
            true
        },
    );
    assert_eq!(hits, vec![(fixture, 0)]);

    hits.clear();
    world.query_aabb(
        &Aabb::new(Vec2::new(-10.0, -10.0), Vec2::new(-5.0, -5.0)),
        |fixture_id, child| {
            hits.push((fixture_id, child));
            true
        },
    );
    assert!(hits.is_empty());
}

#[test]
fn world_ray_cast_reports_closest_hit_with_clipping() {
    let mut world = World::new(Vec2::ZERO);
    let mut fixtures = Vec::new();
    for x in [2.0f32, 5.0, 8.0] {
        let body = world
            .create_body(RigidBody::builder().position(Vec2::new(x, 0.0)).build())
            .unwrap();
        fixtures.push(
            world
                .create_fixture(body, FixtureDef::new(Shape::circle(0.5).unwrap()))
                .unwrap(),
        );
    }

    let mut closest = None;
    world.ray_cast(Vec2::new(-1.0, 0.0), Vec2::new(10.0, 0.0), |hit| {
        closest = Some((hit.fixture, hit.fraction));
        // Clip to this hit so only closer fixtures can still report.
        hit.fraction
    });
    let (fixture, fraction) = closest.expect("ray should hit");
    assert_eq!(fixture, fixtures[0]);
    let expected = (2.0 - 0.5 + 1.0) / 11.0;
    assert!((fraction - expected).abs() < 1e-3, "fraction {fraction}");

    // Returning zero stops at the first hit encountered.
    let mut count = 0;
    world.ray_cast(Vec2::new(-1.0, 0.0), Vec2::new(10.0, 0.0), |_| {
        count += 1;
        0.0
    });
    assert_eq!(count, 1);

    // Returning a negative value ignores hits, visiting everything.
    let mut all = Vec::new();
    world.ray_cast(Vec2::new(-1.0, 0.0), Vec2::new(10.0, 0.0), |hit| {
        all.push(hit.fixture);
        -1.0
    });
    assert_eq!(all.len(), 3);
}

#[test]
fn proxies_follow_sleeping_and_moving_bodies() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let ground = world.create_body(RigidBody::new(BodyType::Static)).unwrap();
    world
        .create_fixture(
            ground,
            FixtureDef::new(Shape::edge(Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0)).unwrap()),
        )
        .unwrap();
    let body = world
        .create_body(
            RigidBody::builder()
                .body_type(BodyType::Dynamic)
                .position(Vec2::new(0.0, 5.0))
                .build(),
        )
        .unwrap();
    let fixture = world
        .create_fixture(body, FixtureDef::new(Shape::circle(0.5).unwrap()).density(1.0))
        .unwrap();

    let conf = StepConf::default();
    for _ in 0..90 {
        world.step(&conf).unwrap();
    }

    // The leaf's fat AABB must still contain the tight AABB at the body's
    // final transform.
    let xf = world.body(body).unwrap().transform();
    let shape = world.fixture(fixture).unwrap().shape().clone();
    let tight = shape.compute_aabb(&xf, 0);
    let proxy = world.fixture(fixture).unwrap().proxies()[0];
    let fat = world.fat_aabb(proxy);
    assert!(fat.contains(&tight), "fat {fat:?} vs tight {tight:?}");
}

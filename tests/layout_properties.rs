use kryon_core::{Anchor, Axis, OrientationGate};
use kryon_layout::{
    AspectConfig, DistanceConfig, ElementDesc, Layer, ProportionConfig, Target,
};
use kryon_solver::{expression, ConstraintHandle, Priority, Relation, Solver};
use proptest::prelude::*;

const TOLERANCE: f32 = 1.0e-2;

fn near(actual: f32, expected: f32) -> bool {
    (actual - expected).abs() <= TOLERANCE * expected.abs().max(1.0)
}

proptest! {
    #[test]
    fn distance_holds_for_any_sign(
        distance in -2000.0f64..2000.0,
        a_x in -500.0f32..500.0,
        b_x in -500.0f32..500.0,
    ) {
        let mut layer = Layer::new(1000.0, 800.0).unwrap();
        let a = layer
            .create_element_with(ElementDesc::new("a").with_position(a_x, 0.0).with_size(50.0, 50.0))
            .unwrap();
        let b = layer
            .create_element_with(ElementDesc::new("b").with_position(b_x, 0.0).with_size(50.0, 50.0))
            .unwrap();

        layer
            .add_distance(Axis::Horizontal, a, b, DistanceConfig::new(distance))
            .unwrap();

        let gap = layer.rect(b).unwrap().position.x - layer.rect(a).unwrap().position.x;
        prop_assert!(near(gap, distance as f32), "gap {} for distance {}", gap, distance);
    }

    #[test]
    fn aspect_survives_resize(
        aspect in 0.1f64..10.0,
        width in 100.0f64..4000.0,
        height in 100.0f64..4000.0,
        next_width in 100.0f64..4000.0,
        next_height in 100.0f64..4000.0,
    ) {
        let mut layer = Layer::new(width, height).unwrap();
        let image = layer.create_element("image");
        layer
            .add_proportion(Axis::Horizontal, Target::Layer, image, ProportionConfig::new(0.5))
            .unwrap();
        layer.add_aspect(image, AspectConfig::new(aspect)).unwrap();

        for _ in 0..2 {
            let size = layer.rect(image).unwrap().size;
            prop_assert!(near(size.x / size.y, aspect as f32), "{}x{} for {}", size.x, size.y, aspect);
            layer.set_size(next_width, next_height).unwrap();
        }
    }

    #[test]
    fn proportion_inequality_is_tight(
        proportion in 0.05f64..2.0,
        width in 100.0f64..2000.0,
        preferred in 0.0f32..4000.0,
    ) {
        let config = ProportionConfig::new(proportion).with_relation(Relation::GreaterOrEqual);

        let mut free = Layer::new(width, 600.0).unwrap();
        let panel = free.create_element("panel");
        free.add_proportion(Axis::Horizontal, Target::Layer, panel, config.clone()).unwrap();
        let resolved = free.rect(panel).unwrap().size.x;
        prop_assert!(near(resolved, (width * proportion) as f32));

        let mut pulled = Layer::new(width, 600.0).unwrap();
        let panel = pulled
            .create_element_with(ElementDesc::new("panel").with_size(preferred, 10.0))
            .unwrap();
        pulled.add_proportion(Axis::Horizontal, Target::Layer, panel, config).unwrap();
        let resolved = pulled.rect(panel).unwrap().size.x;
        let bound = (width * proportion) as f32;
        prop_assert!(resolved >= bound - TOLERANCE);
        prop_assert!(near(resolved, bound.max(preferred)));
    }

    #[test]
    fn rebuild_reaches_the_same_optimum(
        offsets in prop::collection::vec(-500.0f64..500.0, 3),
        soft in prop::collection::vec((0usize..4, -1000.0f64..1000.0, 0usize..3, 0usize..3), 1..12),
        edits in prop::collection::vec((0usize..4, 0usize..12, -1000.0f64..1000.0, 0usize..3), 0..12),
    ) {
        let mut solver = Solver::new();
        let variables: Vec<_> = (0..4).map(|i| solver.new_variable(format!("v{}", i))).collect();

        for (i, offset) in offsets.iter().enumerate() {
            solver
                .create_constraint(
                    variables[i + 1] - variables[i],
                    expression::constant(*offset),
                    Relation::Equal,
                    Priority::Required,
                    true,
                )
                .unwrap();
        }

        let priorities = [Priority::Weak, Priority::Medium, Priority::Strong];
        let relations = [Relation::Equal, Relation::LessOrEqual, Relation::GreaterOrEqual];
        let mut handles = Vec::new();
        for (variable, value, priority, relation) in &soft {
            handles.push(
                solver
                    .create_constraint(
                        variables[*variable].into(),
                        expression::constant(*value),
                        relations[*relation],
                        priorities[*priority],
                        true,
                    )
                    .unwrap(),
            );
        }

        // Soft constraints never make the set unsatisfiable, so every edit succeeds
        for (kind, target, value, choice) in edits {
            let handle = handles[target % handles.len()];
            match kind {
                0 => {
                    let enabled = solver.constraint(handle).unwrap().is_enabled();
                    solver.set_constraint_enabled(handle, !enabled).unwrap();
                }
                1 => solver.set_constraint_priority(handle, priorities[choice]).unwrap(),
                2 => solver.set_constraint_rhs(handle, expression::constant(value)).unwrap(),
                _ => solver.set_constraint_relation(handle, relations[choice]).unwrap(),
            }
        }

        let incremental = tier_errors(&solver, &handles);
        let values: Vec<f64> = variables.iter().map(|v| solver.value(*v).unwrap()).collect();
        solver.rebuild().unwrap();
        let rebuilt = tier_errors(&solver, &handles);

        for (a, b) in incremental.iter().zip(&rebuilt) {
            prop_assert!((a - b).abs() < 1.0e-6 * a.abs().max(1.0), "{:?} vs {:?}", incremental, rebuilt);
        }
        for (variable, before) in variables.iter().zip(&values) {
            let after = solver.value(*variable).unwrap();
            prop_assert!((after - before).abs() < 1.0e-6 * before.abs().max(1.0), "{} vs {}", before, after);
        }
    }
}

/// Total violation of the enabled soft constraints, strongest tier first
fn tier_errors(solver: &Solver, handles: &[ConstraintHandle]) -> [f64; 3] {
    let mut errors = [0.0; 3];
    for &handle in handles {
        let constraint = solver.constraint(handle).unwrap();
        if !constraint.is_enabled() {
            continue;
        }
        let lhs = solver.evaluate(constraint.lhs()).unwrap();
        let rhs = solver.evaluate(constraint.rhs()).unwrap();
        let violation = match constraint.relation() {
            Relation::Equal => (lhs - rhs).abs(),
            Relation::LessOrEqual => (lhs - rhs).max(0.0),
            Relation::GreaterOrEqual => (rhs - lhs).max(0.0),
        };
        let tier = match constraint.priority() {
            Priority::Strong => 0,
            Priority::Medium => 1,
            _ => 2,
        };
        errors[tier] += violation;
    }
    errors
}

#[test]
fn orientation_toggle_restores_geometry_exactly() {
    let mut layer = Layer::new(1000.0, 2000.0).unwrap();
    let panel = layer.create_element("panel");

    let portrait = DistanceConfig::new(64.0).with_orientation(OrientationGate::VERTICAL);
    let landscape = DistanceConfig::new(512.0).with_orientation(OrientationGate::HORIZONTAL);
    let x = layer
        .add_distance(Axis::Horizontal, Target::Layer, panel, portrait.clone())
        .unwrap();
    let y = layer
        .add_distance(Axis::Horizontal, Target::Layer, panel, landscape)
        .unwrap();
    layer
        .add_proportion(
            Axis::Horizontal,
            Target::Layer,
            panel,
            ProportionConfig::new(0.25).with_orientation(OrientationGate::VERTICAL),
        )
        .unwrap();
    layer
        .add_proportion(
            Axis::Vertical,
            Target::Layer,
            panel,
            ProportionConfig::new(0.125),
        )
        .unwrap();
    layer
        .add_distance(
            Axis::Vertical,
            Target::Layer,
            panel,
            portrait.with_anchors(Anchor::END, Anchor::END),
        )
        .unwrap();

    let before = layer.snapshot().unwrap();
    let derivations = layer.derivations();

    layer.set_size(2000.0, 1000.0).unwrap();
    assert_eq!(layer.derivations(), derivations + 1);
    assert!(!layer.is_relationship_active(x).unwrap());
    assert!(layer.is_relationship_active(y).unwrap());
    assert_eq!(layer.rect(panel).unwrap().position.x, 512.0);

    layer.set_size(1000.0, 2000.0).unwrap();
    assert_eq!(layer.derivations(), derivations + 2);
    assert!(layer.is_relationship_active(x).unwrap());
    assert_eq!(layer.snapshot().unwrap(), before);
    assert_eq!(layer.rect(panel).unwrap().position.x, 64.0);
}

#[test]
fn destroy_and_recreate_reproduces_geometry() {
    let mut layer = Layer::new(1200.0, 800.0).unwrap();
    let sidebar = layer
        .create_element_with(ElementDesc::new("sidebar").with_size(200.0, 100.0))
        .unwrap();
    let content = layer.create_element("content");

    layer
        .add_distance(Axis::Horizontal, Target::Layer, sidebar, DistanceConfig::new(0.0))
        .unwrap();
    let gap = DistanceConfig::new(24.0).with_anchors(Anchor::END, Anchor::START);
    let id = layer
        .add_distance(Axis::Horizontal, sidebar, content, gap.clone())
        .unwrap();
    layer
        .add_distance(
            Axis::Horizontal,
            content,
            Target::Layer,
            DistanceConfig::new(0.0).with_anchors(Anchor::END, Anchor::END),
        )
        .unwrap();

    let before = layer.snapshot().unwrap();
    assert_eq!(before.rect(content).unwrap().size.x, 976.0);

    assert!(layer.destroy_relationship(id).unwrap());
    assert!(!layer.destroy_relationship(id).unwrap());
    layer
        .add_distance(Axis::Horizontal, sidebar, content, gap)
        .unwrap();

    assert_eq!(layer.snapshot().unwrap(), before);
}

#[test]
fn required_conflict_and_weak_demotion() {
    let mut layer = Layer::new(800.0, 600.0).unwrap();
    let panel = layer.create_element("panel");
    layer
        .add_distance(Axis::Horizontal, Target::Layer, panel, DistanceConfig::new(100.0))
        .unwrap();

    let err = layer
        .add_distance(Axis::Horizontal, Target::Layer, panel, DistanceConfig::new(300.0))
        .unwrap_err();
    assert!(err.is_unsatisfiable());
    assert_eq!(layer.relationships().count(), 1);

    layer
        .add_distance(
            Axis::Horizontal,
            Target::Layer,
            panel,
            DistanceConfig::new(300.0).with_priority(Priority::Weak),
        )
        .unwrap();
    assert_eq!(layer.rect(panel).unwrap().position.x, 100.0);
}

#[test]
fn directional_required_conflict_is_reported() {
    let mut layer = Layer::new(800.0, 600.0).unwrap();
    let panel = layer.create_element("panel");
    layer
        .add_proportion(
            Axis::Horizontal,
            Target::Layer,
            panel,
            ProportionConfig::new(0.5).with_relation(Relation::LessOrEqual),
        )
        .unwrap();

    let err = layer
        .add_proportion(
            Axis::Horizontal,
            Target::Layer,
            panel,
            ProportionConfig::new(0.75).with_relation(Relation::GreaterOrEqual),
        )
        .unwrap_err();
    assert!(err.is_unsatisfiable());
    assert!(layer.rect(panel).unwrap().size.x <= 400.0 + 1.0e-3);
}

#[test]
fn enabling_twice_matches_enabling_once() {
    let mut layer = Layer::new(800.0, 600.0).unwrap();
    let panel = layer.create_element("panel");
    let id = layer
        .add_distance(
            Axis::Vertical,
            Target::Layer,
            panel,
            DistanceConfig::new(42.0).with_enabled(false),
        )
        .unwrap();
    assert!(!layer.is_relationship_active(id).unwrap());

    layer.relationship_mut(id).unwrap().set_enabled(true).unwrap();
    let once = layer.snapshot().unwrap();
    let derivations = layer.derivations();

    layer.relationship_mut(id).unwrap().set_enabled(true).unwrap();
    assert_eq!(layer.snapshot().unwrap(), once);
    assert_eq!(layer.derivations(), derivations);
    assert_eq!(once.rect(panel).unwrap().position.y, 42.0);
}

#[test]
fn reenabled_relationship_keeps_its_tie() {
    let mut layer = Layer::new(800.0, 600.0).unwrap();
    let panel = layer.create_element("panel");
    let medium = |distance| DistanceConfig::new(distance).with_priority(Priority::Medium);
    let first = layer
        .add_distance(Axis::Horizontal, Target::Layer, panel, medium(10.0))
        .unwrap();
    layer
        .add_distance(Axis::Horizontal, Target::Layer, panel, medium(30.0))
        .unwrap();
    assert_eq!(layer.rect(panel).unwrap().position.x, 10.0);

    layer.relationship_mut(first).unwrap().set_enabled(false).unwrap();
    assert_eq!(layer.rect(panel).unwrap().position.x, 30.0);
    layer.relationship_mut(first).unwrap().set_enabled(true).unwrap();
    assert_eq!(layer.rect(panel).unwrap().position.x, 10.0);

    layer.set_size(900.0, 600.0).unwrap();
    assert_eq!(layer.rect(panel).unwrap().position.x, 10.0);
}

#[test]
fn soft_priority_edits_follow_the_new_tier() {
    let mut layer = Layer::new(800.0, 600.0).unwrap();
    let panel = layer.create_element("panel");
    let a = layer
        .add_distance(
            Axis::Horizontal,
            Target::Layer,
            panel,
            DistanceConfig::new(10.0).with_priority(Priority::Medium),
        )
        .unwrap();
    layer
        .add_distance(
            Axis::Horizontal,
            Target::Layer,
            panel,
            DistanceConfig::new(30.0).with_priority(Priority::Strong),
        )
        .unwrap();
    assert_eq!(layer.rect(panel).unwrap().position.x, 30.0);

    let steps = [
        (Priority::Strong, 10.0),
        (Priority::Weak, 30.0),
        (Priority::Strong, 10.0),
        (Priority::Medium, 30.0),
    ];
    for (priority, expected) in steps {
        layer.relationship_mut(a).unwrap().set_priority(priority).unwrap();
        assert_eq!(layer.relationship(a).unwrap().priority(), priority);
        assert_eq!(layer.rect(panel).unwrap().position.x, expected, "{}", priority);
    }
}

//! Integration tests: the full control cycle against simulated joints.
//!
//! Every test drives `ControlCycle::update` with `SimJoint` handles and the
//! HyQ preset, feeding inputs through the public ports.

use approx::assert_relative_eq;
use nalgebra::Vector3;
use rand::Rng;

use stance_control::{
    ControlCycle, ControllerConfig, InputPorts, NullSink, SolveFailurePolicy, TelemetrySink,
    input_channels, jacobian_transpose_torques, telemetry_channel,
};
use stance_core::{
    ControllerMode, JointGain, JointMeasurement, Leg, N_JOINTS, N_LEGS,
};
use stance_test_utils::{
    GRAVITY, SimJoint, hyq_joint_names, hyq_model, seeded_rng, sim_joints, standing_body,
};

struct Rig {
    cycle: ControlCycle<SimJoint>,
    ports: InputPorts,
    joints: Vec<SimJoint>,
}

fn rig(config: &ControllerConfig, sink: Box<dyn TelemetrySink>) -> Rig {
    let names = hyq_joint_names();
    let name_refs: [&str; N_JOINTS] = std::array::from_fn(|i| names[i].as_str());
    let gains = config.initial_gains(&name_refs).unwrap();
    let (ports, inputs) = input_channels(&name_refs, gains, standing_body());

    let joints = sim_joints(&names);
    let cycle = ControlCycle::new(config, joints.clone(), inputs, sink).unwrap();
    Rig {
        cycle,
        ports,
        joints,
    }
}

/// Standing foot equal to the zero-configuration foot position of each leg.
fn home_pose_config() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    let home = hyq_model().evaluate(&JointMeasurement::zeros());
    for (slot, frame) in config.vsd.standing_foot.iter_mut().zip(&home.frames) {
        *slot = frame.foot_position.into();
    }
    config
}

#[test]
fn settling_at_home_pose_outputs_gravity_feedforward() {
    let config = home_pose_config();
    let mut rig = rig(&config, Box::new(NullSink));

    let report = rig.cycle.update();
    assert_eq!(report.mode, ControllerMode::Settling);
    assert!(!report.solve_failed);

    let home = hyq_model().evaluate(&JointMeasurement::zeros());
    for leg in Leg::ALL {
        let i = leg.index();
        assert_eq!(report.forces[leg], home.dynamics[i].gravity, "leg {leg}");

        let expected = jacobian_transpose_torques(&home.frames[i].jacobian, &home.dynamics[i].gravity);
        assert_relative_eq!(report.torques.leg(leg), expected, epsilon = 1e-12);
    }
    for (joint, tau) in rig.joints.iter().zip(report.torques.0) {
        assert_eq!(joint.command(), tau);
    }
}

#[test]
fn switches_to_balancing_exactly_once_at_threshold() {
    let mut config = ControllerConfig::default();
    config.control.settle_cycles = 20;
    let mut rig = rig(&config, Box::new(NullSink));

    let mut transitions = Vec::new();
    for k in 0..40 {
        let report = rig.cycle.update();
        if report.transitioned {
            transitions.push(k);
        }
        let expected = if k < 20 {
            ControllerMode::Settling
        } else {
            ControllerMode::Balancing
        };
        assert_eq!(report.mode, expected, "cycle {k}");
        assert!(!report.solve_failed, "cycle {k}");
    }
    assert_eq!(transitions, vec![20]);
    assert_eq!(rig.cycle.arbiter().transitioned_at(), Some(20));
    assert_eq!(rig.cycle.counters().solve_failures, 0);
    assert!(rig.cycle.counters().last_solve_us.is_some());
}

#[test]
fn balancing_at_rest_supports_body_weight() {
    let mut config = ControllerConfig::default();
    config.control.settle_cycles = 0;
    let mut rig = rig(&config, Box::new(NullSink));

    let report = rig.cycle.update();
    assert!(report.transitioned);
    assert_eq!(report.mode, ControllerMode::Balancing);

    // Feet push down on the ground with the body weight in total.
    let weight = config.body.mass * GRAVITY;
    assert_relative_eq!(report.forces.total().z, -weight, max_relative = 0.02);
    for f in report.forces.iter() {
        assert!(f.z < 0.0);
    }
}

#[test]
fn torques_never_exceed_effort_limits() {
    let mut config = ControllerConfig::default();
    config.vsd.stiffness = [[50_000.0; 3]; N_LEGS];
    let mut rig = rig(&config, Box::new(NullSink));
    let limits = rig.cycle.model().effort_limits();
    let mut rng = seeded_rng(3);

    for _ in 0..100 {
        for joint in &rig.joints {
            joint.set_state(rng.gen_range(-1.5..1.5), rng.gen_range(-10.0..10.0));
        }
        let report = rig.cycle.update();
        for (tau, limit) in report.torques.0.iter().zip(&limits) {
            assert!(tau.abs() <= *limit, "{tau} exceeds {limit}");
        }
    }
    assert!(rig.cycle.counters().saturation_events > 0);
}

#[test]
fn inputs_are_snapshotted_once_per_cycle() {
    let config = ControllerConfig::default();
    let mut rig = rig(&config, Box::new(NullSink));
    let names = hyq_joint_names();

    let first = rig.cycle.update();
    assert_eq!(first.input_versions, [0; 7]);

    rig.ports.command.submit(&[0.5; N_JOINTS]).unwrap();
    rig.ports.command.submit(&[0.5; 3]).unwrap_err();
    let gain = JointGain { p: 300.0, d: 8.0 };
    rig.ports.gains.update(&[(names[11].as_str(), gain)]).unwrap();
    rig.ports.contacts[2].submit_force(&Vector3::new(0.0, 0.0, 2.0));

    let second = rig.cycle.update();
    assert_eq!(second.input_versions, [1, 1, 0, 0, 0, 1, 0]);
    assert_eq!(rig.cycle.active_command().0, [0.5; N_JOINTS]);
    assert_eq!(rig.cycle.active_gains().0[11], gain);
}

#[test]
fn solve_failure_holds_last_force() {
    let mut config = ControllerConfig::default();
    config.control.settle_cycles = 0;
    config.control.failure_policy = SolveFailurePolicy::HoldLastForce;
    let mut rig = rig(&config, Box::new(NullSink));

    let good = rig.cycle.update();
    assert!(!good.solve_failed);

    let mut body = standing_body();
    body.angular_velocity.x = f64::NAN;
    rig.ports.body.submit(body);
    let failed = rig.cycle.update();

    assert!(failed.solve_failed);
    assert_eq!(failed.mode, ControllerMode::Balancing);
    assert_eq!(failed.forces, good.forces);
    assert!(failed.torques.0.iter().all(|t| t.is_finite()));
    assert_eq!(rig.cycle.counters().solve_failures, 1);

    rig.ports.body.submit(standing_body());
    assert!(!rig.cycle.update().solve_failed);
}

#[test]
fn solve_failure_can_fall_back_to_settling() {
    let mut config = home_pose_config();
    config.control.settle_cycles = 0;
    config.control.failure_policy = SolveFailurePolicy::FallBackToSettling;
    let mut rig = rig(&config, Box::new(NullSink));

    let mut body = standing_body();
    body.position.z = f64::INFINITY;
    rig.ports.body.submit(body);
    let report = rig.cycle.update();

    assert!(report.solve_failed);
    let home = hyq_model().evaluate(&JointMeasurement::zeros());
    for leg in Leg::ALL {
        assert_eq!(report.forces[leg], home.dynamics[leg.index()].gravity);
    }
}

#[test]
fn telemetry_is_decimated() {
    let mut config = ControllerConfig::default();
    config.control.settle_cycles = 5;
    config.control.telemetry_divisor = 4;
    let (sink, reader) = telemetry_channel();
    let mut rig = rig(&config, Box::new(sink));

    let mut seen = Vec::new();
    for _ in 0..13 {
        rig.cycle.update();
        let snap = reader.read();
        if let Some(sample) = snap.as_ref() {
            if seen.last() != Some(&sample.cycle) {
                seen.push(sample.cycle);
            }
        }
    }
    assert_eq!(seen, vec![0, 4, 8, 12]);
    assert_eq!(rig.cycle.telemetry().published(), 4);

    let last = reader.read();
    let sample = last.as_ref().unwrap();
    assert_eq!(sample.mode, ControllerMode::Balancing);
    assert!(sample.reaction_forces.is_some());
}

#[test]
fn concurrent_body_updates_do_not_disturb_the_cycle() {
    let mut config = ControllerConfig::default();
    config.control.settle_cycles = 10;
    let Rig {
        mut cycle, ports, ..
    } = rig(&config, Box::new(NullSink));

    let InputPorts { mut body, .. } = ports;
    let feeder = std::thread::spawn(move || {
        for k in 0..2000 {
            let mut state = standing_body();
            state.position.x = f64::from(k) * 1e-6;
            body.submit(state);
        }
    });

    let mut last = 0;
    for _ in 0..30 {
        let report = cycle.update();
        assert!(!report.solve_failed);
        let version = report.input_versions[2];
        assert!(version >= last);
        last = version;
    }
    feeder.join().unwrap();
}

use std::sync::Arc;

use ampc_control::{
    neural::{ApproxPolicy, Sample, Trainer},
    BoundedPolicy, LqrPolicy,
};
use ampc_core::{
    settings::{
        LoopSettings, SamplerSettings, SamplingMode, SimulatorSettings,
        TrainerSettings,
    },
    Bounds, ControlError, State, VarClass,
};
use ampc_executor::{ClosedLoop, Sampler};
use ampc_model::{Cstr, CstrSettings};
use ampc_simulator::{Plant, Simulator, StateFeedback};

fn setup() -> (Cstr, Arc<Bounds>, LqrPolicy) {
    let settings = CstrSettings::default();
    let cstr = Cstr::new(&settings).unwrap();
    let bounds = Arc::new(cstr.bounds(&settings).unwrap());
    let lqr = LqrPolicy::new(&cstr, bounds.clone(), Cstr::lqr_settings()).unwrap();
    (cstr, bounds, lqr)
}

fn simulator() -> Simulator<Cstr> {
    Simulator::new(
        Cstr::new(&CstrSettings::default()).unwrap(),
        SimulatorSettings::default(),
    )
    .unwrap()
}

#[test]
fn random_samples_lie_inside_bounds() {
    let (_, bounds, mut lqr) = setup();
    let sampler = Sampler::new(SamplerSettings {
        n_samples: 40,
        ..Default::default()
    })
    .unwrap();
    let dataset = sampler.sample_random(&mut lqr, &bounds).unwrap();
    assert_eq!(dataset.len(), 40);
    for sample in &dataset.samples {
        assert!(bounds.contains(VarClass::State, &sample.state));
        assert!(bounds.contains(VarClass::Input, &sample.input));
    }

    let again = sampler.sample_random(&mut lqr, &bounds).unwrap();
    assert_eq!(dataset, again);
}

#[test]
fn unbounded_states_cannot_be_sampled() {
    let (_, bounds, mut lqr) = setup();
    let sampler = Sampler::new(SamplerSettings::default()).unwrap();
    let unbounded = Bounds::unbounded(bounds.variables().clone());
    assert!(matches!(
        sampler.sample_random(&mut lqr, &unbounded),
        Err(ControlError::UnboundedSampling(_))
    ));
}

#[test_log::test]
fn closed_loop_sampling_truncates_to_n_samples() {
    let (_, bounds, mut lqr) = setup();
    let sampler = Sampler::new(SamplerSettings {
        mode: SamplingMode::ClosedLoop,
        n_samples: 25,
        trajectory_length: 10,
        seed: 3,
    })
    .unwrap();
    let mut sim = simulator();
    let mut estimator = StateFeedback::new(4);
    let dataset = sampler
        .sample(&mut lqr, &mut sim, &mut estimator, &bounds)
        .unwrap();
    assert_eq!(dataset.len(), 25);
    // consecutive samples within a rollout are linked through the plant
    assert_eq!(dataset.samples[1].state, step_once(&dataset.samples[0]));
}

/// State after applying the sample's input for one step.
fn step_once(sample: &Sample) -> State {
    let mut sim = simulator();
    sim.set_initial_state(&sample.state).unwrap();
    sim.step(&sample.input).unwrap()
}

#[test_log::test]
fn approximate_controller_from_sampled_data() {
    let (_, bounds, mut lqr) = setup();
    let sampler = Sampler::new(SamplerSettings {
        n_samples: 60,
        ..Default::default()
    })
    .unwrap();
    let dataset = sampler.sample_random(&mut lqr, &bounds).unwrap();

    let trainer = Trainer::new(TrainerSettings {
        epochs: 100,
        neurons: 10,
        ..Default::default()
    })
    .unwrap();
    let (parameters, history) = trainer.train(&dataset, &bounds).unwrap();
    assert_eq!(history.epochs(), 100);
    assert!(history.final_loss().unwrap() < history.loss[0]);

    let approx = ApproxPolicy::new(parameters, bounds.clone()).unwrap();
    let mut closed_loop = ClosedLoop::new(
        approx,
        simulator(),
        StateFeedback::new(4),
        LoopSettings {
            n_steps: 10,
            clip_to_bounds: true,
        },
    )
    .unwrap();
    let x0 = CstrSettings::default().initial_state();
    let trajectory = closed_loop.run(&x0).unwrap();
    assert_eq!(trajectory.len(), 10);
    assert!(trajectory.input_violations(&bounds).is_empty());
    assert_eq!(closed_loop.policy().dimensions(), (4, 2));
}

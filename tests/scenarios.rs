use std::sync::Arc;

use signal_grid::control_system::deliberation::{Desire, Intention};
use signal_grid::control_system::traffic_light_controller::{
    apply_safety_mask, TickOutcome, TrafficLightController,
};
use signal_grid::global_variables::{FIXED_CYCLE_TICKS, ROAD_CAPACITY};
use signal_grid::learning::{encode_state, QLearningPolicy, RlAction};
use signal_grid::simulation_engine::grid::NodeSetup;
use signal_grid::simulation_engine::intersections::{
    lock_state, Direction, IntersectionId, IntersectionState,
};
use signal_grid::simulation_engine::registry::{Admission, ControlMode, Registry};

fn quiet_registry(mode: ControlMode) -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    registry.set_mode(mode);
    registry.set_traffic_params(0, 0);
    registry.set_running(true);
    registry
}

fn controller(registry: &Arc<Registry>, id: IntersectionId, south: Option<IntersectionId>, east: Option<IntersectionId>) -> TrafficLightController {
    let setup = NodeSetup {
        id,
        coordinates: (0, 0),
        south,
        east,
    };
    TrafficLightController::seeded(Arc::clone(registry), &setup, 7)
}

#[test]
fn capacity_holds_for_any_admission_sequence() {
    let mut node = IntersectionState::new(IntersectionId(1, 1), (0, 0));
    for amount in [5, 5, 5, 4, 2, 1, 3, 1, 20, 0] {
        let before = node.real_queue_ew();
        let accepted = node.admit(Direction::EastWest, amount);
        assert!(node.real_queue_ew() <= ROAD_CAPACITY);
        if !accepted {
            assert_eq!(node.real_queue_ew(), before);
        }
    }
    assert_eq!(node.real_queue_ew(), ROAD_CAPACITY);
}

#[test]
fn backpressure_conserves_cars() {
    let registry = Registry::new();
    let (upstream_id, downstream_id) = (IntersectionId(1, 0), IntersectionId(2, 0));
    let (upstream, _up_inbox) = registry.register(IntersectionState::new(upstream_id, (0, 0)));
    let (downstream, _down_inbox) = registry.register(IntersectionState::new(downstream_id, (0, 0)));
    assert!(lock_state(&upstream).admit(Direction::NorthSouth, 20));
    assert!(lock_state(&downstream).admit(Direction::NorthSouth, 19));

    let mut exited = 0;
    let mut refusals = 0;
    for tick in 0..60 {
        let moved = lock_state(&upstream).step();
        if moved > 0 {
            match registry.admit(downstream_id, Direction::NorthSouth, moved) {
                Admission::Accepted => {}
                Admission::Refused => {
                    refusals += 1;
                    lock_state(&upstream).restore(Direction::NorthSouth, moved);
                }
                Admission::Exited => unreachable!(),
            }
        }
        if tick % 3 == 0 {
            exited += lock_state(&downstream).step();
        }
        let in_grid = lock_state(&upstream).total_queue() + lock_state(&downstream).total_queue();
        assert_eq!(in_grid + exited, 39);
    }
    assert!(refusals > 0);
    assert!(exited > 0);
}

#[test]
fn encoder_bucket_boundaries() {
    assert_eq!(encode_state(0, 0, false) >> 3, 0);
    assert_eq!(encode_state(6, 0, false) >> 3, 1);
    assert_eq!(encode_state(7, 0, false) >> 3, 2);
    assert_eq!(encode_state(16, 0, false) >> 3, 3);
    assert_eq!(encode_state(0, 7, true), 0b00101);
    assert_eq!(encode_state(16, 16, true), 31);
}

#[test]
fn repeated_q_updates_converge_monotonically() {
    let mut policy = QLearningPolicy::seeded(3);
    let mut single = Vec::new();
    let mut whole_row = Vec::new();
    for _ in 0..600 {
        policy.update(0, RlAction::Switch, -5.0, 0);
        single.push(policy.table().value(0, RlAction::Switch));
        for action in RlAction::ALL {
            policy.update(1, action, -5.0, 1);
        }
        whole_row.push(policy.table().value(1, RlAction::Switch));
    }
    assert!(single.windows(2).all(|w| w[1] <= w[0] + 1e-12));
    assert!(whole_row.windows(2).all(|w| w[1] <= w[0] + 1e-12));
    assert!((single[single.len() - 1] + 5.0).abs() < 1e-6);
    assert!((whole_row[whole_row.len() - 1] + 25.0).abs() < 1e-6);
}

#[test]
fn safety_mask_blocks_unsafe_actions() {
    for action in RlAction::ALL {
        assert_ne!(apply_safety_mask(action, false, 5), RlAction::HoldLong);
        assert_ne!(apply_safety_mask(action, true, 31), RlAction::Switch);
    }
}

#[test]
fn ambulance_clears_its_approach_in_one_step() {
    let mut node = IntersectionState::new(IntersectionId(0, 1), (0, 0));
    assert!(node.admit(Direction::NorthSouth, 2));
    node.add_ambulance();
    assert_eq!(node.real_queue_ns(), 3);
    assert!(node.has_ambulance());
    assert_eq!(node.step(), 3);
    assert_eq!(node.real_queue_ns(), 0);
    assert!(!node.has_ambulance());
}

#[test]
fn ambulance_is_handed_south_and_the_trip_ends_at_the_edge() {
    let registry = quiet_registry(ControlMode::FixedCycle);
    let (entry, exit) = (IntersectionId(0, 1), IntersectionId(1, 1));
    let mut first = controller(&registry, entry, Some(exit), None);
    let mut second = controller(&registry, exit, None, None);

    registry.start_ambulance_timer();
    assert!(registry.spawn_ambulance(entry));
    first.tick().unwrap();

    let node = registry.intersection(exit).unwrap();
    {
        let state = lock_state(&node);
        assert!(state.has_ambulance());
        // The ambulance plus the car it pushed through.
        assert!(state.real_queue_ns() >= 2);
    }
    assert!(registry.ambulance_timer_running());

    second.tick().unwrap();
    assert!(!lock_state(&node).has_ambulance());
    assert!(!registry.ambulance_timer_running());
    assert!(registry.ambulance_trip().is_some());
}

#[test]
fn faulted_node_runs_the_fixed_cycle() {
    let registry = quiet_registry(ControlMode::Stigmergy);
    let id = IntersectionId(0, 2);
    let mut controller = controller(&registry, id, None, None);
    assert!(registry.toggle_sensor_fault(id));

    let mut switches = Vec::new();
    for tick in 1..=(FIXED_CYCLE_TICKS + 1) {
        match controller.tick().unwrap() {
            TickOutcome::Advanced {
                desire, intention, ..
            } => {
                assert_eq!(desire, Some(Desire::FailSafe));
                if intention == Intention::SwitchPhase {
                    switches.push(tick);
                }
            }
            TickOutcome::Idle => panic!("controller should be running"),
        }
    }
    assert_eq!(switches, vec![1, FIXED_CYCLE_TICKS + 1]);
    assert_eq!(registry.telemetry(id).unwrap().queue_ns, -1);
}

#[test]
fn fixed_cycle_switches_once_in_fifteen_ticks() {
    let registry = quiet_registry(ControlMode::FixedCycle);
    let id = IntersectionId(0, 0);
    let mut controller = controller(&registry, id, Some(IntersectionId(1, 0)), None);
    {
        let node = registry.intersection(id).unwrap();
        assert!(lock_state(&node).admit(Direction::NorthSouth, 5));
    }

    let mut switches = 0;
    for _ in 0..FIXED_CYCLE_TICKS {
        if let TickOutcome::Advanced {
            intention: Intention::SwitchPhase,
            ..
        } = controller.tick().unwrap()
        {
            switches += 1;
        }
    }
    assert_eq!(switches, 1);
    let telemetry = registry.telemetry(id).unwrap();
    assert_eq!(telemetry.queue_ns, 4);
    assert!(!telemetry.green_ns);
    assert_eq!(telemetry.total_passed, 1);
}

#[test]
fn green_wave_notifies_the_eastern_neighbour() {
    let registry = quiet_registry(ControlMode::GreenWave);
    registry.set_yellow_penalty(false);
    let (west, east) = (IntersectionId(0, 0), IntersectionId(0, 1));
    let mut sender = controller(&registry, west, None, Some(east));
    let mut receiver = controller(&registry, east, None, None);
    {
        let node = registry.intersection(west).unwrap();
        let mut state = lock_state(&node);
        state.switch_phase(false);
        assert!(state.admit(Direction::EastWest, 3));
    }

    sender.tick().unwrap();
    assert_eq!(registry.telemetry(east).unwrap().queue_ew, 1);

    let outcome = receiver.tick().unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Advanced {
            desire: Some(Desire::PrepareGreenWave),
            intention: Intention::SwitchPhase,
            cars_passed: 0,
        }
    );
    assert!(!receiver.beliefs().green_wave_incoming);
}

#[test]
fn refused_cars_stay_upstream() {
    let registry = quiet_registry(ControlMode::FixedCycle);
    let (west, east) = (IntersectionId(0, 0), IntersectionId(0, 1));
    let mut sender = controller(&registry, west, None, Some(east));
    let _receiver = controller(&registry, east, None, None);
    {
        let node = registry.intersection(west).unwrap();
        let mut state = lock_state(&node);
        state.switch_phase(false);
        assert!(state.admit(Direction::EastWest, 3));
        let target = registry.intersection(east).unwrap();
        assert!(lock_state(&target).admit(Direction::EastWest, ROAD_CAPACITY));
    }

    sender.tick().unwrap();
    assert_eq!(registry.telemetry(west).unwrap().queue_ew, 3);
    assert_eq!(registry.telemetry(east).unwrap().queue_ew, ROAD_CAPACITY as i32);
}

#[test]
fn congested_neighbour_pheromone_pulls_the_phase_green() {
    let registry = quiet_registry(ControlMode::Stigmergy);
    let (west, east) = (IntersectionId(0, 0), IntersectionId(0, 1));
    let (east_node, _east_inbox) = registry.register(IntersectionState::new(east, (0, 1)));
    {
        let mut state = lock_state(&east_node);
        assert!(state.admit(Direction::NorthSouth, ROAD_CAPACITY));
        for _ in 0..6 {
            state.update_pheromone();
        }
        assert_eq!(state.pheromone(), 9.5);
    }

    let mut controller = controller(&registry, west, None, Some(east));
    {
        let node = registry.intersection(west).unwrap();
        let mut state = lock_state(&node);
        state.switch_phase(false);
        assert!(state.admit(Direction::EastWest, 2));
    }

    let outcome = controller.tick().unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Advanced {
            desire: Some(Desire::PreventGridlock),
            intention: Intention::SwitchPhase,
            cars_passed: 1,
        }
    );
    assert_eq!(controller.beliefs().max_neighbor_pheromone, 9.5);
    assert!(registry.telemetry(west).unwrap().green_ns);
    assert_eq!(registry.telemetry(east).unwrap().queue_ew, 1);
}

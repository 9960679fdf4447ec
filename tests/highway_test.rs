//! Highway stepping tests
//!
//! Small hand-built scenarios check single rules; longer seeded runs check
//! that the hard invariants hold for whole runs.

use highway_sim::simulation::{
    Lane, LaneAction, PlacementError, SimConfig, SimHighway, VehicleId, VehicleStatus,
};
use std::collections::HashMap;

/// Empty highway, no random spawns, identical drivers
fn quiet_config() -> SimConfig {
    SimConfig {
        prefill: false,
        spawn_probability: 0.0,
        speed_variance: 0.0,
        check_invariants: true,
        ..Default::default()
    }
}

#[test]
fn test_free_vehicle_leaves_after_twenty_ticks() {
    let config = SimConfig {
        length: 100.0,
        ..quiet_config()
    };
    let mut highway = SimHighway::new(config, 0.0, 1).unwrap();
    let id = highway
        .place_vehicle(Lane::RIGHTMOST, 0.0, 5.0, 5.0, false)
        .unwrap();

    for tick in 1..20u64 {
        let report = highway.step().unwrap();
        assert!(report.despawned.is_empty());
        let car = highway.vehicle(id).expect("vehicle still on the highway");
        assert_eq!(car.position, 5.0 * tick as f64);
        assert_eq!(
            car.status(highway.config().blocked_persistence_threshold),
            VehicleStatus::Normal
        );
    }

    let report = highway.step().unwrap();
    assert_eq!(report.tick, 20);
    assert_eq!(report.despawned, vec![id]);
    assert_eq!(highway.active_count(), 0);
    assert_eq!(highway.vehicles_exited, 1);
    assert!(highway.jam_tick().is_none());
}

/// Single lane with a stalled vehicle and a stopped follower right behind it
fn stalled_pair(config: SimConfig) -> (SimHighway, VehicleId) {
    let mut highway = SimHighway::new(
        SimConfig {
            lane_count: 1,
            ..config
        },
        0.0,
        2,
    )
    .unwrap();
    highway
        .place_vehicle(Lane::RIGHTMOST, 50.0, 0.0, 0.0, false)
        .unwrap();
    let follower = highway
        .place_vehicle(Lane::RIGHTMOST, 49.0, 0.0, 5.0, false)
        .unwrap();
    (highway, follower)
}

#[test]
fn test_follower_behind_stalled_vehicle_becomes_jammed() {
    let (mut highway, follower) = stalled_pair(quiet_config());
    let threshold = highway.config().blocked_persistence_threshold;

    for tick in 1..=100u32 {
        highway.step().unwrap();
        let car = highway.vehicle(follower).unwrap();
        assert_eq!(car.speed, 0.0);
        assert_eq!(car.position, 49.0);
        assert_eq!(car.blocked_ticks, tick);
        if tick > threshold {
            assert_eq!(car.status(threshold), VehicleStatus::Jammed);
        } else {
            assert_eq!(car.status(threshold), VehicleStatus::Blocked);
        }
    }

    // Nothing is ahead of the stalled vehicle, so only the follower jams
    assert!(highway.jam_tick().is_none());
    assert_eq!(highway.jam_detector().peak_jammed, 1);
}

#[test]
fn test_stalled_pair_declares_jam_with_small_cluster() {
    let config = SimConfig {
        blocked_persistence_threshold: 3,
        jam_cluster_size: 1,
        ..quiet_config()
    };
    let (mut highway, follower) = stalled_pair(config);

    let mut declared_at = None;
    for _ in 0..10 {
        let report = highway.step().unwrap();
        if report.jam_declared {
            assert!(declared_at.is_none(), "jam declared twice");
            declared_at = Some(report.tick);
        }
    }
    assert_eq!(declared_at, Some(4));
    assert_eq!(highway.vehicle(follower).unwrap().blocked_ticks, 10);
    assert_eq!(highway.jam_tick(), Some(4));
    assert!(highway.snapshot().jam_declared);
}

#[test]
fn test_slow_vehicle_on_empty_road_is_never_blocked() {
    let config = SimConfig {
        lane_count: 1,
        jam_cluster_size: 1,
        ..quiet_config()
    };
    let mut highway = SimHighway::new(config, 0.0, 2).unwrap();
    let threshold = highway.config().blocked_persistence_threshold;
    // Well under the blocked speed threshold, but this is the driver's own top speed
    let id = highway
        .place_vehicle(Lane::RIGHTMOST, 0.0, 2.0, 2.0, false)
        .unwrap();

    for _ in 0..20 {
        let report = highway.step().unwrap();
        assert_eq!(report.blocked, 0);
        let car = highway.vehicle(id).unwrap();
        assert_eq!(car.speed, 2.0);
        assert_eq!(car.blocked_ticks, 0);
        assert_eq!(car.status(threshold), VehicleStatus::Normal);
    }
    assert!(highway.jam_tick().is_none());
}

#[test]
fn test_spawns_only_when_below_target_and_entry_is_free() {
    let config = SimConfig {
        length: 200.0,
        num_cars: 6,
        spawn_probability: 1.0,
        prefill: false,
        check_invariants: true,
        ..Default::default()
    };
    let clearance = config.spawn_clearance;
    let num_cars = config.num_cars;
    let mut highway = SimHighway::new(config, 0.5, 3).unwrap();

    let mut spawns = 0;
    for _ in 0..400 {
        let report = highway.step().unwrap();
        assert!(highway.active_count() <= num_cars);
        // With probability 1 every eligible tick spawns
        assert_eq!(report.spawned.is_some(), report.spawn_eligible);

        let entry_crowd = highway
            .vehicles()
            .iter()
            .filter(|v| v.lane == Lane::RIGHTMOST && v.position < clearance)
            .count();
        match report.spawned {
            Some(id) => {
                spawns += 1;
                let car = highway.vehicle(id).unwrap();
                assert_eq!(car.lane, Lane::RIGHTMOST);
                assert_eq!(car.position, 0.0);
                assert_eq!(car.speed, car.top_speed);
                assert_eq!(entry_crowd, 1, "spawned into an occupied entry cell");
            }
            None => assert!(
                highway.active_count() == num_cars || entry_crowd > 0,
                "eligible tick without spawn at tick {}",
                report.tick
            ),
        }
    }
    assert!(spawns > num_cars, "vehicles should keep cycling through");
}

#[test]
fn test_zero_spawn_probability_never_spawns() {
    let config = SimConfig {
        spawn_probability: 0.0,
        prefill: true,
        ..Default::default()
    };
    let mut highway = SimHighway::new(config, 0.5, 4).unwrap();
    let initial = highway.active_count();
    assert!(initial > 0);

    let mut previous = initial;
    for _ in 0..300 {
        let report = highway.step().unwrap();
        assert!(report.spawned.is_none());
        assert!(
            highway.active_count() <= previous,
            "active count rose at tick {}",
            report.tick
        );
        previous = highway.active_count();
    }
    assert!(previous < initial, "nobody left the highway");
}

#[test]
fn test_long_run_keeps_hard_invariants() {
    let config = SimConfig {
        check_invariants: true,
        ..Default::default()
    };
    let max_speed = config.max_speed;
    let lane_count = config.lane_count;
    let mut highway = SimHighway::new(config, 0.5, 7).unwrap();

    let mut last_seen: HashMap<_, (f64, Lane)> = HashMap::new();
    let mut lane_changes = 0;
    for _ in 0..600 {
        let report = highway.step().unwrap();
        lane_changes += report.lane_changes;
        for id in &report.despawned {
            last_seen.remove(id);
        }
        for car in highway.vehicles() {
            assert!(car.lane.index() < lane_count);
            assert!(car.speed >= 0.0 && car.speed <= max_speed);
            assert!(car.speed <= car.top_speed);
            if car.is_bad_practice {
                assert_ne!(car.last_action, LaneAction::ReturnRight);
            }
            if let Some(&(position, lane)) = last_seen.get(&car.id) {
                assert!(car.position >= position, "vehicle {} moved backwards", car.id);
                // Left only to overtake, right only to return
                match car.lane.cmp(&lane) {
                    std::cmp::Ordering::Greater => {
                        assert_eq!(car.last_action, LaneAction::Overtake)
                    }
                    std::cmp::Ordering::Less => {
                        assert_eq!(car.last_action, LaneAction::ReturnRight)
                    }
                    std::cmp::Ordering::Equal => {
                        assert_eq!(car.last_action, LaneAction::Hold)
                    }
                }
            }
            last_seen.insert(car.id, (car.position, car.lane));
        }
    }
    assert!(lane_changes > 0, "nobody ever changed lanes");
}

#[test]
fn test_overtake_on_the_left_then_return_right() {
    let config = SimConfig {
        lane_count: 2,
        ..quiet_config()
    };
    let mut highway = SimHighway::new(config, 0.0, 5).unwrap();
    let slow = highway
        .place_vehicle(Lane(0), 110.0, 1.0, 1.0, false)
        .unwrap();
    let fast = highway
        .place_vehicle(Lane(0), 100.0, 5.0, 5.0, false)
        .unwrap();

    let report = highway.step().unwrap();
    assert_eq!(report.lane_changes, 1);
    let car = highway.vehicle(fast).unwrap();
    assert_eq!(car.lane, Lane(1));
    assert_eq!(car.last_action, LaneAction::Overtake);

    let mut returned_at = None;
    for _ in 0..20 {
        highway.step().unwrap();
        let car = highway.vehicle(fast).unwrap();
        if car.lane == Lane(0) {
            assert_eq!(car.last_action, LaneAction::ReturnRight);
            let slow_position = highway.vehicle(slow).unwrap().position;
            assert!(car.position > slow_position, "returned right before passing");
            returned_at = Some(highway.tick_count());
            break;
        }
    }
    assert!(returned_at.is_some(), "disciplined driver never returned right");
}

#[test]
fn test_bad_practice_driver_stays_left_after_overtaking() {
    let config = SimConfig {
        lane_count: 2,
        ..quiet_config()
    };
    let mut highway = SimHighway::new(config, 0.0, 5).unwrap();
    highway
        .place_vehicle(Lane(0), 110.0, 1.0, 1.0, false)
        .unwrap();
    let fast = highway
        .place_vehicle(Lane(0), 100.0, 5.0, 5.0, true)
        .unwrap();

    highway.step().unwrap();
    assert_eq!(highway.vehicle(fast).unwrap().lane, Lane(1));

    for _ in 0..30 {
        highway.step().unwrap();
        if let Some(car) = highway.vehicle(fast) {
            assert_eq!(car.lane, Lane(1));
        }
    }
}

#[test]
fn test_no_return_right_while_behind_slower_leader() {
    let config = SimConfig {
        lane_count: 2,
        ..quiet_config()
    };
    let mut highway = SimHighway::new(config, 0.0, 6).unwrap();
    let leader = highway
        .place_vehicle(Lane(1), 120.0, 1.0, 1.0, true)
        .unwrap();
    let follower = highway
        .place_vehicle(Lane(1), 100.0, 5.0, 5.0, false)
        .unwrap();

    for _ in 0..50 {
        highway.step().unwrap();
        let car = highway.vehicle(follower).unwrap();
        assert_eq!(car.lane, Lane(1), "moved right to pass on the right");
        assert!(car.position < highway.vehicle(leader).unwrap().position);
    }
}

#[test]
fn test_contended_lane_goes_to_lowest_id() {
    let mut highway = SimHighway::new(quiet_config(), 0.0, 8).unwrap();
    // Wants to overtake into lane 1
    let first = highway
        .place_vehicle(Lane(0), 100.0, 5.0, 5.0, false)
        .unwrap();
    // Wants to return right into lane 1 at almost the same spot
    let second = highway
        .place_vehicle(Lane(2), 102.0, 5.0, 5.0, false)
        .unwrap();
    highway
        .place_vehicle(Lane(0), 105.0, 1.0, 1.0, false)
        .unwrap();

    let report = highway.step().unwrap();
    assert_eq!(report.lane_changes, 1);
    assert_eq!(report.denied_lane_changes, 1);

    let winner = highway.vehicle(first).unwrap();
    assert_eq!(winner.lane, Lane(1));
    assert_eq!(winner.last_action, LaneAction::Overtake);

    let loser = highway.vehicle(second).unwrap();
    assert_eq!(loser.lane, Lane(2));
    assert_eq!(loser.last_action, LaneAction::Hold);
}

#[test]
fn test_placement_is_validated() {
    let mut highway = SimHighway::new(quiet_config(), 0.0, 9).unwrap();
    highway
        .place_vehicle(Lane(0), 10.0, 2.0, 4.0, false)
        .unwrap();

    assert!(matches!(
        highway.place_vehicle(Lane(3), 10.0, 2.0, 4.0, false),
        Err(PlacementError::NoSuchLane { .. })
    ));
    assert!(matches!(
        highway.place_vehicle(Lane(0), 1000.0, 2.0, 4.0, false),
        Err(PlacementError::OffHighway { .. })
    ));
    assert!(matches!(
        highway.place_vehicle(Lane(0), -1.0, 2.0, 4.0, false),
        Err(PlacementError::OffHighway { .. })
    ));
    assert!(matches!(
        highway.place_vehicle(Lane(1), 10.0, 5.0, 4.0, false),
        Err(PlacementError::BadSpeed { .. })
    ));
    assert!(matches!(
        highway.place_vehicle(Lane(1), 10.0, 2.0, 6.0, false),
        Err(PlacementError::BadSpeed { .. })
    ));
    assert!(matches!(
        highway.place_vehicle(Lane(0), 10.5, 2.0, 4.0, false),
        Err(PlacementError::Occupied { .. })
    ));
    assert!(highway.place_vehicle(Lane(1), 10.5, 2.0, 4.0, false).is_ok());
    assert_eq!(highway.active_count(), 2);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = SimConfig {
        max_speed: 0.0,
        ..Default::default()
    };
    let err = SimHighway::new(config, 0.0, 0).err().unwrap();
    assert_eq!(err.field(), "max_speed");

    let err = SimHighway::new(SimConfig::default(), 1.5, 0).err().unwrap();
    assert_eq!(err.field(), "bad_practice_ratio");
}

#[test]
fn test_prefill_scatters_spaced_vehicles() {
    let config = SimConfig::default();
    let clearance = config.spawn_clearance;
    let max_speed = config.max_speed;
    let min_top = max_speed * (1.0 - config.speed_variance);
    let num_cars = config.num_cars;

    let highway = SimHighway::new(config, 0.0, 10).unwrap();
    let cars = highway.vehicles();
    assert!(cars.len() <= num_cars);
    assert!(cars.len() >= num_cars * 9 / 10);
    assert_eq!(highway.tick_count(), 0);

    for (i, a) in cars.iter().enumerate() {
        assert!(!a.is_bad_practice);
        assert!(a.top_speed > min_top && a.top_speed <= max_speed);
        assert_eq!(a.speed, a.top_speed);
        for b in &cars[i + 1..] {
            if a.lane == b.lane {
                assert!((a.position - b.position).abs() >= clearance);
            }
        }
    }
}

#[test]
fn test_full_ratio_makes_every_driver_bad_practice() {
    let highway = SimHighway::new(SimConfig::default(), 1.0, 11).unwrap();
    assert!(highway.vehicles().iter().all(|car| car.is_bad_practice));
}

#[test]
fn test_same_seed_gives_same_run() {
    let run = |seed| {
        let mut highway = SimHighway::new(SimConfig::default(), 0.5, seed).unwrap();
        for _ in 0..100 {
            highway.step().unwrap();
        }
        highway.snapshot()
    };

    assert_eq!(run(12), run(12));
    assert_ne!(run(12), run(13));
}

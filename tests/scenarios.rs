use dv_router::config::Scenario;
use dv_router::{EntityId, RouterConfig, Simulator, INFINITY};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn received(sim: &Simulator, host: EntityId) -> usize {
    sim.host(host).expect("not a host").received()
}

fn data_seen(sim: &Simulator, hub: EntityId) -> usize {
    sim.hub(hub).expect("not a hub").data_seen()
}

/// H1 - R1 - C1 - R2 - R3 - H2 plus a direct R1 - R3 link that goes down.
#[test]
fn poison_reverse_reroutes_through_hub() {
    init_logging();
    let mut sim = Simulator::new();
    let h1 = sim.add_host("h1").unwrap();
    let h2 = sim.add_host("h2").unwrap();
    let r1 = sim.add_router("r1", RouterConfig::poisoning()).unwrap();
    let r2 = sim.add_router("r2", RouterConfig::poisoning()).unwrap();
    let r3 = sim.add_router("r3", RouterConfig::default()).unwrap();
    let c1 = sim.add_hub("c1").unwrap();

    sim.link(r1, h1, 1).unwrap();
    sim.link(r1, c1, 1).unwrap();
    sim.link(c1, r2, 0).unwrap();
    sim.link(r2, r3, 1).unwrap();
    sim.link(r1, r3, 1).unwrap();
    sim.link(r3, h2, 1).unwrap();

    sim.run_until(5.0);
    sim.ping(h1, h2).unwrap();
    sim.run_until(6.0);
    sim.ping(h2, h1).unwrap();
    sim.run_until(11.0);

    assert_eq!(received(&sim, h1), 1);
    assert_eq!(received(&sim, h2), 1);
    assert_eq!(data_seen(&sim, c1), 0, "shortcut should be preferred");

    sim.unlink(r1, r3).unwrap();
    sim.run_until(12.0);
    sim.hub_mut(c1).unwrap().clear_advertisements();

    sim.run_until(17.0);
    sim.ping(h1, h2).unwrap();
    sim.run_until(18.0);
    assert_eq!(received(&sim, h2), 1, "second ping cannot have arrived yet");

    sim.run_until(22.0);
    assert_eq!(received(&sim, h2), 2);
    assert_eq!(data_seen(&sim, c1), 1);

    let seen: Vec<_> = sim
        .hub(c1)
        .unwrap()
        .advertisements()
        .iter()
        .filter(|ad| ad.destination == "h2")
        .collect();
    assert!(!seen.is_empty());
    for ad in seen {
        assert!(
            ad.cost == 2 || ad.cost >= INFINITY,
            "c1 saw h2 at cost {} at t={}",
            ad.cost,
            ad.at
        );
    }
}

/// h1 - s1 - c1 - s2 - c2 - s3 - h2, with s4 hanging off s1. Without
/// poisoning, cutting s2 - c2 must leave s2 with nothing to forward on.
#[test]
fn split_horizon_drops_after_cut() {
    init_logging();
    let mut sim = Simulator::new();
    let h1 = sim.add_host("h1").unwrap();
    let h2 = sim.add_host("h2").unwrap();
    let s1 = sim.add_router("s1", RouterConfig::default()).unwrap();
    let s2 = sim.add_router("s2", RouterConfig::default()).unwrap();
    let s3 = sim.add_router("s3", RouterConfig::default()).unwrap();
    let s4 = sim.add_router("s4", RouterConfig::default()).unwrap();
    let c1 = sim.add_hub("c1").unwrap();
    let c2 = sim.add_hub("c2").unwrap();

    sim.link(h1, s1, 1).unwrap();
    sim.link(s1, s4, 1).unwrap();
    sim.link(s1, c1, 1).unwrap();
    sim.link(s2, c2, 1).unwrap();
    sim.link(c1, s2, 1).unwrap();
    sim.link(c2, s3, 1).unwrap();
    sim.link(s3, h2, 1).unwrap();

    sim.run_until(15.0);
    sim.ping(h1, h2).unwrap();
    sim.run_until(22.0);
    assert_eq!(data_seen(&sim, c1), 1);
    assert_eq!(data_seen(&sim, c2), 1);
    assert_eq!(received(&sim, h2), 1);

    sim.unlink(s2, c2).unwrap();
    assert!(sim.router(s2).unwrap().effective_route("h2").is_none());

    sim.run_until(37.0);
    sim.ping(h1, h2).unwrap();
    sim.run_until(52.0);

    assert_eq!(data_seen(&sim, c2), 1, "ping leaked past s2");
    assert_eq!(received(&sim, h2), 1);
}

/// h1 - s6 - s1 - c1 - s4 - s3 - h2 and s6 - s2 - c2 - s5 - s3, everything
/// poisoning. Cutting the paths one at a time moves traffic from the first
/// path to the second, then drops it.
#[test]
fn two_paths_fail_over_then_drop() {
    init_logging();
    let mut sim = Simulator::new();
    let h1 = sim.add_host("h1").unwrap();
    let h2 = sim.add_host("h2").unwrap();
    let mut routers = Vec::new();
    for name in ["s1", "s2", "s3", "s4", "s5", "s6"] {
        routers.push(sim.add_router(name, RouterConfig::poisoning()).unwrap());
    }
    let [s1, s2, s3, s4, s5, s6] = routers[..] else {
        unreachable!();
    };
    let c1 = sim.add_hub("c1").unwrap();
    let c2 = sim.add_hub("c2").unwrap();

    sim.link(h1, s6, 1).unwrap();
    sim.link(s6, s1, 1).unwrap();
    sim.link(s6, s2, 2).unwrap();
    sim.link(s1, c1, 1).unwrap();
    sim.link(s2, c2, 3).unwrap();
    sim.link(c1, s4, 1).unwrap();
    sim.link(c2, s5, 1).unwrap();
    sim.link(s4, s3, 1).unwrap();
    sim.link(s5, s3, 1).unwrap();
    sim.link(s3, h2, 1).unwrap();

    sim.run_until(25.0);
    sim.ping(h1, h2).unwrap();
    sim.run_until(45.0);
    assert_eq!(data_seen(&sim, c1), 1);
    assert_eq!(data_seen(&sim, c2), 0);

    sim.unlink(s4, s3).unwrap();
    sim.run_until(60.0);
    sim.ping(h1, h2).unwrap();
    sim.run_until(70.0);
    assert_eq!(data_seen(&sim, c1), 1);
    assert_eq!(data_seen(&sim, c2), 1);
    assert_eq!(received(&sim, h2), 2);

    sim.unlink(s5, s3).unwrap();
    sim.run_until(80.0);
    sim.ping(h1, h2).unwrap();
    sim.run_until(85.0);
    assert_eq!(data_seen(&sim, c1), 1);
    assert_eq!(data_seen(&sim, c2), 1);
    assert_eq!(received(&sim, h2), 2);
}

#[test]
fn sample_scenario_runs_end_to_end() {
    init_logging();
    let scenario = Scenario::sample();
    let report = Simulator::run_scenario(&scenario).unwrap();

    assert_eq!(report.time, scenario.duration);
    assert_eq!(report.received("h2"), Some(2));
    assert_eq!(report.data_seen("c1"), Some(1));

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"h2\""));
}

#[test]
fn scenario_file_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.json");
    std::fs::write(&path, Scenario::sample().to_json().unwrap()).unwrap();

    let loaded = Scenario::load(&path).unwrap();
    assert_eq!(loaded, Scenario::sample());
}

#[test]
fn bad_scenarios_are_rejected() {
    let unknown = r#"{ "routers": [{ "name": "r1" }], "links": [{ "a": "r1", "b": "r9" }] }"#;
    assert!(Scenario::from_json(unknown).is_err());
    assert!(Scenario::from_json("{ not json").is_err());
}

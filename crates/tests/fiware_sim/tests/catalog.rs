use fiware_api::RetryPolicy;
use fiware_config::PlatformConfig;
use fiware_config::QuirksConfig;
use fiware_config::TimingConfig;
use fiware_sim::FiwareSim;
use scenario_runner::catalog;
use scenario_runner::catalog::CatalogContext;
use scenario_runner::Orchestrator;
use scenario_runner::ScenarioState;
use std::time::Duration;
use test_case::test_case;

fn timing() -> TimingConfig {
    TimingConfig {
        settle: Duration::from_millis(5),
        deadline: Duration::from_millis(500),
        notification_deadline: Duration::from_millis(500),
        poll_interval: Duration::from_millis(5),
        max_poll_interval: Duration::from_millis(50),
    }
}

fn retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_interval: Duration::ZERO,
        ..RetryPolicy::default()
    }
}

fn quirks(accepted: bool) -> QuirksConfig {
    QuirksConfig {
        cross_transport_updates_accepted: accepted,
        cross_group_updates_accepted: accepted,
    }
}

#[test_case(false ; "on a strict platform")]
#[test_case(true ; "on a lenient platform")]
#[tokio::test]
async fn the_whole_catalog_passes(accepted: bool) {
    let sim = FiwareSim::new(quirks(accepted));
    let context = CatalogContext::from_config(&PlatformConfig::default())
        .unwrap()
        .with_quirks(sim.quirks())
        .with_mqtt_credentials("rw", "readwrite");
    let orchestrator = Orchestrator::new(sim.platform(context.tenant.clone()), timing(), retry());
    let scenarios = catalog::all(&context);
    assert!(scenarios
        .iter()
        .any(|scenario| scenario.name == "authenticated mqtt notification"));

    for scenario in scenarios {
        let report = orchestrator.run(&scenario).await;
        assert!(
            report.is_success(),
            "{}: {:?}",
            scenario.name,
            report.failure()
        );
        assert_eq!(report.state(), &ScenarioState::TornDown);
    }
}

#[tokio::test]
async fn predictions_made_for_other_quirks_fail() {
    let sim = FiwareSim::new(quirks(false));
    let context = CatalogContext::from_config(&PlatformConfig::default())
        .unwrap()
        .with_quirks(quirks(true));
    let orchestrator = Orchestrator::new(sim.platform(context.tenant.clone()), timing(), retry());

    let report = orchestrator
        .run(&catalog::cross_group_update(&context))
        .await;

    let (step, _) = report.failure().expect("a failure");
    assert_eq!(step, "verification of step 0");
    assert_eq!(report.state(), &ScenarioState::TornDown);
}

#[tokio::test]
async fn scenarios_leave_an_empty_tenant() {
    let sim = FiwareSim::default();
    let context = CatalogContext::from_config(&PlatformConfig::default()).unwrap();
    let platform = sim.platform(context.tenant.clone());
    let orchestrator = Orchestrator::new(platform.clone(), timing(), retry());

    let report = orchestrator.run(&catalog::time_series_notification(&context)).await;
    assert!(report.is_success(), "{:?}", report.failure());

    let cleared = scenario_runner::clear_all(&platform, &context.tenant)
        .await
        .unwrap();
    assert_eq!(cleared.total(), 0);
}

use haul_cycle::cycle::{Amendment, LoadCycleEngine, NOT_RECORDED, is_cycle_set_complete};
use haul_cycle::directory::{JobSites, StaticDirectory};
use haul_cycle::dispatch::{DispatchSettings, Dispatcher, DropReason, SampleOutcome};
use haul_cycle::error::AppError;
use haul_cycle::events::{BroadcastPublisher, CycleEventPublisher, RecordingPublisher};
use haul_cycle::geofence::{GeoPoint, PolygonGeofence, RadiusGeofence};
use haul_cycle::model::{CycleKey, PositionSample, TruckKey};
use haul_cycle::state::AppState;
use haul_cycle::store::{CycleFilter, CycleStore, MemoryCycleStore};
use std::sync::{Arc, RwLock};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const T0: OffsetDateTime = datetime!(2026-03-02 06:00 UTC);
const PIT: (f64, f64) = (19.4326, -99.1332);
const HIGHWAY: (f64, f64) = (19.4700, -99.1600);
const TIP: (f64, f64) = (19.49975, -99.19950);
const TRUCK_7: CycleKey = CycleKey {
    job_id: 1,
    truck_id: 7,
    assignation_id: 10,
};

fn directory() -> StaticDirectory {
    let mut directory = StaticDirectory::new();
    directory.insert_job(
        1,
        Some(100),
        JobSites {
            load_sites: vec![Arc::new(RadiusGeofence::new(
                GeoPoint::new(PIT.0, PIT.1),
                150.0,
            ))],
            dump_sites: vec![Arc::new(PolygonGeofence::new(vec![
                GeoPoint::new(19.5010, -99.2010),
                GeoPoint::new(19.5010, -99.1980),
                GeoPoint::new(19.4985, -99.1980),
                GeoPoint::new(19.4985, -99.2010),
            ]))],
        },
    );
    directory.assign(1, 7, 21, 10);
    directory.assign(1, 8, 22, 11);
    directory
}

fn dispatcher_with(
    store: Arc<MemoryCycleStore>,
    publisher: Arc<dyn CycleEventPublisher>,
) -> Dispatcher {
    let engine = LoadCycleEngine::new(store, publisher, Arc::new(directory()));
    Dispatcher::new(
        engine,
        Arc::new(RwLock::new(AppState::new())),
        DispatchSettings::default(),
    )
}

fn sample(truck_id: u64, driver_id: u64, at: (f64, f64), minutes: i64) -> PositionSample {
    PositionSample {
        job_id: 1,
        truck_id,
        driver_id,
        latitude: Some(at.0),
        longitude: Some(at.1),
        timestamp: T0 + Duration::minutes(minutes),
        speed: Some(9.5),
    }
}

async fn round_trip(
    dispatcher: &Dispatcher,
    truck_id: u64,
    driver_id: u64,
    start: i64,
) -> Result<(), AppError> {
    for (at, offset) in [(PIT, 0), (HIGHWAY, 15), (TIP, 35), (HIGHWAY, 50)] {
        dispatcher
            .submit_sample(sample(truck_id, driver_id, at, start + offset))
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn two_round_trips_are_numbered_per_truck() -> Result<(), AppError> {
    let store = Arc::new(MemoryCycleStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let dispatcher = dispatcher_with(Arc::clone(&store), Arc::<RecordingPublisher>::clone(&publisher));

    round_trip(&dispatcher, 7, 21, 0).await?;
    round_trip(&dispatcher, 8, 22, 5).await?;
    round_trip(&dispatcher, 7, 21, 60).await?;

    let cycles = store.list(&CycleFilter::job(1))?;
    let numbers: Vec<(u64, u32)> = cycles.iter().map(|c| (c.truck_id, c.load_number)).collect();
    assert_eq!(numbers, vec![(7, 1), (8, 1), (7, 2)]);
    assert!(cycles.iter().all(|cycle| cycle.is_closed()));

    let first = &cycles[0];
    assert_eq!(first.load_arrival, Some(T0));
    assert_eq!(first.load_leave, Some(T0 + Duration::minutes(15)));
    assert_eq!(first.dump_arrival, Some(T0 + Duration::minutes(35)));
    assert_eq!(first.dump_leave, Some(T0 + Duration::minutes(50)));

    let state = dispatcher.state().read().map_err(|_| AppError::StateLock)?;
    assert_eq!(state.live_count(&TRUCK_7), Some(2));
    // four transitions per round trip, each one publishes the job's list
    assert_eq!(publisher.events().len(), 12);
    assert!(publisher.events().iter().all(|e| e.user_id == Some(100)));
    Ok(())
}

#[tokio::test]
async fn load_straight_to_dump_emits_exit_then_enter() -> Result<(), AppError> {
    let store = Arc::new(MemoryCycleStore::new());
    let dispatcher = dispatcher_with(Arc::clone(&store), Arc::new(RecordingPublisher::new()));

    dispatcher.submit_sample(sample(7, 21, PIT, 0)).await?;
    let outcome = dispatcher.submit_sample(sample(7, 21, TIP, 30)).await?;

    match outcome {
        SampleOutcome::Applied { events, .. } => assert_eq!(events.len(), 2),
        other => panic!("expected applied outcome, got {other:?}"),
    }
    let cycle = store.latest(&TRUCK_7)?.ok_or(AppError::CycleNotFound(0))?;
    assert_eq!(cycle.load_leave, Some(T0 + Duration::minutes(30)));
    assert_eq!(cycle.dump_arrival, Some(T0 + Duration::minutes(30)));
    assert!(cycle.is_closed());
    Ok(())
}

#[tokio::test]
async fn late_sample_is_dropped_without_touching_cycles() -> Result<(), AppError> {
    let store = Arc::new(MemoryCycleStore::new());
    let dispatcher = dispatcher_with(Arc::clone(&store), Arc::new(RecordingPublisher::new()));
    dispatcher.submit_sample(sample(7, 21, HIGHWAY, 20)).await?;

    let outcome = dispatcher.submit_sample(sample(7, 21, PIT, 10)).await?;

    assert_eq!(outcome, SampleOutcome::Dropped(DropReason::OutOfOrder));
    assert_eq!(store.max_load_number(1, 7)?, None);
    let state = dispatcher.state().read().map_err(|_| AppError::StateLock)?;
    assert_eq!(state.stats().out_of_order, 1);
    Ok(())
}

#[tokio::test]
async fn store_outage_then_resubmit_applies_once() -> Result<(), AppError> {
    let store = Arc::new(MemoryCycleStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let dispatcher = dispatcher_with(Arc::clone(&store), Arc::<RecordingPublisher>::clone(&publisher));
    dispatcher.submit_sample(sample(7, 21, PIT, 0)).await?;

    store.set_available(false);
    let leave = sample(7, 21, HIGHWAY, 12);
    let failed = dispatcher.submit_sample(leave.clone()).await;
    assert!(matches!(failed, Err(ref err) if err.is_retryable()));

    store.set_available(true);
    dispatcher.submit_sample(leave.clone()).await?;
    let replay = dispatcher.submit_sample(leave).await?;

    match replay {
        SampleOutcome::Applied { events, .. } => assert!(events.is_empty()),
        other => panic!("expected applied outcome, got {other:?}"),
    }
    let cycle = store.latest(&TRUCK_7)?.ok_or(AppError::CycleNotFound(0))?;
    assert_eq!(cycle.load_leave, Some(T0 + Duration::minutes(12)));
    assert_eq!(publisher.events().len(), 2);
    Ok(())
}

#[tokio::test]
async fn manual_overrides_and_amendments_gate_invoicing() -> Result<(), AppError> {
    let store = Arc::new(MemoryCycleStore::new());
    let dispatcher = dispatcher_with(Arc::clone(&store), Arc::new(BroadcastPublisher::default()));

    assert!(is_cycle_set_complete(store.as_ref(), 1, 7)?);

    let first = dispatcher.record_manual_cycle(TRUCK_7, T0).await;
    let second = dispatcher.record_manual_cycle(TRUCK_7, T0).await;
    assert_eq!((first, second), (1, 2));

    // placeholder ticket and tons count as entered
    assert!(is_cycle_set_complete(store.as_ref(), 1, 7)?);

    round_trip(&dispatcher, 7, 21, 0).await?;
    assert!(!is_cycle_set_complete(store.as_ref(), 1, 7)?);

    let open = store
        .list(&CycleFilter::job(1).trucks([7]))?
        .into_iter()
        .find(|cycle| !cycle.is_complete())
        .ok_or(AppError::CycleNotFound(0))?;
    assert_eq!(open.load_number, 3);

    let truck = TruckKey {
        job_id: 1,
        truck_id: 7,
    };
    let ticket = Amendment::Ticket {
        ticket: "T-5531".to_string(),
        tons: 14.2,
    };
    dispatcher.amend(truck, open.id, ticket).await?;
    dispatcher
        .amend(truck, open.id, Amendment::Invoice { invoice_id: 9 })
        .await?;

    assert!(is_cycle_set_complete(store.as_ref(), 1, 7)?);
    let invoiced = store.list(&CycleFilter::job(1).invoices([9]))?;
    assert_eq!(invoiced.len(), 1);
    assert_eq!(invoiced[0].ticket.as_deref(), Some("T-5531"));
    Ok(())
}

#[tokio::test]
async fn manual_override_reports_sentinel_during_outage() {
    let store = Arc::new(MemoryCycleStore::new());
    let dispatcher = dispatcher_with(Arc::clone(&store), Arc::new(RecordingPublisher::new()));
    store.set_available(false);

    let load_number = dispatcher.record_manual_cycle(TRUCK_7, T0).await;

    assert_eq!(load_number, NOT_RECORDED);
}

#[tokio::test]
async fn broadcast_subscribers_receive_cycle_lists() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryCycleStore::new());
    let publisher = BroadcastPublisher::default();
    let mut updates = publisher.subscribe();
    let dispatcher = dispatcher_with(Arc::clone(&store), Arc::new(publisher));

    dispatcher.submit_sample(sample(7, 21, PIT, 0)).await?;

    let update = updates.recv().await?;
    assert_eq!(update.job_id, 1);
    assert_eq!(update.user_id, Some(100));
    assert_eq!(update.cycles.len(), 1);
    assert_eq!(update.cycles[0].load_number, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_manual_overrides_get_consecutive_numbers()
-> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryCycleStore::new());
    let dispatcher = dispatcher_with(Arc::clone(&store), Arc::new(RecordingPublisher::new()));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..50 {
        let dispatcher = dispatcher.clone();
        tasks.spawn(async move { dispatcher.record_manual_cycle(TRUCK_7, T0).await });
    }
    let mut numbers = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        numbers.push(joined?);
    }

    numbers.sort_unstable();
    assert_eq!(numbers, (1..=50).collect::<Vec<i64>>());
    assert_eq!(store.list(&CycleFilter::job(1))?.len(), 50);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_load_samples_open_a_single_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryCycleStore::new());
    let dispatcher = dispatcher_with(Arc::clone(&store), Arc::new(RecordingPublisher::new()));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let dispatcher = dispatcher.clone();
        tasks.spawn(async move { dispatcher.submit_sample(sample(7, 21, PIT, 0)).await });
    }
    let mut enters = 0;
    while let Some(joined) = tasks.join_next().await {
        if let SampleOutcome::Applied { events, .. } = joined?? {
            enters += events.len();
        }
    }

    assert_eq!(enters, 1);
    let cycles = store.list(&CycleFilter::job(1))?;
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].load_number, 1);
    assert_eq!(dispatcher.worker_count().await, 1);
    Ok(())
}

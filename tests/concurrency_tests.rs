mod common;

use chargeflow::domain::gateway::GatewayOutcome;
use chargeflow::domain::payment::PaymentStatus;
use chargeflow::domain::ports::LedgerStore;
use chargeflow::infrastructure::in_memory::InMemoryLedgerStore;
use common::{ScriptedGateway, command, fast_config, orchestrator_with};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_with_same_key_charge_once() {
    let gateway = ScriptedGateway::always(GatewayOutcome::Confirmed("ref-1".into()))
        .with_delay(Duration::from_millis(50));
    let store = InMemoryLedgerStore::new();
    let orchestrator = orchestrator_with(gateway.clone(), Arc::new(store.clone()), fast_config());

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.charge(command("k1", 1000)).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(gateway.calls(), 1);
    let first = &results[0];
    assert_eq!(first.status, PaymentStatus::Succeeded);
    assert!(results.iter().all(|r| r == first));
    assert_eq!(store.all().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_keys_are_independent() {
    let gateway = ScriptedGateway::always(GatewayOutcome::Confirmed("ref".into()))
        .with_delay(Duration::from_millis(5));
    let store = InMemoryLedgerStore::new();
    let orchestrator = orchestrator_with(gateway.clone(), Arc::new(store.clone()), fast_config());

    let mut rng = rand::thread_rng();
    let keys: HashSet<String> = (0..25)
        .map(|_| (&mut rng).sample_iter(&Alphanumeric).take(16).map(char::from).collect())
        .collect();

    let handles: Vec<_> = keys
        .iter()
        .map(|key| {
            let orchestrator = orchestrator.clone();
            let amount = rng.gen_range(1..10_000);
            let command = command(key, amount);
            tokio::spawn(async move { orchestrator.charge(command).await })
        })
        .collect();

    let mut payment_ids = HashSet::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.status, PaymentStatus::Succeeded);
        payment_ids.insert(result.payment_id);
    }

    assert_eq!(payment_ids.len(), keys.len());
    assert_eq!(gateway.calls(), keys.len());
    assert_eq!(store.all().await.unwrap().len(), keys.len());
}

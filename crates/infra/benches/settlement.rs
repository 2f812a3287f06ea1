use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::Utc;
use stockledger_core::TransactionId;
use stockledger_infra::cache::InMemoryViewCache;
use stockledger_infra::config::CacheTtls;
use stockledger_infra::settlement::SettlementOrchestrator;
use stockledger_infra::store::{InMemoryLedgerStore, LedgerStore};
use stockledger_infra::views::DerivedViews;
use stockledger_inventory::{Item, ItemDetails, OrderStatus, PricedAmount, Transaction};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime")
}

/// A store holding `count` sold, unsettled items.
fn seeded(rt: &tokio::runtime::Runtime, count: usize) -> (SettlementOrchestrator, Vec<String>) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let ids: Vec<String> = (0..count).map(|i| format!("BN{i:06}")).collect();

    rt.block_on(async {
        let now = Utc::now();
        let mut unit = store.begin().await.unwrap();
        for id in &ids {
            let details = ItemDetails {
                name: format!("bench {id}"),
                ..ItemDetails::default()
            };
            let mut item = Item::new(id.parse().unwrap(), details, now).unwrap();
            let mut tx = Transaction::open(TransactionId::new(), item.id.clone(), now, now);
            tx.order_status = OrderStatus::SoldUnsettled;
            tx.purchase_price = PricedAmount::base("300");
            tx.sold_price = PricedAmount::new("10000", "JPY", "");
            item.active_transaction_id = Some(tx.id);
            unit.insert_item(&item).await.unwrap();
            unit.insert_transaction(&tx).await.unwrap();
        }
        unit.commit().await.unwrap();
    });

    let views = Arc::new(DerivedViews::new(
        store.clone(),
        Arc::new(InMemoryViewCache::new()),
        CacheTtls::default(),
    ));
    (SettlementOrchestrator::new(store, views), ids)
}

fn bench_batch_settlement(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("batch_settlement");

    for batch_size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &size| {
                b.iter_batched(
                    || seeded(&rt, size),
                    |(orchestrator, ids)| {
                        let outcome = rt
                            .block_on(orchestrator.settle_batch(&ids, 0.05))
                            .unwrap();
                        black_box(outcome)
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_batch_settlement);
criterion_main!(benches);

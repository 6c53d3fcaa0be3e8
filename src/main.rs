use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;

use simlsh::{
    build_index, find_similar, generate_signatures, probability_curve, recommend_items,
    threshold, validate_estimates, EntityId, ItemId, SimLshConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USERS: u64 = 600;
const GROUPS: u64 = 12;
const ITEMS_PER_GROUP: u64 = 80;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SimLshConfig::from_file(path)?,
        None => SimLshConfig::default(),
    };
    let minhash_cfg = config.minhash_config()?;
    let bucket_cfg = config.bucket_config()?;

    let item_sets = synthetic_item_sets(7);
    let (_engine, store) =
        generate_signatures(item_sets.iter().map(|(id, s)| (*id, s)), &minhash_cfg)?;
    let index = build_index(&store, &bucket_cfg)?;

    if let Some(layout) = index.layout() {
        info!(
            %layout,
            threshold = threshold(layout.num_bands(), layout.rows_per_band()),
            "banding layout"
        );
    }
    let stats = index.stats();
    println!(
        "{} entities in {} buckets ({} shared, largest {})",
        stats.entities, stats.buckets, stats.collision_buckets, stats.largest_bucket
    );
    for view in index.sample_buckets(5, 1) {
        println!("  {view}");
    }

    for curve in probability_curve(minhash_cfg.n_hash_functions, &[5, 10, 20, 25, 50], 11)? {
        let points: Vec<String> = curve
            .points
            .iter()
            .map(|(s, p)| format!("{s:.1}:{p:.2}"))
            .collect();
        println!("{:<14} {}", curve.label(), points.join(" "));
    }

    for target in [1, 2, 3] {
        let similar = find_similar(&index, target, 0.3, 5)?;
        println!("similar to {target}: {similar:?}");
        let items = recommend_items(&index, &item_sets, target, 5)?;
        println!(
            "recommended for {target}: {:?}",
            items.iter().map(|r| r.item).collect::<Vec<_>>()
        );
    }

    let report = validate_estimates(&store, &item_sets, &config.validation_config())?;
    for pair in &report.top_pairs {
        println!(
            "Users: ({}, {}) --> Estimated: {:.2}, Exact: {:.2}, Loss: {:.2}",
            pair.left, pair.right, pair.estimated, pair.exact, pair.loss
        );
    }
    if let Some(loss) = report.mean_loss {
        println!("Average loss: {loss:.4}");
    }
    println!(
        "Similar pairs: {}, dissimilar pairs: {}",
        report.similar_pairs, report.dissimilar_pairs
    );
    info!(report = %serde_json::to_string(&report)?, "validation report");

    Ok(())
}

/// Users drawn from overlapping taste groups so that neighbours exist.
fn synthetic_item_sets(seed: u64) -> BTreeMap<EntityId, BTreeSet<ItemId>> {
    let mut rng = fastrand::Rng::with_seed(seed);
    (1..=USERS)
        .map(|user| {
            let group = rng.u64(0..GROUPS);
            let base = group * ITEMS_PER_GROUP;
            let mut items: BTreeSet<ItemId> = (0..ITEMS_PER_GROUP)
                .filter(|_| rng.f64() < 0.6)
                .map(|i| base + i)
                .collect();
            for _ in 0..5 {
                items.insert(rng.u64(0..GROUPS * ITEMS_PER_GROUP));
            }
            (user, items)
        })
        .collect()
}

use std::sync::Arc;

use hoard_cache::CachePipeline;
use hoard_config::HoardConfig;
use hoard_core::{Master, build_cache};
use utils::init_tracing;

mod resources;

use resources::DemoResources;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = HoardConfig::from_file_or_default("hoard.conf");
    init_tracing(cfg.global.log_level());
    cfg.print();

    let cache = build_cache(cfg.cache());
    let pipeline = CachePipeline::new(cache, Arc::new(DemoResources::default()))
        .enabled(cfg.cache.enabled());

    Master::new(cfg, pipeline).run().await
}
